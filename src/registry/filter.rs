//! Predicates selecting which metrics a snapshot includes.

use crate::core::config::FilterConfig;
use crate::core::{MetricName, Result, VigilError};
use crate::taxonomy::MetricKind;
use regex::Regex;
use std::collections::BTreeMap;

/// Decides whether a registered metric is included in a snapshot
pub trait MetricFilter: Send + Sync {
    fn matches(&self, name: &MetricName, kind: MetricKind) -> bool;
}

impl<F> MetricFilter for F
where
    F: Fn(&MetricName, MetricKind) -> bool + Send + Sync,
{
    fn matches(&self, name: &MetricName, kind: MetricKind) -> bool {
        self(name, kind)
    }
}

/// Includes every metric
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMetrics;

impl MetricFilter for AllMetrics {
    fn matches(&self, _name: &MetricName, _kind: MetricKind) -> bool {
        true
    }
}

/// Include/exclude patterns over the rendered name plus required tags
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    require_tags: BTreeMap<String, String>,
}

impl PatternFilter {
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        VigilError::config(format!("Invalid filter pattern '{}': {}", p, e))
                    })
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            require_tags: config.require_tags.clone(),
        })
    }

    /// True if the filter lets everything through
    pub fn is_pass_through(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && self.require_tags.is_empty()
    }
}

impl MetricFilter for PatternFilter {
    fn matches(&self, name: &MetricName, _kind: MetricKind) -> bool {
        if self.is_pass_through() {
            return true;
        }
        if !self
            .require_tags
            .iter()
            .all(|(k, v)| name.tag(k) == Some(v.as_str()))
        {
            return false;
        }
        let rendered = name.rendered();
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(&rendered)) {
            return false;
        }
        !self.exclude.iter().any(|re| re.is_match(&rendered))
    }
}
