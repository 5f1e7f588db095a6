//! Named, possibly nested, groups of metrics registered in one call.

use crate::metrics::LiveMetric;

/// One member of a [`MetricGroup`]
#[derive(Debug, Clone)]
pub enum GroupMember {
    Metric(LiveMetric),
    Group(MetricGroup),
}

/// An ordered set of metrics and nested groups, each under a relative name
#[derive(Debug, Clone, Default)]
pub struct MetricGroup {
    members: Vec<(String, GroupMember)>,
}

impl MetricGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a metric under `name`
    pub fn metric(mut self, name: impl Into<String>, metric: impl Into<LiveMetric>) -> Self {
        self.members.push((name.into(), GroupMember::Metric(metric.into())));
        self
    }

    /// Adds a nested group under `name`
    pub fn group(mut self, name: impl Into<String>, group: MetricGroup) -> Self {
        self.members.push((name.into(), GroupMember::Group(group)));
        self
    }

    pub fn members(&self) -> &[(String, GroupMember)] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Metrics in this group and all nested groups
    pub fn metric_count(&self) -> usize {
        self.members
            .iter()
            .map(|(_, member)| match member {
                GroupMember::Metric(_) => 1,
                GroupMember::Group(group) => group.metric_count(),
            })
            .sum()
    }
}
