//! Structural metric identities.
//!
//! A [`MetricName`] is the immutable (name, tags, extension) triple that
//! identifies a series. Its 64-bit hash is computed once at construction with
//! a deterministic hasher, so equal triples hash equal across threads, caches
//! and process restarts.

use crate::core::error::{Result, VigilError};
use rustc_hash::FxHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const MAX_NAME_LEN: usize = 255;

/// Immutable structural identity of a metric: name, ordered tags and an optional extension suffix.
#[derive(Clone)]
pub struct MetricName(Arc<NameInner>);

struct NameInner {
    hash: u64,
    name: String,
    tags: BTreeMap<String, String>,
    extension: Option<String>,
}

impl MetricName {
    /// Identity with the given name and no tags
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::builder(name).build()
    }

    /// Starts building an identity
    pub fn builder(name: impl Into<String>) -> MetricNameBuilder {
        MetricNameBuilder {
            name: name.into(),
            tags: BTreeMap::new(),
            extension: None,
        }
    }

    fn from_parts(
        name: String,
        tags: BTreeMap<String, String>,
        extension: Option<String>,
    ) -> Self {
        let hash = compute_hash(&name, &tags, extension.as_deref());
        MetricName(Arc::new(NameInner {
            hash,
            name,
            tags,
            extension,
        }))
    }

    /// Stable 64-bit identity key
    #[inline(always)]
    pub fn hash64(&self) -> u64 {
        self.0.hash
    }

    /// Base name without the extension suffix
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.0.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.0.tags.get(key).map(|v| v.as_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.0.extension.as_deref()
    }

    /// Series name as written to the backend: `name` or `name.extension`
    pub fn rendered(&self) -> String {
        match &self.0.extension {
            Some(ext) => format!("{}.{}", self.0.name, ext),
            None => self.0.name.clone(),
        }
    }

    /// Derives an identity with the same name and tags whose extension is
    /// this identity's extension followed by `suffix`.
    pub fn extended(&self, suffix: &str) -> MetricName {
        let extension = match &self.0.extension {
            Some(ext) if !suffix.is_empty() => Some(format!("{}.{}", ext, suffix)),
            Some(ext) => Some(ext.clone()),
            None if suffix.is_empty() => None,
            None => Some(suffix.to_string()),
        };
        Self::from_parts(self.0.name.clone(), self.0.tags.clone(), extension)
    }

    /// Derives the identity of a group member named `relative` under this identity.
    /// An empty relative name yields an identity structurally equal to this one.
    pub fn child(&self, relative: &str) -> MetricName {
        let relative = relative.trim_matches('.');
        if relative.is_empty() {
            return self.clone();
        }
        let name = format!("{}.{}", self.0.name, relative);
        Self::from_parts(name, self.0.tags.clone(), self.0.extension.clone())
    }

    /// Returns a copy carrying an additional tag (replacing any existing value for `key`)
    pub fn with_tag(&self, key: impl Into<String>, value: impl Into<String>) -> MetricName {
        let mut tags = self.0.tags.clone();
        tags.insert(key.into(), value.into());
        Self::from_parts(self.0.name.clone(), tags, self.0.extension.clone())
    }
}

fn compute_hash(name: &str, tags: &BTreeMap<String, String>, extension: Option<&str>) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    // BTreeMap iteration is key-ordered, so insertion order never changes the hash
    for (k, v) in tags {
        hasher.write_u8(0xfe);
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    match extension {
        Some(ext) => {
            hasher.write_u8(0xff);
            ext.hash(&mut hasher);
        },
        None => hasher.write_u8(0),
    }
    hasher.finish()
}

impl PartialEq for MetricName {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.hash == other.0.hash
                && self.0.name == other.0.name
                && self.0.tags == other.0.tags
                && self.0.extension == other.0.extension)
    }
}

impl Eq for MetricName {}

impl Hash for MetricName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)?;
        if let Some(ext) = &self.0.extension {
            write!(f, ".{}", ext)?;
        }
        if !self.0.tags.is_empty() {
            f.write_str("{")?;
            for (i, (k, v)) in self.0.tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", k, v)?;
            }
            f.write_str("}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetricName({} #{:016x})", self, self.0.hash)
    }
}

/// Builder for [`MetricName`]
#[derive(Debug, Clone)]
pub struct MetricNameBuilder {
    name: String,
    tags: BTreeMap<String, String>,
    extension: Option<String>,
}

impl MetricNameBuilder {
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Validates and builds the identity
    pub fn build(self) -> Result<MetricName> {
        if self.name.trim().is_empty() {
            return Err(VigilError::InvalidName("metric name cannot be empty".to_string()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(VigilError::InvalidName(format!(
                "metric name cannot exceed {} characters, got {}",
                MAX_NAME_LEN,
                self.name.len()
            )));
        }
        if let Some(key) = self.tags.keys().find(|k| k.trim().is_empty()) {
            return Err(VigilError::InvalidName(format!(
                "tag keys cannot be empty (metric {}, key '{}')",
                self.name, key
            )));
        }
        let extension = self.extension.filter(|e| !e.is_empty());
        Ok(MetricName::from_parts(self.name, self.tags, extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_content_hashes_equal() {
        let a = MetricName::builder("requests.total")
            .tag("service", "api")
            .tag("host", "a1")
            .build()
            .unwrap();
        let b = MetricName::builder("requests.total")
            .tag("host", "a1")
            .tag("service", "api")
            .build()
            .unwrap();

        assert_eq!(a.hash64(), b.hash64());
        assert_eq!(a, b);
    }

    #[test]
    fn test_extension_changes_identity() {
        let base = MetricName::new("latency.ms").unwrap();
        let count = base.extended("count");

        assert_ne!(base.hash64(), count.hash64());
        assert_eq!(count.name(), "latency.ms");
        assert_eq!(count.extension(), Some("count"));
        assert_eq!(count.rendered(), "latency.ms.count");
        assert_eq!(count.extended("p99").rendered(), "latency.ms.count.p99");
    }

    #[test]
    fn test_tag_boundaries_are_unambiguous() {
        let a = MetricName::builder("m").tag("ab", "c").build().unwrap();
        let b = MetricName::builder("m").tag("a", "bc").build().unwrap();
        assert_ne!(a.hash64(), b.hash64());
    }

    #[test]
    fn test_child_of_empty_relative_is_self() {
        let group = MetricName::builder("jvm.gc").tag("pool", "old").build().unwrap();
        assert_eq!(group.child(""), group);

        let child = group.child("collections");
        assert_eq!(child.name(), "jvm.gc.collections");
        assert_eq!(child.tag("pool"), Some("old"));
    }

    #[test]
    fn test_invalid_names() {
        assert!(MetricName::new("").is_err());
        assert!(MetricName::new("x".repeat(300)).is_err());
        assert!(MetricName::builder("ok").tag(" ", "v").build().is_err());
    }

    #[test]
    fn test_display() {
        let name = MetricName::builder("requests.total")
            .tag("service", "api")
            .extension("rate")
            .build()
            .unwrap();
        assert_eq!(name.to_string(), "requests.total.rate{service=api}");
    }
}
