//! Watched identity handles.

use super::eviction::{Eviction, EvictionQueue};
use crate::core::MetricName;
use once_cell::sync::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Shared handle to an interned [`MetricName`].
///
/// Handles handed out by an [`IdentityCache`](super::IdentityCache) are
/// watched: when the last clone is dropped, the cache entry is queued for
/// eviction and every eviction listener is notified once.
#[derive(Clone)]
pub struct MetricIdentity(Arc<Inner>);

struct Inner {
    name: MetricName,
    watch: OnceCell<Watch>,
}

struct Watch {
    generation: u64,
    queue: Arc<EvictionQueue>,
}

impl MetricIdentity {
    /// Unwatched handle; becomes watched once passed to `IdentityCache::put`
    pub fn new(name: MetricName) -> Self {
        MetricIdentity(Arc::new(Inner {
            name,
            watch: OnceCell::new(),
        }))
    }

    pub fn name(&self) -> &MetricName {
        &self.0.name
    }

    /// Cache generation this handle was interned under, or 0 when unwatched
    #[inline]
    pub fn generation(&self) -> u64 {
        self.0.watch.get().map_or(0, |w| w.generation)
    }

    pub fn is_watched(&self) -> bool {
        self.0.watch.get().is_some()
    }

    /// True if both handles share one interned instance
    pub fn same_instance(&self, other: &MetricIdentity) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn watch(&self, generation: u64, queue: Arc<EvictionQueue>) -> bool {
        self.0.watch.set(Watch { generation, queue }).is_ok()
    }

    pub(crate) fn downgrade(&self) -> WeakIdentity {
        WeakIdentity(Arc::downgrade(&self.0))
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(watch) = self.watch.get() {
            watch.queue.push(Eviction {
                hash: self.name.hash64(),
                generation: watch.generation,
                name: self.name.clone(),
            });
        }
    }
}

/// Non-owning reference stored in the cache table
#[derive(Clone)]
pub(crate) struct WeakIdentity(std::sync::Weak<Inner>);

impl WeakIdentity {
    pub(crate) fn upgrade(&self) -> Option<MetricIdentity> {
        self.0.upgrade().map(MetricIdentity)
    }
}

impl Deref for MetricIdentity {
    type Target = MetricName;

    fn deref(&self) -> &MetricName {
        &self.0.name
    }
}

impl PartialEq for MetricIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.0.name == other.0.name
    }
}

impl Eq for MetricIdentity {}

impl Hash for MetricIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.name.hash64());
    }
}

impl fmt::Debug for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricIdentity")
            .field("name", &self.0.name)
            .field("generation", &self.generation())
            .finish()
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.name, f)
    }
}
