//! Metric registry: binds live instruments to cached identities.
//!
//! Entries are keyed by identity hash and tagged with the cache generation
//! of the handle they were registered under, so an eviction notice for an
//! old generation never removes a registration made after the identity was
//! interned again. Sub-metrics are linked to their parent; the link table
//! owns the child handles, so removing or evicting a parent releases its
//! children, which are then removed in the same pass.

pub mod filter;
pub mod group;
mod links;

pub use filter::{AllMetrics, MetricFilter, PatternFilter};
pub use group::{GroupMember, MetricGroup};

use crate::cache::{Eviction, IdentityCache, ListenerId, MetricIdentity};
use crate::core::{MetricName, Result, VigilError};
use crate::metrics::{Counter, Gauge, Histogram, LiveMetric, Meter, Timer};
use crate::taxonomy::{BitFlag, MetricKind, SubValue};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use links::SubMetricLinks;
use std::sync::{Arc, Weak};

/// A live instrument bound to an identity
#[derive(Debug, Clone)]
pub struct RegisteredMetric {
    name: MetricName,
    generation: u64,
    instance: LiveMetric,
    parent: Option<u64>,
    derived: Option<SubValue>,
}

impl RegisteredMetric {
    pub fn name(&self) -> &MetricName {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.instance.kind()
    }

    pub fn instance(&self) -> &LiveMetric {
        &self.instance
    }

    /// Cache generation of the identity this entry was registered under
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Hash of the parent identity, for sub-metrics
    pub fn parent(&self) -> Option<u64> {
        self.parent
    }

    /// Sub-value this entry mirrors, for series synthesized by the reporter
    pub fn derived(&self) -> Option<SubValue> {
        self.derived
    }

    fn conflict(&self, requested: MetricKind) -> VigilError {
        VigilError::MetricKindConflict {
            name: self.name.to_string(),
            existing: self.kind(),
            requested,
        }
    }
}

/// Live metrics of one kind, ordered by rendered name
pub type MetricSnapshot = Vec<(MetricName, LiveMetric)>;

/// Concurrent registry of live metrics
pub struct MetricRegistry {
    cache: Arc<IdentityCache>,
    metrics: DashMap<u64, RegisteredMetric, ahash::RandomState>,
    links: SubMetricLinks,
    listener: ListenerId,
}

impl MetricRegistry {
    /// Creates a registry that drops entries as `cache` evicts their identities
    pub fn new(cache: Arc<IdentityCache>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = Weak::clone(weak);
            let listener = cache.add_eviction_listener(Arc::new(move |eviction: &Eviction| {
                if let Some(registry) = weak.upgrade() {
                    registry.on_eviction(eviction);
                }
            }));
            Self {
                cache,
                metrics: DashMap::with_hasher(ahash::RandomState::new()),
                links: SubMetricLinks::default(),
                listener,
            }
        })
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    /// Canonical handle for `name` from the backing cache
    pub fn identity(&self, name: MetricName) -> MetricIdentity {
        self.cache.intern_or_create(name)
    }

    /// Returns the metric registered for `identity`, creating one of `kind` if absent.
    ///
    /// Fails with `MetricKindConflict` if the identity is bound to another kind;
    /// the existing registration is left untouched.
    pub fn register(&self, identity: &MetricIdentity, kind: MetricKind) -> Result<RegisteredMetric> {
        self.get_or_insert(identity, kind, || LiveMetric::new(kind), None, None)
    }

    /// Binds an existing instrument to `identity`, or returns the metric already
    /// registered there if it is of the same kind
    pub fn register_instance(
        &self,
        identity: &MetricIdentity,
        instance: LiveMetric,
    ) -> Result<RegisteredMetric> {
        let kind = instance.kind();
        self.get_or_insert(identity, kind, move || instance, None, None)
    }

    pub fn counter(&self, identity: &MetricIdentity) -> Result<Arc<Counter>> {
        let registered = self.register(identity, MetricKind::Counter)?;
        registered
            .instance
            .as_counter()
            .map(Arc::clone)
            .ok_or_else(|| registered.conflict(MetricKind::Counter))
    }

    pub fn gauge(&self, identity: &MetricIdentity) -> Result<Arc<Gauge>> {
        let registered = self.register(identity, MetricKind::Gauge)?;
        registered
            .instance
            .as_gauge()
            .map(Arc::clone)
            .ok_or_else(|| registered.conflict(MetricKind::Gauge))
    }

    pub fn histogram(&self, identity: &MetricIdentity) -> Result<Arc<Histogram>> {
        let registered = self.register(identity, MetricKind::Histogram)?;
        registered
            .instance
            .as_histogram()
            .map(Arc::clone)
            .ok_or_else(|| registered.conflict(MetricKind::Histogram))
    }

    pub fn meter(&self, identity: &MetricIdentity) -> Result<Arc<Meter>> {
        let registered = self.register(identity, MetricKind::Meter)?;
        registered
            .instance
            .as_meter()
            .map(Arc::clone)
            .ok_or_else(|| registered.conflict(MetricKind::Meter))
    }

    pub fn timer(&self, identity: &MetricIdentity) -> Result<Arc<Timer>> {
        let registered = self.register(identity, MetricKind::Timer)?;
        registered
            .instance
            .as_timer()
            .map(Arc::clone)
            .ok_or_else(|| registered.conflict(MetricKind::Timer))
    }

    /// Get-or-create followed by the kind's write of `raw`
    pub fn record(&self, identity: &MetricIdentity, kind: MetricKind, raw: f64) -> Result<()> {
        let registered = self.register(identity, kind)?;
        if !kind.write(raw, &registered.instance) {
            return Err(registered.conflict(kind));
        }
        Ok(())
    }

    /// Registers every metric of `group`, nested groups included, under
    /// identities extending `prefix` with each member's relative name.
    ///
    /// Returns the handles of the registered members; each registration lasts
    /// as long as its handle. A member whose identity equals its enclosing
    /// prefix is skipped.
    pub fn register_group(
        &self,
        prefix: &MetricName,
        group: &MetricGroup,
    ) -> Result<Vec<MetricIdentity>> {
        let mut registered = Vec::with_capacity(group.metric_count());
        self.register_group_into(prefix, group, &mut registered)?;
        Ok(registered)
    }

    fn register_group_into(
        &self,
        prefix: &MetricName,
        group: &MetricGroup,
        registered: &mut Vec<MetricIdentity>,
    ) -> Result<()> {
        for (relative, member) in group.members() {
            let name = prefix.child(relative);
            match member {
                GroupMember::Group(nested) => {
                    self.register_group_into(&name, nested, registered)?;
                },
                GroupMember::Metric(_) if name == *prefix => {
                    tracing::debug!(metric = %prefix, "Skipping group member that resolves to its group");
                },
                GroupMember::Metric(instance) => {
                    let identity = self.cache.intern_or_create(name);
                    self.register_instance(&identity, instance.clone())?;
                    registered.push(identity);
                },
            }
        }
        Ok(())
    }

    /// Registers (or returns) the child of a cached parent whose identity is the
    /// parent's extended by `extension`.
    ///
    /// Fails with `UnknownIdentity` if `parent` is not in the identity cache.
    pub fn sub_metric(
        &self,
        parent: u64,
        extension: &str,
        kind: MetricKind,
    ) -> Result<RegisteredMetric> {
        self.link_child(parent, extension, kind, None)
    }

    /// Registers (or returns) the gauge that mirrors one sub-value of `parent`
    pub fn derived(&self, parent: u64, sub_value: SubValue) -> Result<RegisteredMetric> {
        self.link_child(parent, sub_value.name(), MetricKind::Gauge, Some(sub_value))
    }

    fn link_child(
        &self,
        parent_hash: u64,
        extension: &str,
        kind: MetricKind,
        derived: Option<SubValue>,
    ) -> Result<RegisteredMetric> {
        let parent = self
            .cache
            .get(parent_hash)
            .ok_or(VigilError::UnknownIdentity(parent_hash))?;
        let generation = parent.generation();
        let name = parent.extended(extension);

        let child = match self.links.find(parent_hash, generation, name.hash64()) {
            Some(child) => child,
            None => self.cache.intern_or_create(name),
        };
        let registered = self.get_or_insert(
            &child,
            kind,
            || LiveMetric::new(kind),
            Some(parent_hash),
            derived,
        )?;
        self.links.link(parent_hash, generation, &child);
        Ok(registered)
    }

    fn get_or_insert(
        &self,
        identity: &MetricIdentity,
        kind: MetricKind,
        make: impl FnOnce() -> LiveMetric,
        parent: Option<u64>,
        derived: Option<SubValue>,
    ) -> Result<RegisteredMetric> {
        let hash = identity.hash64();
        let generation = self.require_cached(identity)?;

        if let Some(existing) = self.metrics.get(&hash) {
            if existing.generation == generation {
                return Self::same_kind(&existing, kind);
            }
        }

        let build = |instance: LiveMetric| RegisteredMetric {
            name: identity.name().clone(),
            generation,
            instance,
            parent,
            derived,
        };

        match self.metrics.entry(hash) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().generation == generation {
                    return Self::same_kind(occupied.get(), kind);
                }
                // Left over from an evicted generation whose notice is still queued
                let registered = build(make());
                occupied.insert(registered.clone());
                Ok(registered)
            },
            Entry::Vacant(vacant) => {
                let registered = build(make());
                vacant.insert(registered.clone());
                tracing::debug!(metric = %registered.name, hash, %kind, "Registered metric");
                Ok(registered)
            },
        }
    }

    fn same_kind(existing: &RegisteredMetric, kind: MetricKind) -> Result<RegisteredMetric> {
        if existing.kind() == kind {
            Ok(existing.clone())
        } else {
            Err(existing.conflict(kind))
        }
    }

    fn require_cached(&self, identity: &MetricIdentity) -> Result<u64> {
        match self.cache.get(identity.hash64()) {
            Some(cached) if cached.same_instance(identity) => Ok(identity.generation()),
            _ => Err(VigilError::UnknownIdentity(identity.hash64())),
        }
    }

    /// Removes the registration made under `identity` and its sub-metrics
    pub fn unregister(&self, identity: &MetricIdentity) -> bool {
        self.remove_entry(identity.hash64(), identity.generation())
    }

    /// Removes whatever is registered under `hash` and its sub-metrics
    pub fn unregister_hash(&self, hash: u64) -> bool {
        let generation = match self.metrics.get(&hash) {
            Some(existing) => existing.generation,
            None => return false,
        };
        self.remove_entry(hash, generation)
    }

    /// Removes every registration matching `predicate`; returns how many were removed
    pub fn remove_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&RegisteredMetric) -> bool,
    {
        let matching: Vec<(u64, u64)> = self
            .metrics
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (*entry.key(), entry.generation))
            .collect();

        matching
            .into_iter()
            .filter(|(hash, generation)| self.remove_entry(*hash, *generation))
            .count()
    }

    fn remove_entry(&self, hash: u64, generation: u64) -> bool {
        let removed = self
            .metrics
            .remove_if(&hash, |_, existing| existing.generation == generation);

        let children = self.links.remove(hash, generation);
        for child in &children {
            self.remove_entry(child.hash64(), child.generation());
        }

        match removed {
            Some((_, registered)) => {
                tracing::debug!(
                    metric = %registered.name,
                    hash,
                    children = children.len(),
                    "Removed metric"
                );
                true
            },
            None => false,
        }
    }

    fn on_eviction(&self, eviction: &Eviction) {
        self.remove_entry(eviction.hash, eviction.generation);
    }

    pub fn get(&self, hash: u64) -> Option<RegisteredMetric> {
        self.metrics.get(&hash).map(|entry| entry.clone())
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.metrics.contains_key(&hash)
    }

    /// Registered entries, sub-metrics and derived series included
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Names of the sub-metrics linked to `parent`
    pub fn children(&self, parent: u64) -> Vec<MetricName> {
        self.links
            .children(parent)
            .iter()
            .map(|child| child.name().clone())
            .collect()
    }

    /// Parents that currently have linked sub-metrics
    pub fn linked_parents(&self) -> usize {
        self.links.len()
    }

    /// Point-in-time view of the metrics of `kind` accepted by `filter`.
    ///
    /// Each entry is read whole; series derived by the reporter are excluded.
    pub fn snapshot(&self, kind: MetricKind, filter: &dyn MetricFilter) -> MetricSnapshot {
        let mut snapshot: MetricSnapshot = self
            .metrics
            .iter()
            .filter(|entry| entry.derived.is_none() && entry.kind() == kind)
            .filter(|entry| filter.matches(&entry.name, kind))
            .map(|entry| (entry.name.clone(), entry.instance.clone()))
            .collect();
        snapshot.sort_by_cached_key(|(name, _)| (name.rendered(), name.hash64()));
        snapshot
    }
}

impl Drop for MetricRegistry {
    fn drop(&mut self) {
        self.cache.remove_eviction_listener(self.listener);
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.metrics.len())
            .field("linked_parents", &self.links.len())
            .finish()
    }
}
