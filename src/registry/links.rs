//! Parent to child sub-metric links.

use crate::cache::MetricIdentity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use smallvec::SmallVec;

/// Children of one parent generation. Holding the child handles here is what
/// keeps sub-metrics alive exactly as long as their parent.
#[derive(Debug)]
struct LinkSet {
    generation: u64,
    children: SmallVec<[MetricIdentity; 4]>,
}

#[derive(Debug, Default)]
pub(crate) struct SubMetricLinks {
    table: DashMap<u64, LinkSet, ahash::RandomState>,
}

impl SubMetricLinks {
    /// Linked child of `parent` with hash `child`, if any
    pub(crate) fn find(&self, parent: u64, generation: u64, child: u64) -> Option<MetricIdentity> {
        let set = self.table.get(&parent)?;
        if set.generation != generation {
            return None;
        }
        set.children.iter().find(|c| c.hash64() == child).cloned()
    }

    pub(crate) fn link(&self, parent: u64, generation: u64, child: &MetricIdentity) {
        match self.table.entry(parent) {
            Entry::Occupied(mut occupied) => {
                let set = occupied.get_mut();
                if set.generation != generation {
                    // Links of an evicted parent generation that was never cleaned up
                    set.generation = generation;
                    set.children.clear();
                }
                if !set.children.iter().any(|c| c.same_instance(child)) {
                    set.children.push(child.clone());
                }
            },
            Entry::Vacant(vacant) => {
                let mut children = SmallVec::new();
                children.push(child.clone());
                vacant.insert(LinkSet {
                    generation,
                    children,
                });
            },
        }
    }

    /// Detaches and returns the children of one parent generation
    pub(crate) fn remove(&self, parent: u64, generation: u64) -> SmallVec<[MetricIdentity; 4]> {
        self.table
            .remove_if(&parent, |_, set| set.generation == generation)
            .map(|(_, set)| set.children)
            .unwrap_or_default()
    }

    pub(crate) fn children(&self, parent: u64) -> Vec<MetricIdentity> {
        self.table
            .get(&parent)
            .map(|set| set.children.to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}
