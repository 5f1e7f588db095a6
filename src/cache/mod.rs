//! Identity cache: interns metric identities by their 64-bit hash.
//!
//! The table holds only weak references. Callers own [`MetricIdentity`]
//! handles; when the last handle of an identity is dropped its entry is
//! queued for eviction and a dedicated `identity-evictor` thread removes it,
//! invalidates its counters and notifies every registered listener. Listener
//! callbacks therefore never run on the thread that dropped the handle.

mod counters;
pub mod eviction;
pub mod handle;

pub use eviction::{Eviction, EvictionListener, ListenerId};
pub use handle::MetricIdentity;

use crate::core::{MetricName, Result, VigilError};
use arc_swap::ArcSwap;
use counters::IdentityCounters;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eviction::EvictionQueue;
use handle::WeakIdentity;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 1024;

pub(crate) struct CacheEntry {
    identity: WeakIdentity,
    generation: u64,
}

type ListenerList = Vec<(ListenerId, Arc<dyn EvictionListener>)>;

/// State shared with the evictor thread
pub(crate) struct Shared {
    table: DashMap<u64, CacheEntry>,
    counters: IdentityCounters,
    listeners: ArcSwap<ListenerList>,
}

/// Concurrent intern table of metric identities
pub struct IdentityCache {
    shared: Arc<Shared>,
    queue: Arc<EvictionQueue>,
    next_generation: AtomicU64,
    next_listener: AtomicU64,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl IdentityCache {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache pre-sized for `capacity` identities and start its evictor thread
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            table: DashMap::with_capacity(capacity),
            counters: IdentityCounters::default(),
            listeners: ArcSwap::from_pointee(Vec::new()),
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let queue = Arc::new(EvictionQueue::new(tx));

        let evictor = {
            let shared = Arc::clone(&shared);
            let queue = Arc::clone(&queue);
            thread::Builder::new()
                .name("identity-evictor".to_string())
                .spawn(move || eviction::run_evictor(shared, queue, rx))?
        };

        Ok(Self {
            shared,
            queue,
            next_generation: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
            evictor: Mutex::new(Some(evictor)),
        })
    }

    /// Returns the canonical handle for `name`, interning it if absent.
    ///
    /// Concurrent calls for the same identity construct exactly one handle;
    /// unrelated identities only contend on their own shard.
    pub fn intern_or_create(&self, name: MetricName) -> MetricIdentity {
        let hash = name.hash64();
        if let Some(identity) = self.get(hash) {
            return identity;
        }
        self.intern_slow(name)
    }

    #[cold]
    fn intern_slow(&self, name: MetricName) -> MetricIdentity {
        let hash = name.hash64();
        match self.shared.table.entry(hash) {
            Entry::Occupied(mut occupied) => {
                if let Some(identity) = occupied.get().identity.upgrade() {
                    return identity;
                }
                // Last handle dropped, eviction still queued
                let identity = self.watched(name);
                occupied.insert(self.entry_for(&identity));
                identity
            },
            Entry::Vacant(vacant) => {
                let identity = self.watched(name);
                vacant.insert(self.entry_for(&identity));
                tracing::debug!(metric = %identity.name(), hash, "Interned metric identity");
                identity
            },
        }
    }

    fn watched(&self, name: MetricName) -> MetricIdentity {
        let identity = MetricIdentity::new(name);
        identity.watch(self.generation(), Arc::clone(&self.queue));
        identity
    }

    fn generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn entry_for(&self, identity: &MetricIdentity) -> CacheEntry {
        CacheEntry {
            identity: identity.downgrade(),
            generation: identity.generation(),
        }
    }

    /// Live handle for `hash`, if any
    #[inline]
    pub fn get(&self, hash: u64) -> Option<MetricIdentity> {
        self.shared
            .table
            .get(&hash)
            .and_then(|entry| entry.identity.upgrade())
    }

    /// Interns an unwatched handle and starts watching it.
    ///
    /// Returns false if a live identity with the same hash is already cached
    /// or if the handle is already watched.
    pub fn put(&self, identity: &MetricIdentity) -> bool {
        if identity.is_watched() {
            return false;
        }
        let install = |identity: &MetricIdentity| {
            identity.watch(self.generation(), Arc::clone(&self.queue));
            self.entry_for(identity)
        };
        match self.shared.table.entry(identity.hash64()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().identity.upgrade().is_some() {
                    return false;
                }
                occupied.insert(install(identity));
                true
            },
            Entry::Vacant(vacant) => {
                vacant.insert(install(identity));
                true
            },
        }
    }

    /// True if a live handle exists for `hash`
    pub fn contains(&self, hash: u64) -> bool {
        self.get(hash).is_some()
    }

    /// Entries in the table, including those whose eviction is still queued
    pub fn len(&self) -> usize {
        self.shared.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.table.is_empty()
    }

    /// Registers a listener invoked on the evictor thread for every eviction
    pub fn add_eviction_listener(&self, listener: Arc<dyn EvictionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.shared.listeners.rcu(|current| {
            let mut next = ListenerList::clone(current);
            next.push((id, Arc::clone(&listener)));
            next
        });
        id
    }

    /// Returns false if no listener was registered under `id`
    pub fn remove_eviction_listener(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.shared.listeners.rcu(|current| {
            let next: ListenerList = current
                .iter()
                .filter(|(lid, _)| *lid != id)
                .map(|(lid, l)| (*lid, Arc::clone(l)))
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    /// Adds one to the counter of a cached identity and returns the new value
    pub fn incr_counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.add(hash, 1))
    }

    pub fn decr_counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.add(hash, -1))
    }

    pub fn counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.get(hash))
    }

    /// Adds one to the calling thread's counter for a cached identity
    pub fn incr_thread_counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.add_for_current_thread(hash, 1))
    }

    pub fn decr_thread_counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.add_for_current_thread(hash, -1))
    }

    pub fn thread_counter(&self, hash: u64) -> Result<i64> {
        self.require(hash)?;
        Ok(self.shared.counters.get_for_current_thread(hash))
    }

    fn require(&self, hash: u64) -> Result<()> {
        if self.contains(hash) {
            Ok(())
        } else {
            Err(VigilError::UnknownIdentity(hash))
        }
    }

    /// Evictions queued but not yet delivered to every listener
    pub fn pending_evictions(&self) -> usize {
        self.queue.pending()
    }

    /// Blocks until every queued eviction has been delivered, or `timeout`
    /// passes. Returns true if the queue drained.
    pub fn wait_for_evictions(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.queue.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl Drop for IdentityCache {
    fn drop(&mut self) {
        self.queue.shutdown();
        if let Some(evictor) = self.evictor.lock().take() {
            // The last owner may be released by a listener on the evictor itself
            if evictor.thread().id() != thread::current().id() {
                let _ = evictor.join();
            }
        }
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("entries", &self.len())
            .field("pending_evictions", &self.pending_evictions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    const WAIT: Duration = Duration::from_secs(5);

    fn name(s: &str) -> MetricName {
        MetricName::new(s).unwrap()
    }

    #[test]
    fn test_intern_returns_canonical_handle() {
        let cache = IdentityCache::new().unwrap();
        let a = cache.intern_or_create(name("requests.total"));
        let b = cache.intern_or_create(name("requests.total"));

        assert!(a.same_instance(&b));
        assert_eq!(a.hash64(), b.hash64());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(a.hash64()).unwrap().same_instance(&a));
    }

    #[test]
    fn test_drop_evicts_and_notifies_once() {
        let cache = IdentityCache::new().unwrap();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cache.add_eviction_listener(Arc::new(move |e: &Eviction| {
            sink.lock().push((e.hash, thread::current().name().map(String::from)));
        }));

        let identity = cache.intern_or_create(name("short.lived"));
        let hash = identity.hash64();
        let copy = identity.clone();
        drop(identity);
        assert!(cache.contains(hash));

        drop(copy);
        assert!(cache.wait_for_evictions(WAIT));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, hash);
        assert_eq!(seen[0].1.as_deref(), Some("identity-evictor"));
        assert!(cache.get(hash).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reintern_after_drop_gets_new_generation() {
        let cache = IdentityCache::new().unwrap();
        let first = cache.intern_or_create(name("cycle"));
        let first_generation = first.generation();
        drop(first);

        // Whether or not the evictor has run yet, the new handle must survive it
        let second = cache.intern_or_create(name("cycle"));
        assert!(second.generation() > first_generation);
        assert!(cache.wait_for_evictions(WAIT));
        assert!(cache.get(second.hash64()).unwrap().same_instance(&second));
    }

    #[test]
    fn test_put() {
        let cache = IdentityCache::new().unwrap();
        let identity = MetricIdentity::new(name("put.me"));
        assert!(!identity.is_watched());
        assert!(cache.put(&identity));
        assert!(identity.is_watched());
        assert!(!cache.put(&identity));

        let duplicate = MetricIdentity::new(name("put.me"));
        assert!(!cache.put(&duplicate));
        assert!(cache.intern_or_create(name("put.me")).same_instance(&identity));
    }

    #[test]
    fn test_counters_require_cached_identity() {
        let cache = IdentityCache::new().unwrap();
        let identity = cache.intern_or_create(name("counted"));
        let hash = identity.hash64();

        assert_eq!(cache.incr_counter(hash).unwrap(), 1);
        assert_eq!(cache.incr_counter(hash).unwrap(), 2);
        assert_eq!(cache.decr_counter(hash).unwrap(), 1);
        assert_eq!(cache.incr_thread_counter(hash).unwrap(), 1);

        assert!(matches!(cache.incr_counter(42), Err(VigilError::UnknownIdentity(42))));

        drop(identity);
        assert!(cache.wait_for_evictions(WAIT));
        assert!(cache.counter(hash).is_err());

        // Counters start over for a re-interned identity
        let again = cache.intern_or_create(name("counted"));
        assert_eq!(cache.counter(again.hash64()).unwrap(), 0);
        assert_eq!(cache.thread_counter(again.hash64()).unwrap(), 0);
    }

    #[test]
    fn test_remove_listener() {
        let cache = IdentityCache::new().unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = cache.add_eviction_listener(Arc::new(move |_: &Eviction| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(cache.remove_eviction_listener(id));
        assert!(!cache.remove_eviction_listener(id));

        drop(cache.intern_or_create(name("unheard")));
        assert!(cache.wait_for_evictions(WAIT));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_evictor() {
        let cache = IdentityCache::new().unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        cache.add_eviction_listener(Arc::new(|_: &Eviction| panic!("listener failure")));
        cache.add_eviction_listener(Arc::new(move |_: &Eviction| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        drop(cache.intern_or_create(name("a")));
        drop(cache.intern_or_create(name("b")));
        assert!(cache.wait_for_evictions(WAIT));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handle_held_keeps_entry() {
        let cache = IdentityCache::new().unwrap();
        let identity = cache.intern_or_create(name("held"));
        assert_eq!(identity.strong_count(), 1);
        let looked_up = cache.get(identity.hash64()).unwrap();
        assert_eq!(identity.strong_count(), 2);
        drop(looked_up);
        assert!(cache.wait_for_evictions(WAIT));
        assert!(cache.contains(identity.hash64()));
    }
}
