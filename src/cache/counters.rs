//! Lightweight per-identity usage counters.

use ahash::AHashMap;
use dashmap::DashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

type ThreadTable = DashMap<ThreadId, AHashMap<u64, i64>>;

/// Counters keyed by identity hash and by (thread, identity hash).
///
/// Counters are created on first use and are not themselves watched; the
/// cache invalidates them when their identity is evicted. A thread's counters
/// are dropped when that thread exits.
#[derive(Debug, Default)]
pub(crate) struct IdentityCounters {
    global: DashMap<u64, AtomicI64>,
    per_thread: Arc<ThreadTable>,
}

/// Per-thread record of the tables holding this thread's counters
struct ThreadExit {
    id: ThreadId,
    tables: RefCell<Vec<Weak<ThreadTable>>>,
}

impl ThreadExit {
    fn track(&self, table: &Arc<ThreadTable>) {
        let mut tables = self.tables.borrow_mut();
        tables.retain(|t| t.strong_count() > 0);
        if !tables.iter().any(|t| std::ptr::eq(t.as_ptr(), Arc::as_ptr(table))) {
            tables.push(Arc::downgrade(table));
        }
    }
}

impl Drop for ThreadExit {
    fn drop(&mut self) {
        for table in self.tables.get_mut().drain(..) {
            if let Some(table) = table.upgrade() {
                table.remove(&self.id);
            }
        }
    }
}

thread_local! {
    static THREAD_EXIT: ThreadExit = ThreadExit {
        id: thread::current().id(),
        tables: RefCell::new(Vec::new()),
    };
}

impl IdentityCounters {
    pub(crate) fn add(&self, hash: u64, delta: i64) -> i64 {
        if let Some(counter) = self.global.get(&hash) {
            return counter.fetch_add(delta, Ordering::Relaxed) + delta;
        }
        let counter = self.global.entry(hash).or_insert_with(|| AtomicI64::new(0));
        counter.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub(crate) fn get(&self, hash: u64) -> i64 {
        self.global
            .get(&hash)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    pub(crate) fn add_for_current_thread(&self, hash: u64, delta: i64) -> i64 {
        let id = thread::current().id();
        let mut counts = match self.per_thread.get_mut(&id) {
            Some(counts) => counts,
            None => {
                // Already exiting: the entry outlives the thread until eviction
                let _ = THREAD_EXIT.try_with(|exit| exit.track(&self.per_thread));
                self.per_thread.entry(id).or_default()
            },
        };
        let slot = counts.entry(hash).or_insert(0);
        *slot += delta;
        *slot
    }

    pub(crate) fn get_for_current_thread(&self, hash: u64) -> i64 {
        self.per_thread
            .get(&thread::current().id())
            .and_then(|counts| counts.get(&hash).copied())
            .unwrap_or(0)
    }

    pub(crate) fn invalidate(&self, hash: u64) {
        self.global.remove(&hash);
        for mut counts in self.per_thread.iter_mut() {
            counts.remove(&hash);
        }
    }

    #[cfg(test)]
    fn threads_tracked(&self) -> usize {
        self.per_thread.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_counter() {
        let counters = IdentityCounters::default();
        assert_eq!(counters.add(7, 1), 1);
        assert_eq!(counters.add(7, 2), 3);
        assert_eq!(counters.add(7, -1), 2);
        assert_eq!(counters.get(7), 2);
        assert_eq!(counters.get(8), 0);
    }

    #[test]
    fn test_thread_counters_are_separate() {
        let counters = std::sync::Arc::new(IdentityCounters::default());
        counters.add_for_current_thread(7, 5);

        let other = std::sync::Arc::clone(&counters);
        let seen = thread::spawn(move || {
            other.add_for_current_thread(7, 1);
            other.get_for_current_thread(7)
        })
        .join()
        .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(counters.get_for_current_thread(7), 5);
    }

    #[test]
    fn test_exited_thread_counters_dropped() {
        let counters = std::sync::Arc::new(IdentityCounters::default());
        counters.add_for_current_thread(7, 2);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = std::sync::Arc::clone(&counters);
                thread::spawn(move || {
                    counters.add_for_current_thread(7, 1);
                    counters.add_for_current_thread(9, 1);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.threads_tracked(), 1);
        assert_eq!(counters.get_for_current_thread(7), 2);
    }

    #[test]
    fn test_invalidate() {
        let counters = IdentityCounters::default();
        counters.add(7, 3);
        counters.add_for_current_thread(7, 3);
        counters.add(8, 1);

        counters.invalidate(7);
        assert_eq!(counters.get(7), 0);
        assert_eq!(counters.get_for_current_thread(7), 0);
        assert_eq!(counters.get(8), 1);
    }
}
