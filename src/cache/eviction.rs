//! Eviction notifications and the background thread that delivers them.

use crate::core::MetricName;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::Shared;

/// An interned identity whose last handle was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub hash: u64,
    /// Cache generation of the evicted handle; a later re-intern of the same
    /// hash gets a higher generation
    pub generation: u64,
    pub name: MetricName,
}

/// Receives eviction notifications on the cache's evictor thread
pub trait EvictionListener: Send + Sync {
    fn on_eviction(&self, eviction: &Eviction);
}

impl<F> EvictionListener for F
where
    F: Fn(&Eviction) + Send + Sync,
{
    fn on_eviction(&self, eviction: &Eviction) {
        self(eviction)
    }
}

/// Handle returned by listener registration, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

pub(crate) enum Message {
    Evicted(Eviction),
    Shutdown,
}

/// Sending half shared by every watched handle
pub(crate) struct EvictionQueue {
    sender: Sender<Message>,
    pending: AtomicUsize,
}

impl EvictionQueue {
    pub(crate) fn new(sender: Sender<Message>) -> Self {
        Self {
            sender,
            pending: AtomicUsize::new(0),
        }
    }

    /// Never blocks: the channel is unbounded
    pub(crate) fn push(&self, eviction: Eviction) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(Message::Evicted(eviction)).is_err() {
            // Evictor already gone; the cache is being torn down
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Message::Shutdown);
    }

    /// Evictions queued but not yet fully delivered
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Body of the evictor thread
pub(crate) fn run_evictor(shared: Arc<Shared>, queue: Arc<EvictionQueue>, rx: Receiver<Message>) {
    tracing::debug!("Identity evictor started");

    while let Ok(message) = rx.recv() {
        match message {
            Message::Evicted(eviction) => {
                process(&shared, &eviction);
                queue.complete();
            },
            Message::Shutdown => break,
        }
    }

    tracing::debug!("Identity evictor stopped");
}

fn process(shared: &Shared, eviction: &Eviction) {
    let removed = shared
        .table
        .remove_if(&eviction.hash, |_, entry| entry.generation == eviction.generation)
        .is_some();

    // A newer generation owns the counters if the hash was re-interned meanwhile
    if removed {
        shared.counters.invalidate(eviction.hash);
    }

    tracing::debug!(
        metric = %eviction.name,
        hash = eviction.hash,
        generation = eviction.generation,
        removed,
        "Evicted metric identity"
    );

    let listeners = shared.listeners.load();
    for (id, listener) in listeners.iter() {
        let result = panic::catch_unwind(AssertUnwindSafe(|| listener.on_eviction(eviction)));
        if result.is_err() {
            tracing::error!(
                listener = id.0,
                metric = %eviction.name,
                "Eviction listener panicked"
            );
        }
    }
}
