//! Sliding-window sample reservoir.
//!
//! Keeps the most recent `capacity` samples in a power-of-two ring of atomic
//! slots so that recording a sample is a single `fetch_add` plus a store.
//! Slots start out holding a NaN marker; only finite samples are stored, so a
//! snapshot can tell a claimed but not yet written slot from a sample.

use super::histogram::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};

pub const DEFAULT_CAPACITY: usize = 1024;

/// Quiet NaN never produced by a recorded sample
const EMPTY_SLOT: u64 = 0x7ff8_0000_e3e3_0001;

/// Lock-free ring of the most recent samples
pub struct SlidingWindowReservoir {
    slots: Box<[AtomicU64]>,
    mask: usize, // For fast modulo via bitwise AND
    written: AtomicU64,
}

impl SlidingWindowReservoir {
    /// Create a new reservoir with the specified capacity
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        assert!(
            capacity.is_power_of_two(),
            "Capacity must be power of 2 for optimal performance"
        );

        let slots: Vec<AtomicU64> = (0..capacity).map(|_| AtomicU64::new(EMPTY_SLOT)).collect();
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            written: AtomicU64::new(0),
        }
    }

    /// Records a finite sample; NaN and infinities are ignored
    #[inline]
    pub fn update(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let n = self.written.fetch_add(1, Ordering::Relaxed);
        let idx = (n as usize) & self.mask;
        self.slots[idx].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Number of samples currently retained
    pub fn size(&self) -> usize {
        let written = self.written.load(Ordering::Acquire);
        (written as usize).min(self.slots.len())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Copies the retained samples.
    ///
    /// A snapshot racing an update may see the claimed slot before its store:
    /// on a ring that has not wrapped yet the slot still holds the empty marker
    /// and is left out, after wrapping it still holds the sample being replaced.
    pub fn snapshot(&self) -> Snapshot {
        let size = self.size();
        let values = self.slots[..size]
            .iter()
            .map(|slot| f64::from_bits(slot.load(Ordering::Relaxed)))
            .collect();
        Snapshot::from_values(values)
    }
}

impl Default for SlidingWindowReservoir {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for SlidingWindowReservoir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowReservoir")
            .field("capacity", &self.slots.len())
            .field("size", &self.size())
            .finish()
    }
}
