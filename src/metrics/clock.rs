//! Monotonic time sources for rate calculations.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic nanosecond time source
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_nanos(&self) -> u64;
}

/// Nanoseconds elapsed since the first use of the process-wide anchor
#[inline]
pub fn monotonic_nanos() -> u64 {
    ANCHOR.elapsed().as_nanos() as u64
}

/// The default clock, backed by [`Instant`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        monotonic_nanos()
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
