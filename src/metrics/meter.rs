//! Event rates: mean rate plus 1, 5 and 15 minute exponentially weighted moving averages.

use super::clock::{Clock, MonotonicClock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Per-second rates of a meter at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rates {
    pub mean: f64,
    pub m1: f64,
    pub m5: f64,
    pub m15: f64,
}

/// Exponentially weighted moving average ticked at a fixed interval.
///
/// `update` may be called from any thread; `tick` must only be called by the
/// single thread that won the meter's tick race.
#[derive(Debug)]
pub struct Ewma {
    alpha: f64,
    interval_nanos: f64,
    uncounted: AtomicU64,
    /// Events per nanosecond
    rate: AtomicU64,
    initialized: AtomicBool,
}

impl Ewma {
    pub fn new(alpha: f64, interval: Duration) -> Self {
        Self {
            alpha,
            interval_nanos: interval.as_nanos() as f64,
            uncounted: AtomicU64::new(0),
            rate: AtomicU64::new(0f64.to_bits()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Average over `minutes`, ticked every five seconds
    pub fn over_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self::new(alpha, TICK_INTERVAL)
    }

    #[inline]
    pub fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::Relaxed);
        let instant_rate = count as f64 / self.interval_nanos;
        if self.initialized.load(Ordering::Acquire) {
            let rate = f64::from_bits(self.rate.load(Ordering::Relaxed));
            let next = rate + self.alpha * (instant_rate - rate);
            self.rate.store(next.to_bits(), Ordering::Relaxed);
        } else {
            self.rate.store(instant_rate.to_bits(), Ordering::Relaxed);
            self.initialized.store(true, Ordering::Release);
        }
    }

    /// Current rate in events per second
    pub fn per_second(&self) -> f64 {
        f64::from_bits(self.rate.load(Ordering::Relaxed)) * 1e9
    }
}

/// Counts events and tracks their throughput
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    start_nanos: u64,
    last_tick: AtomicU64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
    clock: Arc<dyn Clock>,
}

impl Meter {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_nanos();
        Self {
            count: AtomicU64::new(0),
            start_nanos: now,
            last_tick: AtomicU64::new(now),
            m1: Ewma::over_minutes(1.0),
            m5: Ewma::over_minutes(5.0),
            m15: Ewma::over_minutes(15.0),
            clock,
        }
    }

    #[inline]
    pub fn mark_one(&self) {
        self.mark(1);
    }

    pub fn mark(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Events per second since creation
    pub fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.clock.now_nanos().saturating_sub(self.start_nanos);
        if elapsed == 0 {
            return 0.0;
        }
        count as f64 / elapsed as f64 * 1e9
    }

    pub fn one_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m1.per_second()
    }

    pub fn five_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m5.per_second()
    }

    pub fn fifteen_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m15.per_second()
    }

    /// All rates read at one instant
    pub fn rates(&self) -> Rates {
        self.tick_if_necessary();
        Rates {
            mean: self.mean_rate(),
            m1: self.m1.per_second(),
            m5: self.m5.per_second(),
            m15: self.m15.per_second(),
        }
    }

    fn tick_if_necessary(&self) {
        let old_tick = self.last_tick.load(Ordering::Acquire);
        let now = self.clock.now_nanos();
        let age = now.saturating_sub(old_tick);
        let interval = TICK_INTERVAL.as_nanos() as u64;
        if age <= interval {
            return;
        }

        let new_interval_start = now - age % interval;
        if self
            .last_tick
            .compare_exchange(old_tick, new_interval_start, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            for _ in 0..age / interval {
                self.m1.tick();
                self.m5.tick();
                self.m15.tick();
            }
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}
