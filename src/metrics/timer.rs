//! Durations with both a distribution and a throughput.

use super::clock::{monotonic_nanos, Clock};
use super::histogram::{Histogram, Snapshot};
use super::meter::{Meter, Rates};
use std::sync::Arc;
use std::time::Duration;

/// Histogram of durations in nanoseconds plus a meter of how often they occur
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            histogram: Histogram::new(),
            meter: Meter::with_clock(clock),
        }
    }

    #[inline]
    pub fn update(&self, duration: Duration) {
        self.histogram.update(duration.as_nanos() as f64);
        self.meter.mark_one();
    }

    /// Runs `f` and records how long it took
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        f()
    }

    /// Starts timing; the elapsed time is recorded when the guard drops
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: monotonic_nanos(),
        }
    }

    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    /// Snapshot of durations in nanoseconds
    pub fn snapshot(&self) -> Snapshot {
        self.histogram.snapshot()
    }

    pub fn rates(&self) -> Rates {
        self.meter.rates()
    }
}

/// Records the time since [`Timer::start`] on drop
#[must_use = "the timing is recorded when the guard is dropped"]
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    started: u64,
}

impl TimerGuard<'_> {
    /// Stops timing now and returns the recorded duration
    pub fn stop(self) -> Duration {
        Duration::from_nanos(monotonic_nanos().saturating_sub(self.started))
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let elapsed = monotonic_nanos().saturating_sub(self.started);
        self.timer.update(Duration::from_nanos(elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_feeds_both_halves() {
        let timer = Timer::new();
        timer.update(Duration::from_millis(2));
        timer.update(Duration::from_millis(4));

        assert_eq!(timer.count(), 2);
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.min(), 2_000_000.0);
        assert_eq!(snapshot.max(), 4_000_000.0);
    }

    #[test]
    fn test_time_closure() {
        let timer = Timer::new();
        let value = timer.time(|| {
            std::thread::sleep(Duration::from_millis(5));
            42
        });
        assert_eq!(value, 42);
        assert_eq!(timer.count(), 1);
        assert!(timer.snapshot().max() >= 5_000_000.0);
    }

    #[test]
    fn test_guard_records_once() {
        let timer = Timer::new();
        let guard = timer.start();
        let elapsed = guard.stop();
        assert_eq!(timer.count(), 1);
        assert!(timer.snapshot().max() >= elapsed.as_nanos() as f64 - 1.0);
    }
}
