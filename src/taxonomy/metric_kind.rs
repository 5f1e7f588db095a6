//! The five metric kinds a registration can be bound to.

use super::sub_value::SubValue;
use super::BitFlag;
use crate::metrics::LiveMetric;
use std::fmt;
use std::time::Duration;

/// Which instrument backs a registered metric.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge = 0,
    Counter = 1,
    Histogram = 2,
    Meter = 3,
    Timer = 4,
}

const fn bits(members: &[SubValue]) -> u32 {
    let mut mask = 0;
    let mut i = 0;
    while i < members.len() {
        mask |= 1 << members[i] as u32;
        i += 1;
    }
    mask
}

use SubValue::*;

const GAUGE_FULL: u32 = bits(&[GaugeValue]);
const COUNTER_FULL: u32 = bits(&[Count]);
const HISTOGRAM_FULL: u32 = bits(&[
    Count, HCount, Min, Max, Mean, StdDev, Median, P75, P95, P98, P99, P999,
]);
const HISTOGRAM_DEFAULT: u32 = bits(&[Count, Min, Max, Mean, Median, P95, P99]);
const METER_FULL: u32 = bits(&[Count, MCount, MeanRate, M1, M5, M15]);
const METER_DEFAULT: u32 = bits(&[Count, M1, M5, M15]);
const TIMER_FULL: u32 = bits(&[
    Count, TCount, Min, Max, Mean, StdDev, Median, P75, P95, P98, P99, P999, MeanRate, M1, M5,
    M15,
]);
const TIMER_DEFAULT: u32 = bits(&[
    Count, Min, Max, Mean, Median, P95, P99, M1, M5, M15,
]);

impl MetricKind {
    /// Sub-values this kind can produce
    pub const fn full_mask(self) -> u32 {
        match self {
            MetricKind::Gauge => GAUGE_FULL,
            MetricKind::Counter => COUNTER_FULL,
            MetricKind::Histogram => HISTOGRAM_FULL,
            MetricKind::Meter => METER_FULL,
            MetricKind::Timer => TIMER_FULL,
        }
    }

    /// Sub-values reported when no mask is configured
    pub const fn default_mask(self) -> u32 {
        match self {
            MetricKind::Gauge => GAUGE_FULL,
            MetricKind::Counter => COUNTER_FULL,
            MetricKind::Histogram => HISTOGRAM_DEFAULT,
            MetricKind::Meter => METER_DEFAULT,
            MetricKind::Timer => TIMER_DEFAULT,
        }
    }

    /// The single value written under the metric's own identity, for kinds that have one.
    /// Histograms, meters and timers are reported only through their sub-values.
    pub const fn primary(self) -> Option<SubValue> {
        match self {
            MetricKind::Gauge => Some(GaugeValue),
            MetricKind::Counter => Some(Count),
            _ => None,
        }
    }

    /// Applies a raw inbound value to a live instance of this kind.
    ///
    /// Counters add the (truncated) value, gauges replace theirs, histograms
    /// take a sample, meters mark the (truncated) value as events and timers
    /// record the value as a duration in nanoseconds. Returns false when the
    /// instance is of a different kind.
    pub fn write(self, raw: f64, instance: &LiveMetric) -> bool {
        match (self, instance) {
            (MetricKind::Gauge, LiveMetric::Gauge(g)) => g.set(raw),
            (MetricKind::Counter, LiveMetric::Counter(c)) => c.inc_by(raw as i64),
            (MetricKind::Histogram, LiveMetric::Histogram(h)) => h.update(raw),
            (MetricKind::Meter, LiveMetric::Meter(m)) => m.mark(raw.max(0.0) as u64),
            (MetricKind::Timer, LiveMetric::Timer(t)) => {
                t.update(Duration::from_nanos(raw.max(0.0) as u64))
            },
            _ => return false,
        }
        true
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
            MetricKind::Meter => "meter",
            MetricKind::Timer => "timer",
        }
    }
}

impl BitFlag for MetricKind {
    const SET: &'static str = "MetricKind";
    const ALL: &'static [Self] = &[
        MetricKind::Gauge,
        MetricKind::Counter,
        MetricKind::Histogram,
        MetricKind::Meter,
        MetricKind::Timer,
    ];

    #[inline(always)]
    fn ordinal(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Counter, Gauge, Histogram};
    use std::sync::Arc;

    #[test]
    fn test_default_is_subset_of_full() {
        for kind in MetricKind::ALL {
            assert_eq!(kind.default_mask() & !kind.full_mask(), 0, "{}", kind);
            assert_ne!(kind.default_mask(), 0);
        }
    }

    #[test]
    fn test_timer_is_union_of_meter_and_histogram() {
        let union = (MetricKind::Histogram.full_mask() | MetricKind::Meter.full_mask())
            & !HCount.bit()
            & !MCount.bit();
        assert_eq!(MetricKind::Timer.full_mask() & !TCount.bit(), union);
    }

    #[test]
    fn test_write_dispatch() {
        let counter = LiveMetric::Counter(Arc::new(Counter::new()));
        assert!(MetricKind::Counter.write(3.0, &counter));
        assert!(MetricKind::Counter.write(2.0, &counter));
        assert_eq!(counter.as_counter().unwrap().count(), 5);

        let gauge = LiveMetric::Gauge(Arc::new(Gauge::new()));
        assert!(MetricKind::Gauge.write(7.5, &gauge));
        assert_eq!(gauge.as_gauge().unwrap().value(), 7.5);

        let histogram = LiveMetric::Histogram(Arc::new(Histogram::new()));
        assert!(MetricKind::Histogram.write(10.0, &histogram));
        assert_eq!(histogram.as_histogram().unwrap().count(), 1);
    }

    #[test]
    fn test_write_rejects_other_kinds() {
        let counter = LiveMetric::Counter(Arc::new(Counter::new()));
        assert!(!MetricKind::Gauge.write(1.0, &counter));
        assert_eq!(counter.as_counter().unwrap().count(), 0);
    }

    #[test]
    fn test_primary_values() {
        assert_eq!(MetricKind::Counter.primary(), Some(Count));
        assert_eq!(MetricKind::Gauge.primary(), Some(GaugeValue));
        assert_eq!(MetricKind::Timer.primary(), None);
    }
}
