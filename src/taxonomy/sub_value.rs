//! Derived values a metric can be reported as.

use super::metric_kind::MetricKind;
use super::BitFlag;
use crate::core::TimeUnit;
use crate::metrics::{Rates, Snapshot};

/// A derived statistic of a live metric that can be enabled for reporting on its own.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubValue {
    GaugeValue = 0,
    Count = 1,
    HCount = 2,
    TCount = 3,
    MCount = 4,
    Min = 5,
    Max = 6,
    Mean = 7,
    StdDev = 8,
    Median = 9,
    P75 = 10,
    P95 = 11,
    P98 = 12,
    P99 = 13,
    P999 = 14,
    MeanRate = 15,
    M1 = 16,
    M5 = 17,
    M15 = 18,
}

/// Point-in-time view of one live metric, taken once per reporting tick so
/// that every sub-value of the metric is read from the same state.
#[derive(Debug, Clone)]
pub struct Reading {
    pub kind: MetricKind,
    /// Gauge value (counters also mirror their count here)
    pub value: f64,
    pub count: u64,
    pub snapshot: Option<Snapshot>,
    /// Per-second rates
    pub rates: Option<Rates>,
}

/// Units applied when reading rate and timer-duration sub-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    pub rate: TimeUnit,
    pub duration: TimeUnit,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            rate: TimeUnit::Seconds,
            duration: TimeUnit::Milliseconds,
        }
    }
}

impl SubValue {
    /// Distribution statistics, governed by the snapshot mask
    pub const SNAPSHOT_MASK: u32 = (1 << SubValue::Count as u32)
        | (1 << SubValue::HCount as u32)
        | (1 << SubValue::TCount as u32)
        | (1 << SubValue::Min as u32)
        | (1 << SubValue::Max as u32)
        | (1 << SubValue::Mean as u32)
        | (1 << SubValue::StdDev as u32)
        | (1 << SubValue::Median as u32)
        | (1 << SubValue::P75 as u32)
        | (1 << SubValue::P95 as u32)
        | (1 << SubValue::P98 as u32)
        | (1 << SubValue::P99 as u32)
        | (1 << SubValue::P999 as u32);

    /// Rate statistics, governed by the metered mask
    pub const METERED_MASK: u32 = (1 << SubValue::Count as u32)
        | (1 << SubValue::TCount as u32)
        | (1 << SubValue::MCount as u32)
        | (1 << SubValue::MeanRate as u32)
        | (1 << SubValue::M1 as u32)
        | (1 << SubValue::M5 as u32)
        | (1 << SubValue::M15 as u32);

    /// True if `kind` declares this sub-value
    #[inline]
    pub fn applies_to(self, kind: MetricKind) -> bool {
        kind.full_mask() & self.bit() != 0
    }

    /// Sub-values of `kind` selected for reporting.
    ///
    /// A configured snapshot mask selects among distribution statistics and a
    /// configured metered mask among rate statistics; an unconfigured mask
    /// falls back to the kind's defaults for that category. The result is
    /// always within the kind's full capability.
    pub fn select(kind: MetricKind, snapshot_mask: Option<u32>, metered_mask: Option<u32>) -> u32 {
        let default = kind.default_mask();
        let (distribution, rated) = match kind {
            MetricKind::Gauge | MetricKind::Counter => return kind.full_mask(),
            MetricKind::Histogram => (true, false),
            MetricKind::Meter => (false, true),
            MetricKind::Timer => (true, true),
        };
        let mut mask = 0;
        if distribution {
            mask |= snapshot_mask.unwrap_or(default) & Self::SNAPSHOT_MASK;
        }
        if rated {
            mask |= metered_mask.unwrap_or(default) & Self::METERED_MASK;
        }
        mask & kind.full_mask()
    }

    /// Reads this sub-value from a reading. Returns `None` when the reading's
    /// kind does not declare this sub-value.
    pub fn read(self, reading: &Reading, units: &Units) -> Option<f64> {
        if !self.applies_to(reading.kind) {
            return None;
        }
        let duration = |v: f64| match reading.kind {
            MetricKind::Timer => units.duration.from_nanos(v),
            _ => v,
        };
        let snapshot = || reading.snapshot.as_ref();
        let rates = || reading.rates.as_ref();

        match self {
            SubValue::GaugeValue => Some(reading.value),
            SubValue::Count | SubValue::HCount | SubValue::TCount | SubValue::MCount => {
                match reading.kind {
                    MetricKind::Counter => Some(reading.value),
                    _ => Some(reading.count as f64),
                }
            },
            SubValue::Min => snapshot().map(|s| duration(s.min())),
            SubValue::Max => snapshot().map(|s| duration(s.max())),
            SubValue::Mean => snapshot().map(|s| duration(s.mean())),
            SubValue::StdDev => snapshot().map(|s| duration(s.std_dev())),
            SubValue::Median => snapshot().map(|s| duration(s.median())),
            SubValue::P75 => snapshot().map(|s| duration(s.quantile(0.75))),
            SubValue::P95 => snapshot().map(|s| duration(s.quantile(0.95))),
            SubValue::P98 => snapshot().map(|s| duration(s.quantile(0.98))),
            SubValue::P99 => snapshot().map(|s| duration(s.quantile(0.99))),
            SubValue::P999 => snapshot().map(|s| duration(s.quantile(0.999))),
            SubValue::MeanRate => rates().map(|r| units.rate.scale_rate(r.mean)),
            SubValue::M1 => rates().map(|r| units.rate.scale_rate(r.m1)),
            SubValue::M5 => rates().map(|r| units.rate.scale_rate(r.m5)),
            SubValue::M15 => rates().map(|r| units.rate.scale_rate(r.m15)),
        }
    }
}

impl BitFlag for SubValue {
    const SET: &'static str = "SubValue";
    const ALL: &'static [Self] = &[
        SubValue::GaugeValue,
        SubValue::Count,
        SubValue::HCount,
        SubValue::TCount,
        SubValue::MCount,
        SubValue::Min,
        SubValue::Max,
        SubValue::Mean,
        SubValue::StdDev,
        SubValue::Median,
        SubValue::P75,
        SubValue::P95,
        SubValue::P98,
        SubValue::P99,
        SubValue::P999,
        SubValue::MeanRate,
        SubValue::M1,
        SubValue::M5,
        SubValue::M15,
    ];

    #[inline(always)]
    fn ordinal(self) -> u32 {
        self as u32
    }

    /// Also used as the extension of the derived series
    fn name(self) -> &'static str {
        match self {
            SubValue::GaugeValue => "value",
            SubValue::Count => "count",
            SubValue::HCount => "hcount",
            SubValue::TCount => "tcount",
            SubValue::MCount => "mcount",
            SubValue::Min => "min",
            SubValue::Max => "max",
            SubValue::Mean => "mean",
            SubValue::StdDev => "stddev",
            SubValue::Median => "median",
            SubValue::P75 => "p75",
            SubValue::P95 => "p95",
            SubValue::P98 => "p98",
            SubValue::P99 => "p99",
            SubValue::P999 => "p999",
            SubValue::MeanRate => "mean_rate",
            SubValue::M1 => "m1",
            SubValue::M5 => "m5",
            SubValue::M15 => "m15",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_reading(values: &[f64], kind: MetricKind) -> Reading {
        Reading {
            kind,
            value: 0.0,
            count: values.len() as u64,
            snapshot: Some(Snapshot::from_values(values.to_vec())),
            rates: None,
        }
    }

    #[test]
    fn test_select_uses_defaults_when_unconfigured() {
        assert_eq!(
            SubValue::select(MetricKind::Histogram, None, None),
            MetricKind::Histogram.default_mask()
        );
        assert_eq!(
            SubValue::select(MetricKind::Timer, None, None),
            MetricKind::Timer.default_mask()
        );
    }

    #[test]
    fn test_select_configured_snapshot_mask() {
        let mask = SubValue::mask_for(&[SubValue::Count, SubValue::Mean, SubValue::Max]);
        let selected = SubValue::select(MetricKind::Histogram, Some(mask), None);
        assert_eq!(selected, mask);

        // Rate statistics of a timer still come from the metered defaults
        let timer = SubValue::select(MetricKind::Timer, Some(mask), None);
        assert!(SubValue::M1.is_enabled(timer));
        assert!(!SubValue::P99.is_enabled(timer));
    }

    #[test]
    fn test_select_never_exceeds_capability() {
        let everything = SubValue::all_mask();
        for kind in MetricKind::ALL {
            assert_eq!(
                SubValue::select(*kind, Some(everything), Some(everything)),
                kind.full_mask()
            );
        }
    }

    #[test]
    fn test_read_histogram_values() {
        let reading = histogram_reading(&[10.0, 20.0, 30.0], MetricKind::Histogram);
        let units = Units::default();

        assert_eq!(SubValue::Count.read(&reading, &units), Some(3.0));
        assert_eq!(SubValue::Mean.read(&reading, &units), Some(20.0));
        assert_eq!(SubValue::Max.read(&reading, &units), Some(30.0));
        assert_eq!(SubValue::Median.read(&reading, &units), Some(20.0));
        assert_eq!(SubValue::M1.read(&reading, &units), None);
    }

    #[test]
    fn test_read_timer_converts_durations() {
        let reading = histogram_reading(&[2_000_000.0, 4_000_000.0], MetricKind::Timer);
        let units = Units {
            rate: TimeUnit::Seconds,
            duration: TimeUnit::Milliseconds,
        };
        assert_eq!(SubValue::Mean.read(&reading, &units), Some(3.0));
        assert_eq!(SubValue::Max.read(&reading, &units), Some(4.0));
    }

    #[test]
    fn test_read_rates_in_rate_unit() {
        let reading = Reading {
            kind: MetricKind::Meter,
            value: 0.0,
            count: 120,
            snapshot: None,
            rates: Some(Rates {
                mean: 2.0,
                m1: 1.0,
                m5: 0.5,
                m15: 0.25,
            }),
        };
        let units = Units {
            rate: TimeUnit::Minutes,
            duration: TimeUnit::Milliseconds,
        };
        assert_eq!(SubValue::MeanRate.read(&reading, &units), Some(120.0));
        assert_eq!(SubValue::M1.read(&reading, &units), Some(60.0));
        assert_eq!(SubValue::MCount.read(&reading, &units), Some(120.0));
    }
}
