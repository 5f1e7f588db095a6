//! Per-invocation measurements captured by the instrumentation engine.

use super::metric_kind::MetricKind;
use super::BitFlag;
use std::fmt;

/// One raw value captured around an instrumented region.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurementKind {
    /// Wall-clock nanoseconds
    Elapsed = 0,
    /// Thread CPU nanoseconds
    Cpu = 1,
    /// Thread user-mode CPU nanoseconds
    UserCpu = 2,
    /// Thread user + system CPU nanoseconds
    TotalCpu = 3,
    WaitCount = 4,
    BlockCount = 5,
    WaitTime = 6,
    BlockTime = 7,
    InvokeCount = 8,
    ReturnCount = 9,
    ErrorCount = 10,
    InvokeRate = 11,
    ReturnRate = 12,
    ErrorRate = 13,
}

/// How a measurement fills its buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementStyle {
    /// `enter` captures a baseline, `exit` replaces it with `now - baseline`
    Delta,
    /// `enter` writes 1, exits leave it alone
    CountOnEnter,
    /// `enter` writes 0, a normal `exit` writes 1
    CountOnReturn,
    /// `enter` writes 0, `error_exit` writes 1
    CountOnError,
}

impl MeasurementKind {
    /// Metric kind the aggregated value is folded into
    pub const fn metric_kind(self) -> MetricKind {
        use MeasurementKind::*;
        match self {
            Elapsed | Cpu | UserCpu | TotalCpu | WaitTime | BlockTime => MetricKind::Timer,
            WaitCount | BlockCount => MetricKind::Histogram,
            InvokeCount | ReturnCount | ErrorCount => MetricKind::Counter,
            InvokeRate | ReturnRate | ErrorRate => MetricKind::Meter,
        }
    }

    pub const fn style(self) -> MeasurementStyle {
        use MeasurementKind::*;
        match self {
            InvokeCount | InvokeRate => MeasurementStyle::CountOnEnter,
            ReturnCount | ReturnRate => MeasurementStyle::CountOnReturn,
            ErrorCount | ErrorRate => MeasurementStyle::CountOnError,
            _ => MeasurementStyle::Delta,
        }
    }

    /// Needs thread CPU accounting
    pub const fn is_cpu(self) -> bool {
        matches!(
            self,
            MeasurementKind::Cpu | MeasurementKind::UserCpu | MeasurementKind::TotalCpu
        )
    }

    /// Needs thread contention accounting
    pub const fn is_contention(self) -> bool {
        matches!(
            self,
            MeasurementKind::WaitCount
                | MeasurementKind::BlockCount
                | MeasurementKind::WaitTime
                | MeasurementKind::BlockTime
        )
    }

    /// Measurements whose slot is written by a normal exit
    pub const EXIT_MASK: u32 = !(1 << MeasurementKind::ErrorCount as u32)
        & !(1 << MeasurementKind::ErrorRate as u32);

    /// Measurements whose slot is written by an error exit
    pub const ERROR_EXIT_MASK: u32 = !(1 << MeasurementKind::ReturnCount as u32)
        & !(1 << MeasurementKind::ReturnRate as u32);

    pub fn as_str(self) -> &'static str {
        use MeasurementKind::*;
        match self {
            Elapsed => "elapsed",
            Cpu => "cpu",
            UserCpu => "user_cpu",
            TotalCpu => "total_cpu",
            WaitCount => "wait_count",
            BlockCount => "block_count",
            WaitTime => "wait_time",
            BlockTime => "block_time",
            InvokeCount => "invocations",
            ReturnCount => "returns",
            ErrorCount => "errors",
            InvokeRate => "invocation_rate",
            ReturnRate => "return_rate",
            ErrorRate => "error_rate",
        }
    }
}

impl BitFlag for MeasurementKind {
    const SET: &'static str = "MeasurementKind";
    const ALL: &'static [Self] = &[
        MeasurementKind::Elapsed,
        MeasurementKind::Cpu,
        MeasurementKind::UserCpu,
        MeasurementKind::TotalCpu,
        MeasurementKind::WaitCount,
        MeasurementKind::BlockCount,
        MeasurementKind::WaitTime,
        MeasurementKind::BlockTime,
        MeasurementKind::InvokeCount,
        MeasurementKind::ReturnCount,
        MeasurementKind::ErrorCount,
        MeasurementKind::InvokeRate,
        MeasurementKind::ReturnRate,
        MeasurementKind::ErrorRate,
    ];

    #[inline(always)]
    fn ordinal(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
