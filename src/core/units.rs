//! Time units used to scale reported rates and durations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit that reported rates are expressed per, or that timer durations are converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Length of one unit in nanoseconds.
    pub const fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60_000_000_000,
            TimeUnit::Hours => 3_600_000_000_000,
            TimeUnit::Days => 86_400_000_000_000,
        }
    }

    /// Length of one unit in seconds.
    pub fn seconds(self) -> f64 {
        self.nanos() as f64 / 1e9
    }

    /// Converts a per-second rate into a per-unit rate.
    #[inline]
    pub fn scale_rate(self, per_second: f64) -> f64 {
        per_second * self.seconds()
    }

    /// Converts a nanosecond quantity into this unit.
    #[inline]
    pub fn from_nanos(self, nanos: f64) -> f64 {
        nanos / self.nanos() as f64
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "nanoseconds",
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ns" | "nanos" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            "us" | "micros" | "microseconds" => Ok(TimeUnit::Microseconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "secs" | "seconds" => Ok(TimeUnit::Seconds),
            "m" | "mins" | "minutes" => Ok(TimeUnit::Minutes),
            "h" | "hours" => Ok(TimeUnit::Hours),
            "d" | "days" => Ok(TimeUnit::Days),
            _ => Err(format!("Unknown time unit: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_scaling() {
        assert_eq!(TimeUnit::Seconds.scale_rate(2.0), 2.0);
        assert_eq!(TimeUnit::Minutes.scale_rate(2.0), 120.0);
        assert!((TimeUnit::Milliseconds.scale_rate(2.0) - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_duration_conversion() {
        assert_eq!(TimeUnit::Milliseconds.from_nanos(5_000_000.0), 5.0);
        assert_eq!(TimeUnit::Nanoseconds.from_nanos(42.0), 42.0);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("ms".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!("Seconds".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }
}
