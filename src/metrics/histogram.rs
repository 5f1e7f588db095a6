//! Sample distributions.

use super::reservoir::SlidingWindowReservoir;
use std::sync::atomic::{AtomicU64, Ordering};

/// Distribution of recorded samples over a sliding window, plus an all-time count
#[derive(Debug, Default)]
pub struct Histogram {
    count: AtomicU64,
    reservoir: SlidingWindowReservoir,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            count: AtomicU64::new(0),
            reservoir: SlidingWindowReservoir::new(capacity),
        }
    }

    /// Records a sample. NaN and infinite samples are dropped and not counted.
    #[inline]
    pub fn update(&self, value: f64) {
        if !value.is_finite() {
            tracing::trace!(value, "Dropping non-finite histogram sample");
            return;
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        self.reservoir.update(value);
    }

    /// Samples recorded since creation
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.reservoir.snapshot()
    }
}

/// Sorted copy of a histogram's retained samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: Vec<f64>,
}

impl Snapshot {
    /// Sorts `values`, discarding NaN and infinite entries
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.retain(|v| v.is_finite());
        values.sort_unstable_by(f64::total_cmp);
        Self { values }
    }

    /// Sorted samples
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    pub fn max(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Sample standard deviation
    pub fn std_dev(&self) -> f64 {
        let n = self.values.len();
        if n <= 1 {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq: f64 = self.values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (sum_sq / (n - 1) as f64).sqrt()
    }

    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    /// Nearest-rank quantile, `q` in `[0, 1]`
    pub fn quantile(&self, q: f64) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let q = q.clamp(0.0, 1.0);
        let index = ((self.values.len() - 1) as f64 * q) as usize;
        self.values[index.min(self.values.len() - 1)]
    }
}
