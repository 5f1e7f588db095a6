use std::sync::atomic::{AtomicU64, Ordering};

/// Last-value-wins floating point gauge
#[derive(Debug)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::with_value(0.0)
    }

    pub fn with_value(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline(always)]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read() {
        let gauge = Gauge::new();
        assert_eq!(gauge.value(), 0.0);
        gauge.set(73.5);
        assert_eq!(gauge.value(), 73.5);
        gauge.set(-1.25);
        assert_eq!(gauge.value(), -1.25);
    }
}
