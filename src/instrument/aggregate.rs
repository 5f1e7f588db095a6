//! Folding raw measurement buffers into registry metrics.

use super::buffer::MeasurementBuffer;
use super::InstrumentationEngine;
use crate::core::{Result, VigilError};

impl InstrumentationEngine {
    /// Applies every value of `buffer` to the sub-metric of the buffer's owner
    /// named after the measurement, using the measurement's metric kind.
    ///
    /// Returns the number of values written. Fails with `UnknownIdentity` if
    /// the owner is not in the identity cache.
    pub fn fold(&self, buffer: &MeasurementBuffer) -> Result<usize> {
        let owner = buffer.owner();
        if !self.registry.cache().contains(owner) {
            return Err(VigilError::UnknownIdentity(owner));
        }

        let mut written = 0;
        for (kind, value) in buffer.values() {
            let metric_kind = kind.metric_kind();
            let target = self.registry.sub_metric(owner, kind.as_str(), metric_kind)?;
            if metric_kind.write(value as f64, target.instance()) {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Folds a batch of buffers. A buffer that fails is logged and skipped.
    pub fn fold_all(&self, buffers: &[MeasurementBuffer]) -> usize {
        buffers
            .iter()
            .filter_map(|buffer| match self.fold(buffer) {
                Ok(written) => Some(written),
                Err(e) => {
                    tracing::warn!(
                        hash = buffer.owner(),
                        category = e.category(),
                        "Dropping measurement buffer: {}",
                        e
                    );
                    None
                },
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IdentityCache;
    use crate::core::MetricName;
    use crate::registry::MetricRegistry;
    use crate::taxonomy::{BitFlag, MeasurementKind, MetricKind};
    use std::sync::Arc;

    fn engine() -> InstrumentationEngine {
        let registry = MetricRegistry::new(Arc::new(IdentityCache::new().unwrap()));
        InstrumentationEngine::new(registry, 0)
    }

    #[test]
    fn test_fold_into_sub_metrics() {
        let engine = engine();
        let owner = engine
            .registry()
            .identity(MetricName::new("orders.submit").unwrap());
        let mask = MeasurementKind::mask_for(&[
            MeasurementKind::Elapsed,
            MeasurementKind::InvokeCount,
            MeasurementKind::ErrorCount,
        ]);

        for _ in 0..3 {
            let mut buffer = engine.allocate(owner.hash64(), mask);
            buffer.enter();
            buffer.exit();
            assert_eq!(engine.fold(&buffer).unwrap(), 3);
        }

        let children = engine.registry().children(owner.hash64());
        let mut rendered: Vec<String> = children.iter().map(|n| n.rendered()).collect();
        rendered.sort();
        assert_eq!(
            rendered,
            vec!["orders.submit.elapsed", "orders.submit.errors", "orders.submit.invocations"]
        );

        let invocations = engine
            .registry()
            .sub_metric(owner.hash64(), "invocations", MetricKind::Counter)
            .unwrap();
        assert_eq!(invocations.instance().as_counter().unwrap().count(), 3);

        let elapsed = engine
            .registry()
            .sub_metric(owner.hash64(), "elapsed", MetricKind::Timer)
            .unwrap();
        assert_eq!(elapsed.instance().as_timer().unwrap().count(), 3);
    }

    #[test]
    fn test_fold_unknown_owner() {
        let engine = engine();
        let buffer = engine.allocate(99, MeasurementKind::InvokeCount.bit());
        assert!(matches!(engine.fold(&buffer), Err(VigilError::UnknownIdentity(99))));
        assert_eq!(engine.fold_all(&[buffer]), 0);
    }
}
