//! Low-overhead per-invocation measurement.
//!
//! A [`MeasurementBuffer`] is allocated on the caller's stack for each
//! measured invocation, filled by `enter` and `exit`/`error_exit`, and later
//! folded into the registry, where each measurement becomes a sub-metric of
//! the owner identity (`<owner>.elapsed`, `<owner>.invocations`, ...).

mod aggregate;
pub mod buffer;
pub mod platform;

pub use buffer::MeasurementBuffer;
pub use platform::{platform_disabled, ThreadUsage};

use crate::registry::MetricRegistry;
use crate::taxonomy::{BitFlag, MeasurementKind};
use std::sync::Arc;

/// Allocates measurement buffers and folds them into the registry
#[derive(Debug)]
pub struct InstrumentationEngine {
    registry: Arc<MetricRegistry>,
    disabled: u32,
}

impl InstrumentationEngine {
    /// `disabled` is subtracted from every allocation on top of the platform-disabled mask
    pub fn new(registry: Arc<MetricRegistry>, disabled: u32) -> Self {
        let disabled = disabled | platform_disabled();
        tracing::debug!(
            disabled = %MeasurementKind::names_for(disabled),
            "Instrumentation engine ready"
        );
        Self { registry, disabled }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Measurements never captured by this engine
    pub fn disabled_mask(&self) -> u32 {
        self.disabled
    }

    /// The part of `mask` this engine captures
    #[inline]
    pub fn effective_mask(&self, mask: u32) -> u32 {
        mask & MeasurementKind::all_mask() & !self.disabled
    }

    #[inline]
    pub fn allocate(&self, owner: u64, mask: u32) -> MeasurementBuffer {
        MeasurementBuffer::new(owner, self.effective_mask(mask))
    }

    /// Measures one call of `f`, folding the result into the registry.
    ///
    /// An `Err` from `f` completes the buffer as an error exit. Folding
    /// failures are logged and never change what `f` returned.
    pub fn measure<T, E>(
        &self,
        owner: u64,
        mask: u32,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut buffer = self.allocate(owner, mask);
        buffer.enter();
        let result = f();
        match &result {
            Ok(_) => buffer.exit(),
            Err(_) => buffer.error_exit(),
        }
        if let Err(e) = self.fold(&buffer) {
            tracing::warn!(hash = owner, category = e.category(), "Measurement not recorded: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IdentityCache;
    use crate::core::MetricName;
    use crate::taxonomy::MetricKind;

    #[test]
    fn test_configured_disabled_mask_applies() {
        let registry = MetricRegistry::new(Arc::new(IdentityCache::new().unwrap()));
        let engine = InstrumentationEngine::new(registry, MeasurementKind::Cpu.bit());

        let mask = MeasurementKind::mask_for(&[MeasurementKind::Cpu, MeasurementKind::Elapsed]);
        let buffer = engine.allocate(1, mask);
        assert_eq!(buffer.mask(), MeasurementKind::Elapsed.bit());
        assert!(MeasurementKind::WaitTime.is_enabled(engine.disabled_mask()));
    }

    #[test]
    fn test_measure_counts_errors() {
        let registry = MetricRegistry::new(Arc::new(IdentityCache::new().unwrap()));
        let engine = InstrumentationEngine::new(Arc::clone(&registry), 0);
        let owner = registry.identity(MetricName::new("jobs.run").unwrap());
        let mask = MeasurementKind::mask_for(&[
            MeasurementKind::InvokeCount,
            MeasurementKind::ReturnCount,
            MeasurementKind::ErrorCount,
        ]);

        let ok: Result<u32, String> = engine.measure(owner.hash64(), mask, || Ok(7));
        assert_eq!(ok, Ok(7));
        let failed: Result<u32, String> =
            engine.measure(owner.hash64(), mask, || Err("boom".to_string()));
        assert!(failed.is_err());

        let count = |ext: &str| {
            registry
                .sub_metric(owner.hash64(), ext, MetricKind::Counter)
                .unwrap()
                .instance()
                .as_counter()
                .unwrap()
                .count()
        };
        assert_eq!(count("invocations"), 2);
        assert_eq!(count("returns"), 1);
        assert_eq!(count("errors"), 1);
    }
}
