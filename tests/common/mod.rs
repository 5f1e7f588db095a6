//! Common test utilities and fixtures.

#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vigil_lib::cache::IdentityCache;
use vigil_lib::core::MetricName;
use vigil_lib::reporter::Batch;
use vigil_lib::MetricRegistry;

pub const WAIT: Duration = Duration::from_secs(5);

/// Fresh cache and registry pair
pub fn registry() -> Arc<MetricRegistry> {
    MetricRegistry::new(Arc::new(IdentityCache::new().expect("cache")))
}

pub fn name(s: &str) -> MetricName {
    MetricName::new(s).expect("valid name")
}

/// Decoded records of one batch
pub fn records(batch: &Batch) -> Vec<Value> {
    serde_json::from_slice(&batch.payload).expect("batch is a JSON array")
}

/// Polls `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
