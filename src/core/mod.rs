//! Core domain types for Vigil.
//!
//! This module contains the error type, configuration, time units and the
//! structural metric identity every other layer keys on.

pub mod config;
pub mod error;
pub mod identity;
pub mod units;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, MaskSpec};
pub use error::{Result, VigilError};
pub use identity::{MetricName, MetricNameBuilder};
pub use units::TimeUnit;
