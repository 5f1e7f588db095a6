//! Vigil - in-process metric agent.
//!
//! Vigil interns structural metric identities, binds them to live
//! instruments, folds per-invocation measurements into those instruments and
//! periodically reports everything as batched time-series records.
//!
//! # Architecture
//!
//! - `core`: identities, configuration, errors and time units
//! - `taxonomy`: bit-flag sets of metric kinds, sub-values and measurements
//! - `cache`: identity interning with asynchronous eviction notices
//! - `metrics`: gauges, counters, histograms, meters and timers
//! - `registry`: identity to instrument bindings and sub-metric links
//! - `instrument`: fixed-layout measurement buffers and aggregation
//! - `reporter`: scheduled snapshot, serialization and sink delivery
//! - `cli`: the `vigil` command
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil_lib::core::{Config, MetricName};
//! use vigil_lib::reporter::WriterSink;
//! use vigil_lib::AgentContext;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = AgentContext::with_sink(Config::default(), Arc::new(WriterSink::stdout()))?;
//!     let requests = agent.registry().identity(MetricName::new("requests")?);
//!     agent.registry().counter(&requests)?.inc();
//!     agent.start()?;
//!     agent.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod cache;
pub mod cli;
pub mod context;
pub mod core;
pub mod instrument;
pub mod metrics;
pub mod registry;
pub mod reporter;
pub mod taxonomy;

// Re-export core types for convenience
pub use crate::cache::{IdentityCache, MetricIdentity};
pub use crate::context::AgentContext;
pub use crate::core::{Config, MetricName, Result, VigilError};
pub use crate::registry::MetricRegistry;
pub use crate::reporter::Reporter;
