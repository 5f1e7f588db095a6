//! Live metric instruments.
//!
//! Every instrument is lock-free on its write path: counters and gauges are
//! single atomics, histograms write into a sliding-window reservoir of atomic
//! slots and meters batch events into atomics that are folded into moving
//! averages at most once per tick interval.

pub mod clock;
pub mod counter;
pub mod gauge;
pub mod histogram;
pub mod live;
pub mod meter;
pub mod reservoir;
pub mod timer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use counter::Counter;
pub use gauge::Gauge;
pub use histogram::{Histogram, Snapshot};
pub use live::LiveMetric;
pub use meter::{Meter, Rates};
pub use reservoir::SlidingWindowReservoir;
pub use timer::{Timer, TimerGuard};
