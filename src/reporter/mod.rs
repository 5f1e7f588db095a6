//! Scheduled reporting pipeline.
//!
//! Each tick snapshots the registry kind by kind, expands every metric into
//! its enabled sub-values, serializes all values into one JSON batch and
//! hands it to the [`Sink`]. Ticks run on a dedicated scheduler thread and
//! never overlap; registration and recording proceed concurrently.

pub mod serializer;
pub mod sink;

pub use crate::registry::filter::{AllMetrics, MetricFilter, PatternFilter};
pub use serializer::{BatchWriter, RecordValue};
pub use sink::{Batch, ChannelSink, Sink, WriterSink};

use crate::core::config::ReporterConfig;
use crate::core::{MetricName, Result, VigilError};
use crate::metrics::LiveMetric;
use crate::registry::MetricRegistry;
use crate::taxonomy::{BitFlag, MetricKind, SubValue, Units};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self as tokio_time, MissedTickBehavior};

/// What a tick reports and how values are expressed
#[derive(Clone)]
pub struct ReporterOptions {
    pub units: Units,
    /// Distribution statistics to emit; `None` uses each kind's defaults
    pub snapshot_mask: Option<u32>,
    /// Rate statistics to emit; `None` uses each kind's defaults
    pub metered_mask: Option<u32>,
    /// Added to every record
    pub tags: BTreeMap<String, String>,
    pub filter: Arc<dyn MetricFilter>,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            units: Units::default(),
            snapshot_mask: None,
            metered_mask: None,
            tags: BTreeMap::new(),
            filter: Arc::new(AllMetrics),
        }
    }
}

impl ReporterOptions {
    pub fn from_config(config: &ReporterConfig) -> Result<Self> {
        let filter = PatternFilter::from_config(&config.filter)?;
        Ok(Self {
            units: config.units(),
            snapshot_mask: config.snapshot_mask()?,
            metered_mask: config.metered_mask()?,
            tags: config.tags.clone(),
            filter: Arc::new(filter),
        })
    }

    pub fn snapshot_mask(mut self, mask: u32) -> Self {
        self.snapshot_mask = Some(mask);
        self
    }

    pub fn metered_mask(mut self, mask: u32) -> Self {
        self.metered_mask = Some(mask);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn filter(mut self, filter: impl MetricFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }
}

impl std::fmt::Debug for ReporterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterOptions")
            .field("units", &self.units)
            .field("snapshot_mask", &self.snapshot_mask.map(SubValue::names_for))
            .field("metered_mask", &self.metered_mask.map(SubValue::names_for))
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

struct ReporterInner {
    registry: Arc<MetricRegistry>,
    sink: Arc<dyn Sink>,
    options: ReporterOptions,
    /// Held for the whole of a tick
    report_lock: Mutex<()>,
    ticks: AtomicU64,
}

struct SchedulerState {
    stopped: AtomicBool,
    wake: Notify,
}

struct Scheduler {
    state: Arc<SchedulerState>,
    thread: JoinHandle<()>,
}

/// Periodically reports the registry to a sink
pub struct Reporter {
    inner: Arc<ReporterInner>,
    scheduler: Mutex<Option<Scheduler>>,
}

impl Reporter {
    pub fn new(registry: Arc<MetricRegistry>, sink: Arc<dyn Sink>, options: ReporterOptions) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                registry,
                sink,
                options,
                report_lock: Mutex::new(()),
                ticks: AtomicU64::new(0),
            }),
            scheduler: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ReporterOptions {
        &self.inner.options
    }

    /// Starts ticking every `period`, first tick one period from now.
    ///
    /// Returns false without changing anything if already running.
    pub fn start(&self, period: Duration) -> Result<bool> {
        if period.is_zero() {
            return Err(VigilError::scheduler("reporting period must be greater than 0"));
        }
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return Ok(false);
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let state = Arc::new(SchedulerState {
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
        });

        let thread = {
            let inner = Arc::clone(&self.inner);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name("vigil-reporter".to_string())
                .spawn(move || runtime.block_on(run_schedule(inner, state, period)))?
        };

        tracing::info!(period = ?period, "Reporter started");
        *scheduler = Some(Scheduler { state, thread });
        Ok(true)
    }

    /// Stops ticking. An in-flight tick completes before this returns and no
    /// tick starts afterwards. Returns false if not running.
    pub fn stop(&self) -> bool {
        let Some(scheduler) = self.scheduler.lock().take() else {
            return false;
        };
        scheduler.state.stopped.store(true, Ordering::Release);
        scheduler.state.wake.notify_one();

        // Called from a sink on the scheduler thread itself: the tick holds the lock
        if scheduler.thread.thread().id() == thread::current().id() {
            return true;
        }

        drop(self.inner.report_lock.lock());
        if scheduler.thread.join().is_err() {
            tracing::error!("Reporter scheduler thread panicked");
        }
        tracing::info!(ticks = self.ticks(), "Reporter stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Ticks completed so far, scheduled or on demand
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    /// Runs one tick now. Returns the number of records sent; 0 means the
    /// sink was not called. A sink failure drops the batch and is returned.
    pub fn report(&self) -> Result<usize> {
        let _tick = self.inner.report_lock.lock();
        self.inner.report()
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("running", &self.is_running())
            .field("ticks", &self.ticks())
            .field("options", &self.inner.options)
            .finish()
    }
}

async fn run_schedule(inner: Arc<ReporterInner>, state: Arc<SchedulerState>, period: Duration) {
    let mut interval = tokio_time::interval_at(tokio_time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = state.wake.notified() => break,
        }
        if !inner.scheduled_tick(&state.stopped) {
            break;
        }
    }
}

impl ReporterInner {
    /// Runs a tick unless stopped; failures are logged and never end the schedule
    fn scheduled_tick(&self, stopped: &AtomicBool) -> bool {
        let _tick = self.report_lock.lock();
        if stopped.load(Ordering::Acquire) {
            return false;
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.report())) {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => {
                tracing::warn!(
                    category = e.category(),
                    transient = e.is_transient(),
                    "Reporting batch dropped: {}",
                    e
                );
            },
            Err(payload) => {
                tracing::error!("Reporting tick panicked: {}", panic_message(&payload));
            },
        }
        true
    }

    fn report(&self) -> Result<usize> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut batch = BatchWriter::new(timestamp, &self.options.tags);

        for kind in MetricKind::ALL {
            for (name, metric) in self.registry.snapshot(*kind, self.options.filter.as_ref()) {
                self.emit(&mut batch, &name, &metric);
            }
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let records = batch.records();
        let skipped = batch.skipped();
        let Some(buffer) = batch.finish() else {
            tracing::trace!(skipped, "Nothing to report");
            return Ok(0);
        };

        self.sink.send(&buffer, records)?;
        tracing::debug!(records, skipped, bytes = buffer.len(), "Reported batch");
        Ok(records)
    }

    /// Gauges and counters emit their value under their own name; histograms,
    /// meters and timers emit each selected sub-value under a derived name.
    fn emit(&self, batch: &mut BatchWriter<'_>, name: &MetricName, metric: &LiveMetric) {
        let units = &self.options.units;
        let reading = metric.reading();

        if let Some(primary) = reading.kind.primary() {
            if let Some(value) = primary.read(&reading, units) {
                batch.push(name, value);
            }
            return;
        }

        let mask = SubValue::select(
            reading.kind,
            self.options.snapshot_mask,
            self.options.metered_mask,
        );
        for sub_value in SubValue::enabled_for(mask) {
            let Some(value) = sub_value.read(&reading, units) else {
                continue;
            };
            match self.registry.derived(name.hash64(), sub_value) {
                Ok(derived) => {
                    if let Some(gauge) = derived.instance().as_gauge() {
                        gauge.set(value);
                    }
                    batch.push(derived.name(), value);
                },
                Err(e) => {
                    // Parent evicted since the snapshot; the value is still reported
                    tracing::debug!(metric = %name, "Derived series not registered: {}", e);
                    batch.push(&name.extended(sub_value.name()), value);
                },
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
