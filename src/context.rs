//! Wires the identity cache, registry, instrumentation engine and reporter
//! of one agent together from a [`Config`].

use crate::cache::IdentityCache;
use crate::core::{Config, Result};
use crate::instrument::InstrumentationEngine;
use crate::registry::MetricRegistry;
use crate::reporter::{Reporter, ReporterOptions, Sink, WriterSink};
use std::sync::Arc;

/// Everything an instrumented process shares, built once at startup.
pub struct AgentContext {
    cache: Arc<IdentityCache>,
    registry: Arc<MetricRegistry>,
    engine: Arc<InstrumentationEngine>,
    reporter: Reporter,
    config: Config,
}

impl AgentContext {
    /// Builds the agent, reporting to the sink named by `config.sink`.
    pub fn new(config: Config) -> Result<Self> {
        let sink: Arc<dyn Sink> = match config.sink.output_path() {
            Some(path) => Arc::new(WriterSink::append(path)?),
            None => Arc::new(WriterSink::stdout()),
        };
        Self::with_sink(config, sink)
    }

    /// Builds the agent around a caller supplied sink
    pub fn with_sink(config: Config, sink: Arc<dyn Sink>) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(IdentityCache::with_capacity(config.cache.initial_capacity)?);
        let registry = MetricRegistry::new(Arc::clone(&cache));
        let engine = Arc::new(InstrumentationEngine::new(
            Arc::clone(&registry),
            config.instrumentation.disabled_mask()?,
        ));
        let options = ReporterOptions::from_config(&config.reporter)?;
        let reporter = Reporter::new(Arc::clone(&registry), sink, options);

        tracing::debug!(options = ?reporter.options(), "Agent context ready");
        Ok(Self {
            cache,
            registry,
            engine,
            reporter,
            config,
        })
    }

    /// Starts periodic reporting at the configured period
    pub fn start(&self) -> Result<bool> {
        self.reporter.start(self.config.reporter.period)
    }

    /// Stops periodic reporting and flushes one last batch
    pub fn shutdown(&self) -> Result<usize> {
        self.reporter.stop();
        self.reporter.report()
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<InstrumentationEngine> {
        &self.engine
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("identities", &self.cache.len())
            .field("metrics", &self.registry.len())
            .field("reporter", &self.reporter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConfigBuilder, MetricName, VigilError};
    use crate::reporter::ChannelSink;
    use std::time::Duration;

    #[test]
    fn test_wires_components() {
        let (sink, rx) = ChannelSink::new();
        let config = ConfigBuilder::new().tag("host", "a1").build().unwrap();
        let context = AgentContext::with_sink(config, Arc::new(sink)).unwrap();

        let id = context.registry().identity(MetricName::new("requests").unwrap());
        context.registry().counter(&id).unwrap().inc();
        assert!(Arc::ptr_eq(context.engine().registry(), context.registry()));
        assert!(context.cache().contains(id.hash64()));

        assert_eq!(context.shutdown().unwrap(), 1);
        let batch = rx.try_recv().unwrap();
        let text = String::from_utf8(batch.payload).unwrap();
        assert!(text.contains("\"host\":\"a1\""));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.reporter.period = Duration::ZERO;
        let (sink, _rx) = ChannelSink::new();
        let err = AgentContext::with_sink(config, Arc::new(sink)).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
    }

    #[test]
    fn test_start_uses_configured_period() {
        let (sink, _rx) = ChannelSink::new();
        let config = ConfigBuilder::new().period(Duration::from_secs(60)).build().unwrap();
        let context = AgentContext::with_sink(config, Arc::new(sink)).unwrap();
        assert!(context.start().unwrap());
        assert!(context.reporter().is_running());
        assert_eq!(context.shutdown().unwrap(), 0);
        assert!(!context.reporter().is_running());
    }
}
