//! Command-line interface for the vigil agent.
//!
//! `vigil` reads measurements from stdin as JSON lines, records them in the
//! registry and reports every metric on the configured period. EOF or ctrl-c
//! stops the schedule and flushes a final batch.

use crate::context::AgentContext;
use crate::core::config::{ConfigBuilder, LogLevel};
use crate::core::{Config, MetricName, Result, VigilError};
use crate::cache::MetricIdentity;
use crate::taxonomy::{BitFlag, MetricKind};
use clap::Parser;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// In-process metric agent: records JSON-line measurements and reports them in batches
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Configuration file path (default: ~/.config/vigil/config.yaml)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reporting period, e.g. "15s" or "1m"
    #[arg(short, long, env = "VIGIL_PERIOD", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub period: Option<Duration>,

    /// `stdout` or a file to append batches to
    #[arg(short, long, env = "VIGIL_OUTPUT")]
    pub output: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "VIGIL_DEBUG")]
    pub debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Show version information
    #[arg(short = 'V', long = "show-version")]
    pub version: bool,
}

/// One measurement read from stdin
#[derive(Debug, Deserialize)]
struct IngestLine {
    metric: String,
    #[serde(default = "default_kind")]
    kind: String,
    value: f64,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn default_kind() -> String {
    MetricKind::Gauge.as_str().to_string()
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    pub fn load_config(&self) -> Result<Config> {
        let mut builder = ConfigBuilder::new();

        let config_path = if let Some(path) = &self.config {
            path.clone()
        } else {
            let default_path = dirs::config_dir()
                .map(|d| d.join("vigil").join("config.yaml"))
                .unwrap_or_else(|| PathBuf::from("~/.config/vigil/config.yaml"));

            if default_path.exists() {
                default_path
            } else {
                return self.build_config_from_args(builder);
            }
        };

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                builder = builder.from_yaml(&content)?;
                tracing::info!("Loaded configuration from: {:?}", config_path);
            },
            Err(e) if self.config.is_some() => {
                return Err(VigilError::config(format!(
                    "Failed to read config file {:?}: {}",
                    config_path, e
                )));
            },
            Err(_) => {
                tracing::debug!("No config file found at {:?}, using defaults", config_path);
            },
        }

        self.build_config_from_args(builder)
    }

    fn build_config_from_args(&self, mut builder: ConfigBuilder) -> Result<Config> {
        if let Some(period) = self.period {
            builder = builder.period(period);
        }
        if let Some(output) = &self.output {
            builder = builder.output(output.clone());
        }
        builder.debug(self.debug).build()
    }

    /// Initialize logging. Logs go to stderr; stdout may carry report batches.
    pub fn init_logging(&self, config: &Config) -> Result<()> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

        let log_level = log_directive(config, std::env::var("VIGIL_LOG_LEVEL").ok());
        let logging = &config.logging;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let fmt_layer = if logging.structured {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_line_number(true)
                .compact()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_line_number(false)
                .compact()
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| VigilError::config(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }
}

/// Log filter directive: debug mode wins, then `VIGIL_LOG_LEVEL`, then the configured level
fn log_directive(config: &Config, env_level: Option<String>) -> String {
    if config.debug {
        return LogLevel::Debug.as_str().to_string();
    }
    env_level.unwrap_or_else(|| config.logging.level.as_str().to_string())
}

/// Execute the vigil agent.
pub async fn execute(cli: Cli) -> Result<()> {
    if cli.version {
        println!("vigil {}", env!("CARGO_PKG_VERSION"));
        println!("In-process metric agent");
        return Ok(());
    }

    let config = cli.load_config()?;
    cli.init_logging(&config)?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Period: {}", humantime_serde::re::humantime::format_duration(config.reporter.period));
        println!("  Output: {}", config.sink.output);
        println!("  Tags: {:?}", config.reporter.tags);
        return Ok(());
    }

    let context = AgentContext::new(config)?;
    context.start()?;
    tracing::info!(period = ?context.config().reporter.period, "vigil agent running");

    let mut identities = HashMap::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = ingest(&context, &mut identities, &line) {
                        tracing::warn!(category = e.category(), "Skipping input line: {}", e);
                    }
                },
                None => {
                    tracing::info!("Input closed, stopping...");
                    break;
                },
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal, stopping...");
                break;
            },
        }
    }

    let flushed = context.shutdown()?;
    tracing::info!(records = flushed, "Final batch reported");
    Ok(())
}

/// Records one JSON line. Identities stay referenced for the life of the run
/// so their registrations are never evicted.
fn ingest(
    context: &AgentContext,
    identities: &mut HashMap<MetricName, MetricIdentity>,
    line: &str,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }
    let input: IngestLine = serde_json::from_str(line)?;
    let kind = MetricKind::from_name(&input.kind)
        .ok_or_else(|| VigilError::invalid_member(MetricKind::SET, input.kind.as_str()))?;
    let name = MetricName::builder(input.metric).tags(input.tags).build()?;

    let identity = identities
        .entry(name)
        .or_insert_with_key(|name| context.registry().identity(name.clone()));
    context.registry().record(identity, kind, input.value)
}
