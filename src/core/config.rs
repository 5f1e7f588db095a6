//! Configuration management for Vigil.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - CLI argument overrides
//! - Validation and defaults

use crate::core::{Result, TimeUnit, VigilError};
use crate::taxonomy::{BitFlag, MeasurementKind, NameMode, SubValue, Units};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for Vigil
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reporting pipeline configuration
    pub reporter: ReporterConfig,
    /// Identity cache configuration
    pub cache: CacheConfig,
    /// Instrumentation engine configuration
    pub instrumentation: InstrumentationConfig,
    /// Output sink configuration
    pub sink: SinkConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// Reporting pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Time between reporting ticks
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Unit reported rates are expressed per
    pub rate_unit: TimeUnit,
    /// Unit timer durations are converted into
    pub duration_unit: TimeUnit,
    /// Tags added to every emitted record
    pub tags: BTreeMap<String, String>,
    /// Distribution statistics to report; absent means each kind's defaults
    pub snapshot_mask: Option<MaskSpec>,
    /// Rate statistics to report; absent means each kind's defaults
    pub metered_mask: Option<MaskSpec>,
    /// Which metrics get reported
    pub filter: FilterConfig,
}

/// A sub-value mask given either as raw bits or as member names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaskSpec {
    Bits(u32),
    Names(Vec<String>),
}

/// Metric filter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regular expressions; when non-empty a rendered name must match one
    pub include: Vec<String>,
    /// Regular expressions; a rendered name matching any is dropped
    pub exclude: Vec<String>,
    /// Tags a metric must carry with exactly these values
    pub require_tags: BTreeMap<String, String>,
}

/// Identity cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Pre-sized entry capacity
    pub initial_capacity: usize,
}

/// Instrumentation engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Measurement kinds disabled on top of those the platform cannot provide
    pub disabled: Vec<String>,
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// `stdout` or a file path batches are appended to
    pub output: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Structured logging format
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        ReporterConfig {
            period: Duration::from_secs(15),
            rate_unit: TimeUnit::Seconds,
            duration_unit: TimeUnit::Milliseconds,
            tags: BTreeMap::new(),
            snapshot_mask: None,
            metered_mask: None,
            filter: FilterConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            initial_capacity: 1024,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            output: "stdout".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl MaskSpec {
    /// Resolves to a `SubValue` bit mask. Unknown names and stray bits are errors.
    pub fn resolve(&self) -> Result<u32> {
        match self {
            MaskSpec::Bits(bits) => SubValue::validate_mask(*bits),
            MaskSpec::Names(names) => SubValue::mask_for_names(names, NameMode::Strict),
        }
    }
}

impl ReporterConfig {
    /// Configured snapshot mask, if any
    pub fn snapshot_mask(&self) -> Result<Option<u32>> {
        self.snapshot_mask.as_ref().map(MaskSpec::resolve).transpose()
    }

    /// Configured metered mask, if any
    pub fn metered_mask(&self) -> Result<Option<u32>> {
        self.metered_mask.as_ref().map(MaskSpec::resolve).transpose()
    }

    pub fn units(&self) -> Units {
        Units {
            rate: self.rate_unit,
            duration: self.duration_unit,
        }
    }
}

impl InstrumentationConfig {
    /// Mask of the measurement kinds disabled by configuration
    pub fn disabled_mask(&self) -> Result<u32> {
        MeasurementKind::mask_for_names(&self.disabled, NameMode::Strict)
    }
}

impl SinkConfig {
    /// File to append to, or `None` for stdout
    pub fn output_path(&self) -> Option<PathBuf> {
        match self.output.trim() {
            "" | "stdout" | "-" => None,
            path => Some(PathBuf::from(path)),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VigilError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        ConfigBuilder::new().from_yaml(&content)?.build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.reporter.period.is_zero() {
            return Err(VigilError::config("reporter.period must be greater than 0"));
        }

        self.reporter
            .snapshot_mask()
            .map_err(|e| VigilError::config(format!("reporter.snapshot_mask: {}", e)))?;
        self.reporter
            .metered_mask()
            .map_err(|e| VigilError::config(format!("reporter.metered_mask: {}", e)))?;

        for pattern in self.reporter.filter.include.iter().chain(&self.reporter.filter.exclude) {
            regex::Regex::new(pattern).map_err(|e| {
                VigilError::config(format!("Invalid filter pattern '{}': {}", pattern, e))
            })?;
        }

        if self.reporter.tags.keys().any(|k| k.trim().is_empty()) {
            return Err(VigilError::config("reporter.tags cannot contain an empty key"));
        }

        self.instrumentation
            .disabled_mask()
            .map_err(|e| VigilError::config(format!("instrumentation.disabled: {}", e)))?;

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| VigilError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the reporting period
    pub fn period(mut self, period: Duration) -> Self {
        self.config.reporter.period = period;
        self
    }

    /// Set the rate unit
    pub fn rate_unit(mut self, unit: TimeUnit) -> Self {
        self.config.reporter.rate_unit = unit;
        self
    }

    /// Set the duration unit
    pub fn duration_unit(mut self, unit: TimeUnit) -> Self {
        self.config.reporter.duration_unit = unit;
        self
    }

    /// Add a tag applied to every record
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.reporter.tags.insert(key.into(), value.into());
        self
    }

    /// Set the snapshot mask
    pub fn snapshot_mask(mut self, mask: MaskSpec) -> Self {
        self.config.reporter.snapshot_mask = Some(mask);
        self
    }

    /// Set the metered mask
    pub fn metered_mask(mut self, mask: MaskSpec) -> Self {
        self.config.reporter.metered_mask = Some(mask);
        self
    }

    /// Set the sink output
    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.config.sink.output = output.into();
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
