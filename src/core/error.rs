use thiserror::Error;

use crate::taxonomy::MetricKind;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Metric {name} is already registered as {existing}, cannot register it as {requested}")]
    MetricKindConflict {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },

    #[error("Unknown metric identity: hash {0:#018x} is not in the identity cache")]
    UnknownIdentity(u64),

    #[error("Invalid metric name: {0}")]
    InvalidName(String),

    #[error("Invalid {set} member name: '{name}'")]
    InvalidMember { set: &'static str, name: String },

    #[error("Invalid {set} mask {mask:#x}: bits outside the member set")]
    InvalidMask { set: &'static str, mask: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new sink error
    pub fn sink<S: Into<String>>(msg: S) -> Self {
        Self::Sink(msg.into())
    }

    /// Creates a new scheduler error
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        Self::Scheduler(msg.into())
    }

    /// Creates an invalid member error for the named flag set
    pub fn invalid_member<S: Into<String>>(set: &'static str, name: S) -> Self {
        Self::InvalidMember {
            set,
            name: name.into(),
        }
    }

    /// Returns true if retrying the same operation on a later tick can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Sink(_) | Self::Io(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::MetricKindConflict { .. } => "conflict",
            Self::UnknownIdentity(_) => "invalid_state",
            Self::InvalidName(_) | Self::InvalidMember { .. } | Self::InvalidMask { .. } => {
                "validation"
            },
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Sink(_) => "sink",
            Self::Scheduler(_) => "scheduler",
            Self::Io(_) => "io",
        }
    }
}
