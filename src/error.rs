//! Error handling for the sysdash crate.

use crate::metrics::data::MetricKind;

/// A specialized `Result` type for sysdash operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for sysdash operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// A platform call for one metric failed
    #[error("{kind} metric unavailable: {message}")]
    MetricUnavailable { kind: MetricKind, message: String },

    /// A metric read exceeded its time bound
    #[error("{kind} metric read timed out after {timeout_ms}ms")]
    MetricTimeout { kind: MetricKind, timeout_ms: u64 },

    /// A reader asked for the latest snapshot before the first tick completed
    #[error("no snapshot has been published yet")]
    NoSnapshotYet,

    /// A snapshot older than the current latest was offered to the store
    #[error("snapshot at {offered} is older than latest at {latest}")]
    StaleSnapshot { offered: u64, latest: u64 },

    /// A manual refresh did not complete within its budget
    #[error("refresh did not complete within {0}ms")]
    RefreshTimeout(u64),

    /// The sampler task is no longer running
    #[error("sampler is not running")]
    SamplerStopped,

    /// A reading failed validation at construction
    #[error("invalid reading: {0}")]
    InvalidReading(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic system error
    #[error("System error: {0}")]
    System(String),
}

impl SystemError {
    /// Create a new metric-unavailable error
    pub fn unavailable(kind: MetricKind, msg: impl Into<String>) -> Self {
        Self::MetricUnavailable {
            kind,
            message: msg.into(),
        }
    }

    /// Create a new invalid-reading error
    pub fn invalid_reading(msg: impl Into<String>) -> Self {
        Self::InvalidReading(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new generic system error
    #[allow(clippy::self_named_constructors)]
    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Whether this error describes a single metric failing rather than the service.
    pub fn is_metric_failure(&self) -> bool {
        matches!(
            self,
            Self::MetricUnavailable { .. } | Self::MetricTimeout { .. }
        )
    }
}
