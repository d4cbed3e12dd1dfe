//! Error handling for the hostwatch monitor.

/// A specialized `Result` type for hostwatch operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// The main error type for hostwatch operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// System information parsing failed
    #[error("Failed to parse system information: {0}")]
    Parse(String),

    /// Metric acquisition failed
    #[error("Collection error: {0}")]
    Collection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The monitoring loop panicked
    #[error("Monitor loop panicked: {0}")]
    Panic(String),
}

impl MonitorError {
    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new collection error
    pub fn collection_error(msg: impl Into<String>) -> Self {
        Self::Collection(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
