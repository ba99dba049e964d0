//! Error types for slidegate.

use thiserror::Error;

/// Main error type for slidegate operations.
#[derive(Error, Debug)]
pub enum SlidegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// An outbound call was skipped because its key is over quota
    #[error("Rate limit exceeded for key '{key}'")]
    Throttled { key: String },

    /// A malformed or out-of-order line in a request trace
    #[error("Invalid trace at line {line}: {message}")]
    Trace { line: usize, message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for SlidegateError {
    fn from(err: config::ConfigError) -> Self {
        SlidegateError::Config(err.to_string())
    }
}

/// Result type alias for slidegate operations.
pub type Result<T> = std::result::Result<T, SlidegateError>;
