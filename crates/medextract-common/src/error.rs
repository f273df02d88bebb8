//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Error type for the shared utilities
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid log setting: {0}")]
    InvalidLogSetting(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),
}

impl CommonError {
    /// Create an invalid log setting error
    pub fn invalid_log_setting(msg: impl Into<String>) -> Self {
        Self::InvalidLogSetting(msg.into())
    }
}
