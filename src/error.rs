//! Error types and handling.

use thiserror::Error;

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded or saved
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another transfer is still in progress on this uploader
    #[error("A transfer is already in progress")]
    Busy,

    /// Upload request is missing required fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Background worker panicked or was cancelled
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create an invalid request error with message
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
