//! Error types for the creditgate service.

use thiserror::Error;

use crate::vision::VisionError;

/// Main error type for creditgate operations.
#[derive(Error, Debug)]
pub enum CreditGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger storage errors
    #[error("Ledger store error: {0}")]
    Store(String),

    /// A credit amount outside the accepted range
    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    /// Image description collaborator errors
    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CreditGateError {
    fn from(err: rusqlite::Error) -> Self {
        CreditGateError::Store(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CreditGateError {
    fn from(err: tokio::task::JoinError) -> Self {
        CreditGateError::Store(format!("ledger task failed: {}", err))
    }
}

impl From<config::ConfigError> for CreditGateError {
    fn from(err: config::ConfigError) -> Self {
        CreditGateError::Config(err.to_string())
    }
}

/// Result type alias for creditgate operations.
pub type Result<T> = std::result::Result<T, CreditGateError>;
