use thiserror::Error;

use crate::storage::StorageError;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Completion service errors
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors surfaced to whoever drives a consultation session
#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Completion service failed: {0}")]
    Service(#[from] ResponseError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ConsultError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConsultError::InvalidInput(message.into())
    }
}
