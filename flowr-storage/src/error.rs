//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record id: '{0}'")]
    InvalidId(String),

    #[error("data corruption: {0}")]
    Corruption(String),
}

impl StoreError {
    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }

    /// Returns an error code suitable for boundary responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "STORE_IO_ERROR",
            StoreError::Json(_) => "STORE_CORRUPTION",
            StoreError::InvalidId(_) => "BAD_REQUEST",
            StoreError::Corruption(_) => "STORE_CORRUPTION",
        }
    }
}
