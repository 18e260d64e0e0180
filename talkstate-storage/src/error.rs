//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("talk not found: {0}")]
    TalkNotFound(String),

    #[error("talk already exists: {0}")]
    TalkExists(String),

    #[error("invalid talk id: {0:?}")]
    InvalidId(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error(transparent)]
    Core(#[from] talkstate_core::CoreError),
}

impl StorageError {
    /// Returns whether the operation can be retried after re-fetching.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(_) => true,
            StorageError::Core(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns a stable error code for presentation layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::Io(_) => "IO_ERROR",
            StorageError::Json(_) => "BAD_REQUEST",
            StorageError::TalkNotFound(_) => "TALK_NOT_FOUND",
            StorageError::TalkExists(_) => "TALK_EXISTS",
            StorageError::InvalidId(_) => "BAD_REQUEST",
            StorageError::Corruption(_) => "CORRUPTION",
            StorageError::Core(e) => e.error_code(),
        }
    }
}
