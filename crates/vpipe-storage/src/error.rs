//! Storage error types.

use thiserror::Error;
use vpipe_models::ModelError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Redis(e) if e.is_io_error() || e.is_timeout() || e.is_connection_dropped())
    }
}
