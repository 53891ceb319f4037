//! Queue error types.

use thiserror::Error;
use vpipe_models::{JobId, JobState};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} is {state}, expected active")]
    NotActive { job_id: JobId, state: JobState },

    #[error("Lease lost for job {0}")]
    LeaseLost(JobId),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn not_active(job_id: &JobId, state: JobState) -> Self {
        Self::NotActive {
            job_id: job_id.clone(),
            state,
        }
    }

    /// Connection-level failures worth retrying in place.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_) => true,
            QueueError::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            _ => false,
        }
    }
}
