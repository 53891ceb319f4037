//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("AI analysis failed: {0}")]
    AiFailed(String),

    #[error("Strategy generation failed: {0}")]
    StrategyFailed(String),

    #[error("Provider error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vpipe_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] vpipe_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] vpipe_queue::QueueError),

    #[error(transparent)]
    Model(#[from] vpipe_models::ModelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn ai_failed(msg: impl Into<String>) -> Self {
        Self::AiFailed(msg.into())
    }

    pub fn strategy_failed(msg: impl Into<String>) -> Self {
        Self::StrategyFailed(msg.into())
    }

    pub fn provider(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Provider {
            status,
            message: msg.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// The underlying cause without the stage wording, for failure messages
    /// that carry their own stage prefix.
    pub fn cause(&self) -> String {
        match self {
            WorkerError::ProcessingFailed(msg)
            | WorkerError::AiFailed(msg)
            | WorkerError::StrategyFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Check if error is likely transient.
    ///
    /// Every failure goes through the same retry path; this only feeds logs
    /// and metrics.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider { status, .. } => {
                matches!(status, None | Some(429) | Some(500..=599))
            }
            WorkerError::Timeout(_) => true,
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Queue(_) => true,
            WorkerError::Media(e) => matches!(e, vpipe_media::MediaError::Timeout(_)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_classification() {
        assert!(WorkerError::provider(Some(429), "slow down").is_retryable());
        assert!(WorkerError::provider(Some(503), "unavailable").is_retryable());
        assert!(WorkerError::provider(None, "connection reset").is_retryable());
        assert!(!WorkerError::provider(Some(400), "bad request").is_retryable());
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(
            WorkerError::provider(Some(500), "boom").to_string(),
            "Provider error (500): boom"
        );
        assert_eq!(WorkerError::provider(None, "boom").to_string(), "Provider error: boom");
    }

    #[test]
    fn test_cause_strips_stage_wording() {
        assert_eq!(WorkerError::processing_failed("no frames").cause(), "no frames");
        assert_eq!(WorkerError::Timeout(5).cause(), "Timed out after 5 seconds");
    }
}
