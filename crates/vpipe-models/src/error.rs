//! Model error types.

use thiserror::Error;

use crate::video::VideoStatus;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: VideoStatus, to: VideoStatus },

    #[error("Analysis already recorded for video {0}")]
    AnalysisAlreadySet(String),
}

impl ModelError {
    pub fn invalid_transition(from: VideoStatus, to: VideoStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
