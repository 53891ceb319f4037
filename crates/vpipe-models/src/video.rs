//! Video status record.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::analysis::AiAnalysis;
use crate::error::{ModelError, ModelResult};

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Video pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Upload stored, process job queued
    #[default]
    Uploading,
    /// Metadata and frame extraction running
    Processing,
    /// Vision analysis running
    Analyzing,
    /// Strategy derivation running
    GeneratingStrategy,
    /// Strategy persisted, ready for publishing
    Ready,
    /// A stage exhausted its attempts
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploading => "uploading",
            VideoStatus::Processing => "processing",
            VideoStatus::Analyzing => "analyzing",
            VideoStatus::GeneratingStrategy => "generating_strategy",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }

    /// Position along the forward path. `Failed` sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            VideoStatus::Uploading => Some(0),
            VideoStatus::Processing => Some(1),
            VideoStatus::Analyzing => Some(2),
            VideoStatus::GeneratingStrategy => Some(3),
            VideoStatus::Ready => Some(4),
            VideoStatus::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Failed)
    }

    /// Forward moves (or staying put, for stage retries) and moves into
    /// `Failed` are allowed. Terminal statuses never change.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(next)) => next >= current,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Technical metadata written by the process stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoMetadata {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Bitrate in bits/second
    pub bitrate: u64,
    pub has_audio: bool,
}

/// The shared video record every stage reads and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub id: VideoId,

    /// Owner
    pub user_id: String,

    /// Where the upload is stored
    pub storage_locator: String,

    #[serde(default)]
    pub status: VideoStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<VideoMetadata>,

    /// Frames sampled by the process stage
    #[serde(default)]
    pub frame_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,

    /// Latest failure reason, kept while retries are pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Video {
    /// Create a freshly uploaded video record.
    pub fn new(id: VideoId, user_id: impl Into<String>, storage_locator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            storage_locator: storage_locator.into(),
            status: VideoStatus::Uploading,
            metadata: None,
            frame_count: 0,
            ai_analysis: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            ready_at: None,
            failed_at: None,
        }
    }

    /// Move to a new status, enforcing forward-only transitions.
    pub fn transition(&mut self, next: VideoStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::invalid_transition(self.status, next));
        }
        let now = Utc::now();
        match next {
            VideoStatus::Ready => {
                self.ready_at = Some(now);
                self.error_message = None;
            }
            VideoStatus::Failed => self.failed_at = Some(now),
            _ => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failure reason. A terminal failure also moves to `Failed`.
    pub fn record_failure(&mut self, message: impl Into<String>, terminal: bool) -> ModelResult<()> {
        if terminal {
            self.transition(VideoStatus::Failed)?;
        }
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Attach probed metadata.
    pub fn set_metadata(&mut self, metadata: VideoMetadata, frame_count: u32) {
        self.metadata = Some(metadata);
        self.frame_count = frame_count;
        self.updated_at = Utc::now();
    }

    /// Attach the AI analysis. Written once.
    pub fn set_analysis(&mut self, analysis: AiAnalysis) -> ModelResult<()> {
        if self.ai_analysis.is_some() {
            return Err(ModelError::AnalysisAlreadySet(self.id.to_string()));
        }
        self.ai_analysis = Some(analysis);
        self.updated_at = Utc::now();
        Ok(())
    }
}
