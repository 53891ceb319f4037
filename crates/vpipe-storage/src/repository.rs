//! Repository contract.

use async_trait::async_trait;
use vpipe_models::{AiAnalysis, ModelResult, Strategy, Video, VideoId, VideoMetadata, VideoStatus};

use crate::error::StorageResult;

/// A single mutation of a video record.
#[derive(Debug, Clone)]
pub enum VideoUpdate {
    Status(VideoStatus),
    Failure { message: String, terminal: bool },
    Metadata { metadata: VideoMetadata, frame_count: u32 },
    Analysis(AiAnalysis),
}

impl VideoUpdate {
    /// Apply to a loaded record, enforcing the model's rules.
    pub fn apply(self, video: &mut Video) -> ModelResult<()> {
        match self {
            VideoUpdate::Status(status) => video.transition(status),
            VideoUpdate::Failure { message, terminal } => video.record_failure(message, terminal),
            VideoUpdate::Metadata {
                metadata,
                frame_count,
            } => {
                video.set_metadata(metadata, frame_count);
                Ok(())
            }
            VideoUpdate::Analysis(analysis) => video.set_analysis(analysis),
        }
    }
}

/// Video and strategy persistence.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Create a video record. Fails if the id is taken.
    async fn insert_video(&self, video: &Video) -> StorageResult<()>;

    async fn get_video(&self, video_id: &VideoId) -> StorageResult<Option<Video>>;

    /// Apply one update and return the stored result.
    async fn update_video(&self, video_id: &VideoId, update: VideoUpdate) -> StorageResult<Video>;

    /// Persist a strategy. Strategies are immutable, one per video.
    async fn insert_strategy(&self, strategy: &Strategy) -> StorageResult<()>;

    async fn strategy_for_video(&self, video_id: &VideoId) -> StorageResult<Option<Strategy>>;

    async fn set_status(&self, video_id: &VideoId, status: VideoStatus) -> StorageResult<Video> {
        self.update_video(video_id, VideoUpdate::Status(status)).await
    }

    /// Record an error message; `terminal` also moves the video to FAILED.
    async fn record_failure(&self, video_id: &VideoId, message: &str, terminal: bool) -> StorageResult<Video> {
        self.update_video(
            video_id,
            VideoUpdate::Failure {
                message: message.to_string(),
                terminal,
            },
        )
        .await
    }

    async fn save_metadata(
        &self,
        video_id: &VideoId,
        metadata: VideoMetadata,
        frame_count: u32,
    ) -> StorageResult<Video> {
        self.update_video(video_id, VideoUpdate::Metadata { metadata, frame_count })
            .await
    }

    async fn save_analysis(&self, video_id: &VideoId, analysis: AiAnalysis) -> StorageResult<Video> {
        self.update_video(video_id, VideoUpdate::Analysis(analysis)).await
    }
}
