//! In-memory repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use vpipe_models::{Strategy, Video, VideoId};

use crate::error::{StorageError, StorageResult};
use crate::repository::{VideoRepository, VideoUpdate};

#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<VideoId, Video>>,
    strategies: RwLock<HashMap<VideoId, Strategy>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn insert_video(&self, video: &Video) -> StorageResult<()> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&video.id) {
            return Err(StorageError::already_exists(format!("videos/{}", video.id)));
        }
        videos.insert(video.id.clone(), video.clone());
        info!(video_id = %video.id, "Created video record");
        Ok(())
    }

    async fn get_video(&self, video_id: &VideoId) -> StorageResult<Option<Video>> {
        Ok(self.videos.read().await.get(video_id).cloned())
    }

    async fn update_video(&self, video_id: &VideoId, update: VideoUpdate) -> StorageResult<Video> {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| StorageError::not_found(format!("videos/{}", video_id)))?;

        // Validate on a copy so a rejected update leaves the record untouched.
        let mut updated = video.clone();
        update.apply(&mut updated)?;
        *video = updated.clone();
        Ok(updated)
    }

    async fn insert_strategy(&self, strategy: &Strategy) -> StorageResult<()> {
        let mut strategies = self.strategies.write().await;
        if strategies.contains_key(&strategy.video_id) {
            return Err(StorageError::already_exists(format!("strategies/{}", strategy.video_id)));
        }
        strategies.insert(strategy.video_id.clone(), strategy.clone());
        Ok(())
    }

    async fn strategy_for_video(&self, video_id: &VideoId) -> StorageResult<Option<Strategy>> {
        Ok(self.strategies.read().await.get(video_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpipe_models::{ModelError, VideoStatus};

    fn video(id: &str) -> Video {
        Video::new(VideoId::from_string(id), "user-1", format!("/uploads/{}.mp4", id))
    }

    #[tokio::test]
    async fn test_insert_is_exclusive() {
        let repo = InMemoryVideoRepository::new();
        repo.insert_video(&video("v1")).await.unwrap();
        let err = repo.insert_video(&video("v1")).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_rejected_transition_leaves_record() {
        let repo = InMemoryVideoRepository::new();
        let id = VideoId::from_string("v1");
        repo.insert_video(&video("v1")).await.unwrap();
        repo.set_status(&id, VideoStatus::Analyzing).await.unwrap();

        let err = repo.set_status(&id, VideoStatus::Processing).await.unwrap_err();
        assert!(matches!(err, StorageError::Model(ModelError::InvalidTransition { .. })));
        let stored = repo.get_video(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Analyzing);
    }

    #[tokio::test]
    async fn test_non_terminal_failure_keeps_status() {
        let repo = InMemoryVideoRepository::new();
        let id = VideoId::from_string("v1");
        repo.insert_video(&video("v1")).await.unwrap();
        repo.set_status(&id, VideoStatus::Processing).await.unwrap();

        let v = repo.record_failure(&id, "processing failed: probe", false).await.unwrap();
        assert_eq!(v.status, VideoStatus::Processing);
        assert_eq!(v.error_message.as_deref(), Some("processing failed: probe"));

        let v = repo.record_failure(&id, "processing failed: probe", true).await.unwrap();
        assert_eq!(v.status, VideoStatus::Failed);
        assert!(v.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_video() {
        let repo = InMemoryVideoRepository::new();
        let err = repo
            .set_status(&VideoId::from_string("ghost"), VideoStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
