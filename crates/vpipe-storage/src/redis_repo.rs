//! Redis JSON repository.
//!
//! One string key per document: `{p}:video:{id}` and `{p}:strategy:{video_id}`.
//! A video is mutated by one stage at a time, so updates are plain
//! read-modify-write.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};
use vpipe_models::{Strategy, Video, VideoId};

use crate::error::{StorageError, StorageResult};
use crate::repository::{VideoRepository, VideoUpdate};

pub struct RedisVideoRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisVideoRepository {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> StorageResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    /// Create from `REDIS_URL` and `QUEUE_KEY_PREFIX`.
    pub fn from_env() -> StorageResult<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let prefix = std::env::var("QUEUE_KEY_PREFIX").unwrap_or_else(|_| "vpipe".to_string());
        Self::new(&url, prefix)
    }

    fn video_key(&self, video_id: &VideoId) -> String {
        format!("{}:video:{}", self.key_prefix, video_id)
    }

    fn strategy_key(&self, video_id: &VideoId) -> String {
        format!("{}:strategy:{}", self.key_prefix, video_id)
    }

    async fn connection(&self) -> StorageResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// SET NX; false when the key already exists.
    async fn create(&self, key: &str, json: String) -> StorageResult<bool> {
        let mut conn = self.connection().await?;
        let created: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(created.is_some())
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StorageError::from)
    }
}

#[async_trait]
impl VideoRepository for RedisVideoRepository {
    async fn insert_video(&self, video: &Video) -> StorageResult<()> {
        let key = self.video_key(&video.id);
        if !self.create(&key, serde_json::to_string(video)?).await? {
            return Err(StorageError::already_exists(key));
        }
        info!(video_id = %video.id, "Created video record");
        Ok(())
    }

    async fn get_video(&self, video_id: &VideoId) -> StorageResult<Option<Video>> {
        self.read(&self.video_key(video_id)).await
    }

    async fn update_video(&self, video_id: &VideoId, update: VideoUpdate) -> StorageResult<Video> {
        let key = self.video_key(video_id);
        let mut video: Video = self
            .read(&key)
            .await?
            .ok_or_else(|| StorageError::not_found(key.clone()))?;
        update.apply(&mut video)?;

        let mut conn = self.connection().await?;
        let _: () = conn.set(&key, serde_json::to_string(&video)?).await?;
        debug!(video_id = %video_id, status = %video.status, "Updated video record");
        Ok(video)
    }

    async fn insert_strategy(&self, strategy: &Strategy) -> StorageResult<()> {
        let key = self.strategy_key(&strategy.video_id);
        if !self.create(&key, serde_json::to_string(strategy)?).await? {
            return Err(StorageError::already_exists(key));
        }
        info!(video_id = %strategy.video_id, strategy_id = %strategy.id, "Stored strategy");
        Ok(())
    }

    async fn strategy_for_video(&self, video_id: &VideoId) -> StorageResult<Option<Strategy>> {
        self.read(&self.strategy_key(video_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpipe_models::VideoStatus;

    #[test]
    fn test_key_layout() {
        let repo = RedisVideoRepository::new("redis://localhost:6379", "vpipe").unwrap();
        let id = VideoId::from_string("abc");
        assert_eq!(repo.video_key(&id), "vpipe:video:abc");
        assert_eq!(repo.strategy_key(&id), "vpipe:strategy:abc");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_video_roundtrip() {
        dotenvy::dotenv().ok();
        let prefix = format!("vpipe-test-{}", chrono::Utc::now().timestamp_millis());
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let repo = RedisVideoRepository::new(&url, prefix).unwrap();

        let video = Video::new(VideoId::new(), "user-1", "/uploads/a.mp4");
        repo.insert_video(&video).await.unwrap();
        assert!(matches!(
            repo.insert_video(&video).await.unwrap_err(),
            StorageError::AlreadyExists(_)
        ));

        let updated = repo.set_status(&video.id, VideoStatus::Processing).await.unwrap();
        assert_eq!(updated.status, VideoStatus::Processing);
        let stored = repo.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::Processing);
    }
}
