//! Shared fixtures for stage tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use vpipe_media::{Frame, MediaError, MediaResult, MediaToolkit, VideoInfo};
use vpipe_models::{EnqueueOptions, Job, JobId, JobPayload, Stage, Video, VideoId};
use vpipe_queue::{InMemoryJobStore, JobStore};
use vpipe_storage::{InMemoryVideoRepository, VideoRepository};

pub(crate) struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub videos: Arc<InMemoryVideoRepository>,
    pub video_id: VideoId,
}

impl Harness {
    pub async fn new() -> Self {
        let videos = Arc::new(InMemoryVideoRepository::new());
        let video_id = VideoId::from_string("video-1");
        videos
            .insert_video(&Video::new(video_id.clone(), "user-1", "/uploads/clip.mp4"))
            .await
            .unwrap();

        Self {
            store: Arc::new(InMemoryJobStore::default()),
            videos,
            video_id,
        }
    }

    pub async fn video(&self) -> Video {
        self.videos.get_video(&self.video_id).await.unwrap().unwrap()
    }

    pub fn job_id(&self, stage: Stage) -> JobId {
        JobId::for_stage(stage, &self.video_id)
    }
}

/// Enqueue and lease a job so it is ACTIVE.
pub(crate) async fn leased(h: &Harness, payload: JobPayload) -> Job {
    let stage = payload.stage();
    h.store.enqueue(payload, EnqueueOptions::default()).await.unwrap();
    h.store.lease(stage).await.unwrap().unwrap()
}

pub(crate) struct FakeMedia {
    duration: f64,
    fail_probe: bool,
    requested: Mutex<Vec<f64>>,
    extract_calls: AtomicUsize,
}

impl FakeMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            fail_probe: false,
            requested: Mutex::new(Vec::new()),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_probe() -> Self {
        Self {
            fail_probe: true,
            ..Self::new(0.0)
        }
    }

    pub async fn requested(&self) -> Vec<f64> {
        self.requested.lock().await.clone()
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
        if self.fail_probe {
            return Err(MediaError::invalid_video("no video stream"));
        }
        Ok(VideoInfo {
            duration: self.duration,
            width: 1080,
            height: 1920,
            fps: 30.0,
            codec: "h264".into(),
            bitrate: 2_000_000,
            has_audio: true,
        })
    }

    async fn extract_frames(&self, _path: &Path, timestamps: &[f64]) -> MediaResult<Vec<Frame>> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().await.extend_from_slice(timestamps);
        Ok(timestamps
            .iter()
            .map(|ts| Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], *ts))
            .collect())
    }
}
