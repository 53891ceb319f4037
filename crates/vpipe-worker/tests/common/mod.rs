//! Fakes and helpers shared by the pipeline integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use vpipe_media::{Frame, MediaError, MediaResult, MediaToolkit, VideoInfo};
use vpipe_models::{Stage, TokenUsage, VideoId};
use vpipe_queue::{InMemoryJobStore, QueueConfig, RetentionPolicy, StageQueueConfig};
use vpipe_storage::InMemoryVideoRepository;
use vpipe_worker::{
    Pipeline, PipelineDeps, VideoStatusView, VisionProvider, VisionResponse, WorkerConfig,
    WorkerError, WorkerResult,
};

pub const JSON_REPLY: &str = r#"Here is the analysis:
```json
{
  "viral_score": 8.4,
  "summary": "A quick cooking tutorial for a 10 minute pasta",
  "strengths": ["Fast pacing", "Clear close-ups"],
  "weaknesses": ["Weak ending"],
  "hooks": ["Dinner in 10 minutes", "You have these ingredients already"],
  "emotional_tones": ["Excited", "warm"],
  "recommendations": ["Add captions"],
  "target_audience": "Busy home cooks",
  "content_type": "food"
}
```"#;

pub const PROSE_REPLY: &str =
    "Honestly this looks decent. I'd probably rate it somewhere around good, people may like it.";

pub struct FakeMedia {
    duration: f64,
    fail_probe: bool,
    extracted: AtomicUsize,
}

impl FakeMedia {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            fail_probe: false,
            extracted: AtomicUsize::new(0),
        }
    }

    pub fn corrupt() -> Self {
        Self {
            fail_probe: true,
            ..Self::new(0.0)
        }
    }

    /// Total frames handed out across all calls.
    pub fn frames_extracted(&self) -> usize {
        self.extracted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn probe(&self, _path: &Path) -> MediaResult<VideoInfo> {
        if self.fail_probe {
            return Err(MediaError::invalid_video("moov atom not found"));
        }
        Ok(VideoInfo {
            duration: self.duration,
            width: 1080,
            height: 1920,
            fps: 30.0,
            codec: "h264".into(),
            bitrate: 3_500_000,
            has_audio: true,
        })
    }

    async fn extract_frames(&self, _path: &Path, timestamps: &[f64]) -> MediaResult<Vec<Frame>> {
        self.extracted.fetch_add(timestamps.len(), Ordering::SeqCst);
        Ok(timestamps
            .iter()
            .map(|ts| Frame::new(vec![0xFF, 0xD8, 0xFF, 0xD9], *ts))
            .collect())
    }
}

/// Replies with fixed text after failing the first `failures` calls.
pub struct FakeProvider {
    reply: String,
    failures: AtomicU32,
    calls: AtomicUsize,
    last_frame_count: AtomicUsize,
}

impl FakeProvider {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failures: AtomicU32::new(0),
            calls: AtomicUsize::new(0),
            last_frame_count: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(reply: &str, failures: u32) -> Self {
        let provider = Self::new(reply);
        provider.failures.store(failures, Ordering::SeqCst);
        provider
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_frame_count(&self) -> usize {
        self.last_frame_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionProvider for FakeProvider {
    async fn analyze(&self, frames: &[Frame], _prompt: &str) -> WorkerResult<VisionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_frame_count.store(frames.len(), Ordering::SeqCst);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WorkerError::provider(Some(503), "model overloaded"));
        }

        Ok(VisionResponse {
            text: self.reply.clone(),
            usage: TokenUsage {
                input_tokens: 1290,
                output_tokens: 310,
            },
            model: "fake-vision".into(),
        })
    }

    fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        usage.total() as f64 * 1e-6
    }
}

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub store: Arc<InMemoryJobStore>,
    pub videos: Arc<InMemoryVideoRepository>,
    pub media: Arc<FakeMedia>,
    pub provider: Arc<FakeProvider>,
}

/// Queue settings with short backoff so retries finish inside a test.
pub fn fast_queue() -> QueueConfig {
    let mut config = QueueConfig::default();
    for stage in Stage::ALL {
        let attempts = StageQueueConfig::default_for(stage).max_attempts;
        config = config.with_stage(stage, StageQueueConfig::new(attempts, Duration::from_millis(10)));
    }
    config
}

/// Fast queue that drops every completed job as soon as it finishes.
pub fn pruning_queue() -> QueueConfig {
    QueueConfig {
        retention: RetentionPolicy {
            completed_keep: 0,
            ..RetentionPolicy::default()
        },
        ..fast_queue()
    }
}

pub fn build(media: FakeMedia, provider: FakeProvider, queue: QueueConfig) -> TestPipeline {
    let store = Arc::new(InMemoryJobStore::new(queue));
    let videos = Arc::new(InMemoryVideoRepository::new());
    let media = Arc::new(media);
    let provider = Arc::new(provider);

    let pipeline = Pipeline::new(PipelineDeps {
        store: store.clone(),
        videos: videos.clone(),
        media: media.clone(),
        provider: provider.clone(),
        config: WorkerConfig::fast(),
    });

    TestPipeline {
        pipeline,
        store,
        videos,
        media,
        provider,
    }
}

/// Poll status until the chain is ready or failed.
pub async fn wait_for_outcome(pipeline: &Pipeline, video_id: &VideoId) -> VideoStatusView {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let view = pipeline
            .status(video_id)
            .await
            .unwrap()
            .expect("video exists");
        if view.progress.is_ready() || view.progress.is_failed() {
            return view;
        }
        assert!(
            Instant::now() < deadline,
            "pipeline did not settle, last progress {:?}",
            view.progress
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
