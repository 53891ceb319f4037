//! Metadata probe and frame sampling.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use vpipe_media::{processing_frame_budget, window_timestamps, MediaToolkit};
use vpipe_models::{AnalyzePayload, Job, JobPayload, Stage, VideoMetadata};
use vpipe_storage::VideoRepository;

use super::{payload_mismatch, JobContext, StageHandler, StageOutput};
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::stage_def;

pub struct ProcessStage {
    videos: Arc<dyn VideoRepository>,
    media: Arc<dyn MediaToolkit>,
}

impl ProcessStage {
    pub fn new(videos: Arc<dyn VideoRepository>, media: Arc<dyn MediaToolkit>) -> Self {
        Self { videos, media }
    }
}

#[async_trait]
impl StageHandler for ProcessStage {
    fn stage(&self) -> Stage {
        Stage::Process
    }

    async fn handle(&self, job: &Job, ctx: &JobContext) -> WorkerResult<StageOutput> {
        let JobPayload::Process(payload) = &job.payload else {
            return Err(payload_mismatch(Stage::Process, job));
        };
        let path = Path::new(&payload.file_path);

        self.videos
            .set_status(&payload.video_id, stage_def(Stage::Process).status)
            .await?;
        ctx.progress(10, "processing started").await?;

        let info = self
            .media
            .probe(path)
            .await
            .map_err(|e| WorkerError::processing_failed(e.to_string()))?;
        ctx.progress(20, "metadata probed").await?;

        let budget = processing_frame_budget(info.duration);
        let frames = if budget == 0 {
            info!(
                video_id = %payload.video_id,
                duration = info.duration,
                "Video shorter than one frame window, skipping extraction"
            );
            Vec::new()
        } else {
            self.media
                .extract_frames(path, &window_timestamps(budget))
                .await
                .map_err(|e| WorkerError::processing_failed(e.to_string()))?
        };
        let frame_count = frames.len() as u32;
        ctx.progress(40, &format!("{} frames extracted", frame_count))
            .await?;

        let metadata = VideoMetadata {
            duration: info.duration,
            width: info.width,
            height: info.height,
            fps: info.fps,
            codec: info.codec.clone(),
            bitrate: info.bitrate,
            has_audio: info.has_audio,
        };
        self.videos
            .save_metadata(&payload.video_id, metadata, frame_count)
            .await?;
        ctx.progress(60, "metadata saved").await?;

        let handoff = JobPayload::Analyze(AnalyzePayload {
            video_id: payload.video_id.clone(),
            user_id: payload.user_id.clone(),
            file_path: payload.file_path.clone(),
            frame_count,
            duration_secs: info.duration,
        });
        ctx.progress(80, "handing off to analysis").await?;

        Ok(StageOutput::new(json!({
            "duration": info.duration,
            "frame_count": frame_count,
            "width": info.width,
            "height": info.height,
        }))
        .with_handoff(handoff))
    }
}
