//! Pipeline runtime: the three pools plus the upload and status entry points.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use vpipe_media::MediaToolkit;
use vpipe_models::{
    EnqueueOptions, JobId, JobPayload, PipelineProgress, ProcessPayload, Stage, Video, VideoId,
    VideoStatus,
};
use vpipe_queue::{EnqueueOutcome, JobStore};
use vpipe_storage::{StorageError, VideoRepository};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pool::WorkerPool;
use crate::provider::VisionProvider;
use crate::rate_limit::CallBudget;
use crate::stages::{AnalyzeStage, ProcessStage, StrategyStage};

/// Collaborators injected into the pipeline.
pub struct PipelineDeps {
    pub store: Arc<dyn JobStore>,
    pub videos: Arc<dyn VideoRepository>,
    pub media: Arc<dyn MediaToolkit>,
    pub provider: Arc<dyn VisionProvider>,
    pub config: WorkerConfig,
}

/// Status answer for polling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStatusView {
    pub video: Video,
    pub progress: PipelineProgress,
}

pub struct Pipeline {
    store: Arc<dyn JobStore>,
    videos: Arc<dyn VideoRepository>,
    pools: Vec<WorkerPool>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        let PipelineDeps {
            store,
            videos,
            media,
            provider,
            config,
        } = deps;

        let budget = Arc::new(CallBudget::new(
            config.ai_rate_limit_calls,
            config.ai_rate_limit_window,
        ));

        let process = Arc::new(ProcessStage::new(videos.clone(), media.clone()));
        let analyze = Arc::new(AnalyzeStage::new(
            videos.clone(),
            media,
            provider,
            budget,
            config.ai_key_frames,
        ));
        let strategy = Arc::new(StrategyStage::new(videos.clone()));

        let pools = vec![
            WorkerPool::new(process, store.clone(), videos.clone(), config.clone()),
            WorkerPool::new(analyze, store.clone(), videos.clone(), config.clone()),
            WorkerPool::new(strategy, store.clone(), videos.clone(), config),
        ];

        Self {
            store,
            videos,
            pools,
        }
    }

    /// Start every stage pool.
    pub async fn start(&self) {
        for pool in &self.pools {
            pool.start().await;
        }
        info!("Pipeline started");
    }

    /// Stop leasing everywhere, then drain each pool.
    pub async fn stop(&self) {
        for pool in &self.pools {
            pool.stop().await;
        }
        info!("Pipeline stopped");
    }

    /// Register an uploaded file and queue its PROCESS job.
    pub async fn submit_upload(&self, user_id: &str, file_path: &str) -> WorkerResult<VideoId> {
        let video = Video::new(VideoId::new(), user_id, file_path);
        self.videos.insert_video(&video).await?;
        self.enqueue_process(&video).await?;
        Ok(video.id)
    }

    /// Queue PROCESS for a video still in UPLOADING, e.g. after a crash
    /// between insert and enqueue. A live PROCESS job makes this a no-op.
    pub async fn resume(&self, video_id: &VideoId) -> WorkerResult<EnqueueOutcome> {
        let video = self
            .videos
            .get_video(video_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(video_id.to_string()))?;

        if video.status != VideoStatus::Uploading {
            return Err(WorkerError::pipeline(format!(
                "video {} is {}, only uploading videos can be resumed",
                video_id, video.status
            )));
        }
        self.enqueue_process(&video).await
    }

    async fn enqueue_process(&self, video: &Video) -> WorkerResult<EnqueueOutcome> {
        let payload = JobPayload::Process(ProcessPayload {
            video_id: video.id.clone(),
            user_id: video.user_id.clone(),
            file_path: video.storage_locator.clone(),
        });
        let outcome = self.store.enqueue(payload, EnqueueOptions::default()).await?;

        info!(
            video_id = %video.id,
            job_id = %outcome.job_id(),
            duplicate = matches!(outcome, EnqueueOutcome::Duplicate(_)),
            "Queued video for processing"
        );
        Ok(outcome)
    }

    /// Video record plus aggregated progress, or None for an unknown video.
    pub async fn status(&self, video_id: &VideoId) -> WorkerResult<Option<VideoStatusView>> {
        let Some(video) = self.videos.get_video(video_id).await? else {
            return Ok(None);
        };

        let mut statuses = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let job_id = JobId::for_stage(stage, video_id);
            statuses.push(self.store.get_status(&job_id).await?);
        }

        let progress = PipelineProgress::aggregate(
            statuses[0].as_ref(),
            statuses[1].as_ref(),
            statuses[2].as_ref(),
        )
        .floored_by(video.status, video.error_message.as_deref());
        Ok(Some(VideoStatusView { video, progress }))
    }

    pub fn pools(&self) -> &[WorkerPool] {
        &self.pools
    }
}
