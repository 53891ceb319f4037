//! Strategy derivation. Last stage of the chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use vpipe_models::{Job, JobPayload, Stage, Strategy, VideoStatus};
use vpipe_storage::{StorageError, VideoRepository};

use super::{payload_mismatch, JobContext, StageHandler, StageOutput};
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::stage_def;
use crate::strategy_gen;

pub struct StrategyStage {
    videos: Arc<dyn VideoRepository>,
}

impl StrategyStage {
    pub fn new(videos: Arc<dyn VideoRepository>) -> Self {
        Self { videos }
    }
}

#[async_trait]
impl StageHandler for StrategyStage {
    fn stage(&self) -> Stage {
        Stage::Strategy
    }

    async fn handle(&self, job: &Job, ctx: &JobContext) -> WorkerResult<StageOutput> {
        let JobPayload::Strategy(payload) = &job.payload else {
            return Err(payload_mismatch(Stage::Strategy, job));
        };
        let video_id = &payload.video_id;

        let existing = self.videos.strategy_for_video(video_id).await?;
        if let Some(strategy) = &existing {
            let ready = self
                .videos
                .get_video(video_id)
                .await?
                .is_some_and(|video| video.status == VideoStatus::Ready);
            if ready {
                ctx.logger()
                    .log_warning("video already ready with a stored strategy, nothing to do");
                return Ok(summary(strategy));
            }
        }

        self.videos
            .set_status(video_id, stage_def(Stage::Strategy).status)
            .await?;
        ctx.progress(20, "strategy generation started").await?;

        let strategy = match existing {
            Some(existing) => {
                ctx.logger()
                    .log_warning("strategy already persisted by an earlier attempt, reusing it");
                existing
            }
            None => {
                let strategy =
                    strategy_gen::generate_strategy(video_id, &payload.user_id, &payload.analysis);
                ctx.progress(
                    70,
                    &format!(
                        "{} hooks, {} captions, {} hashtag sets",
                        strategy.hooks.len(),
                        strategy.captions.len(),
                        strategy.hashtags.len()
                    ),
                )
                .await?;
                self.persist(strategy).await?
            }
        };
        ctx.progress(90, "strategy saved").await?;

        self.videos.set_status(video_id, VideoStatus::Ready).await?;
        Ok(summary(&strategy))
    }
}

impl StrategyStage {
    /// Insert, or return the row a concurrent attempt stored first.
    async fn persist(&self, strategy: Strategy) -> WorkerResult<Strategy> {
        match self.videos.insert_strategy(&strategy).await {
            Ok(()) => Ok(strategy),
            Err(StorageError::AlreadyExists(_)) => self
                .videos
                .strategy_for_video(&strategy.video_id)
                .await?
                .ok_or_else(|| WorkerError::strategy_failed("strategy vanished after insert race")),
            Err(e) => Err(e.into()),
        }
    }
}

fn summary(strategy: &Strategy) -> StageOutput {
    StageOutput::new(json!({
        "strategy_id": strategy.id,
        "hooks": strategy.hooks.len(),
        "captions": strategy.captions.len(),
        "hashtag_sets": strategy.hashtags.len(),
    }))
}
