//! Vision-model analysis of key frames.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use vpipe_media::{even_timestamps, MediaToolkit};
use vpipe_models::{Job, JobPayload, Stage, StrategyPayload};
use vpipe_storage::VideoRepository;

use super::{payload_mismatch, JobContext, StageHandler, StageOutput};
use crate::analysis_parser::parse_analysis;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::stage_def;
use crate::provider::{analysis_prompt, VisionProvider};
use crate::rate_limit::CallBudget;

pub struct AnalyzeStage {
    videos: Arc<dyn VideoRepository>,
    media: Arc<dyn MediaToolkit>,
    provider: Arc<dyn VisionProvider>,
    budget: Arc<CallBudget>,
    key_frames: u32,
}

impl AnalyzeStage {
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        media: Arc<dyn MediaToolkit>,
        provider: Arc<dyn VisionProvider>,
        budget: Arc<CallBudget>,
        key_frames: u32,
    ) -> Self {
        Self {
            videos,
            media,
            provider,
            budget,
            key_frames: key_frames.max(1),
        }
    }
}

#[async_trait]
impl StageHandler for AnalyzeStage {
    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn handle(&self, job: &Job, ctx: &JobContext) -> WorkerResult<StageOutput> {
        let JobPayload::Analyze(payload) = &job.payload else {
            return Err(payload_mismatch(Stage::Analyze, job));
        };

        let video = self
            .videos
            .set_status(&payload.video_id, stage_def(Stage::Analyze).status)
            .await?;
        ctx.progress(10, "analysis started").await?;

        let mut partial = false;
        let analysis = match video.ai_analysis {
            Some(existing) => {
                ctx.logger()
                    .log_warning("analysis already persisted by an earlier attempt, reusing it");
                existing
            }
            None => {
                let duration = if payload.duration_secs > 0.0 {
                    payload.duration_secs
                } else {
                    video.metadata.as_ref().map(|m| m.duration).unwrap_or(0.0)
                };
                let timestamps = even_timestamps(duration, self.key_frames);
                if timestamps.is_empty() {
                    return Err(WorkerError::ai_failed(format!(
                        "cannot sample key frames from a {:.1}s video",
                        duration
                    )));
                }

                let path = Path::new(&payload.file_path);
                let frames = self
                    .media
                    .extract_frames(path, &timestamps)
                    .await
                    .map_err(|e| WorkerError::ai_failed(format!("key frame extraction: {}", e)))?;
                ctx.progress(30, &format!("{} key frames extracted", frames.len()))
                    .await?;

                self.budget.acquire().await;
                ctx.progress(40, "calling vision provider").await?;
                let prompt = analysis_prompt(frames.len(), duration);
                let response = self.provider.analyze(&frames, &prompt).await?;

                let outcome = parse_analysis(&response.text);
                partial = outcome.is_partial();
                for warning in outcome.warnings() {
                    ctx.logger().log_warning(warning);
                }

                let mut analysis = outcome.into_analysis();
                analysis.cost_usd = self.provider.estimate_cost(&response.usage);
                analysis.token_usage = response.usage;
                analysis.model = Some(response.model);
                metrics::record_ai_usage(&analysis.token_usage, analysis.cost_usd);

                self.videos
                    .save_analysis(&payload.video_id, analysis.clone())
                    .await?;
                analysis
            }
        };
        ctx.progress(70, "analysis saved").await?;

        let value = json!({
            "viral_score": analysis.viral_score,
            "content_type": analysis.content_type,
            "partial": partial,
            "cost_usd": analysis.cost_usd,
        });
        let handoff = JobPayload::Strategy(StrategyPayload {
            video_id: payload.video_id.clone(),
            user_id: payload.user_id.clone(),
            analysis,
        });
        ctx.progress(90, "handing off to strategy").await?;

        Ok(StageOutput::new(value).with_handoff(handoff))
    }
}
