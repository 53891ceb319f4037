//! Stage handlers.
//!
//! A handler runs one attempt of one job. It reports progress through the
//! `JobContext`, writes its results to the video repository and returns the
//! payload of the next stage, if any. Completion and the handoff itself are
//! done by the pool.

mod analyze;
mod process;
mod strategy;

pub use analyze::AnalyzeStage;
pub use process::ProcessStage;
pub use strategy::StrategyStage;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vpipe_models::{Job, JobId, JobPayload, Lease, Stage};
use vpipe_queue::JobStore;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// Recorded as the job's return value
    pub value: Value,
    /// Payload for the next stage
    pub handoff: Option<JobPayload>,
}

impl StageOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            handoff: None,
        }
    }

    pub fn with_handoff(mut self, payload: JobPayload) -> Self {
        self.handoff = Some(payload);
        self
    }
}

/// Per-attempt handle given to a handler.
#[derive(Clone)]
pub struct JobContext {
    store: Arc<dyn JobStore>,
    lease: Lease,
    logger: JobLogger,
}

impl JobContext {
    pub fn new(store: Arc<dyn JobStore>, job: &Job) -> Self {
        Self {
            store,
            lease: job.lease(),
            logger: JobLogger::new(job),
        }
    }

    /// Report progress. Lower values than already recorded are ignored.
    pub async fn progress(&self, percent: u8, message: &str) -> WorkerResult<()> {
        self.store.update_progress(&self.lease, percent).await?;
        self.logger.log_progress(percent, message);
        Ok(())
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn job_id(&self) -> &JobId {
        &self.lease.job_id
    }
}

#[async_trait]
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> Stage;

    async fn handle(&self, job: &Job, ctx: &JobContext) -> WorkerResult<StageOutput>;
}

pub(crate) fn payload_mismatch(stage: Stage, job: &Job) -> WorkerError {
    WorkerError::pipeline(format!(
        "{} handler received a {} payload for job {}",
        stage,
        job.payload.stage(),
        job.id
    ))
}

#[cfg(test)]
pub(crate) mod test_support;
