//! Structured job logging.

use tracing::{error, info, warn, Span};
use vpipe_models::{Job, Stage};

/// Logs job lifecycle events with the job, stage and video attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    stage: Stage,
    video_id: String,
}

impl JobLogger {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            stage: job.stage,
            video_id: job.payload.video_id().to_string(),
        }
    }

    pub fn log_start(&self, attempt: u32) {
        info!(
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id,
            attempt,
            "Job started"
        );
    }

    pub fn log_progress(&self, percent: u8, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id,
            percent,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, elapsed_ms: u128) {
        info!(
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id,
            elapsed_ms,
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Span wrapping one attempt of the job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            stage = %self.stage,
            video_id = %self.video_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpipe_models::{EnqueueOptions, JobPayload, ProcessPayload, VideoId};

    #[test]
    fn test_job_logger_fields() {
        let job = Job::new(
            JobPayload::Process(ProcessPayload {
                video_id: VideoId::from_string("v-1"),
                user_id: "u".into(),
                file_path: "/tmp/v.mp4".into(),
            }),
            &EnqueueOptions::default(),
            3,
        );
        let logger = JobLogger::new(&job);

        assert_eq!(logger.job_id(), "process:v-1");
        assert_eq!(logger.stage(), Stage::Process);
    }
}
