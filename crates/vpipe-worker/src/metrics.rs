//! Pipeline metrics.
//!
//! Recorded through the `metrics` facade; the worker binary installs the
//! Prometheus exporter when `METRICS_PORT` is set.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use vpipe_models::{Stage, TokenUsage};

// =============================================================================
// Metric Names
// =============================================================================

pub mod names {
    /// Finished job attempts by stage and outcome.
    pub const JOBS_TOTAL: &str = "vpipe_jobs_total";

    /// Attempt duration in seconds by stage.
    pub const JOB_DURATION_SECONDS: &str = "vpipe_job_duration_seconds";

    /// Attempts rescheduled with backoff by stage.
    pub const JOB_RETRIES_TOTAL: &str = "vpipe_job_retries_total";

    /// Leases reclaimed from silent workers by stage.
    pub const LEASES_RECLAIMED_TOTAL: &str = "vpipe_leases_reclaimed_total";

    /// Provider tokens by kind (input/output).
    pub const AI_TOKENS_TOTAL: &str = "vpipe_ai_tokens_total";

    /// Estimated provider spend in USD.
    pub const AI_COST_USD_TOTAL: &str = "vpipe_ai_cost_usd_total";

    /// Jobs currently held by a pool.
    pub const ACTIVE_JOBS: &str = "vpipe_active_jobs";
}

/// Outcome label of a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retrying,
    Failed,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Retrying => "retrying",
            JobOutcome::Failed => "failed",
        }
    }
}

pub fn record_job(stage: Stage, outcome: JobOutcome, duration: Duration) {
    counter!(
        names::JOBS_TOTAL,
        "stage" => stage.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(names::JOB_DURATION_SECONDS, "stage" => stage.as_str())
        .record(duration.as_secs_f64());

    if outcome == JobOutcome::Retrying {
        counter!(names::JOB_RETRIES_TOTAL, "stage" => stage.as_str()).increment(1);
    }
}

pub fn record_reclaimed(stage: Stage, count: usize) {
    counter!(names::LEASES_RECLAIMED_TOTAL, "stage" => stage.as_str()).increment(count as u64);
}

pub fn record_ai_usage(usage: &TokenUsage, cost_usd: f64) {
    counter!(names::AI_TOKENS_TOTAL, "kind" => "input").increment(usage.input_tokens);
    counter!(names::AI_TOKENS_TOTAL, "kind" => "output").increment(usage.output_tokens);
    gauge!(names::AI_COST_USD_TOTAL).increment(cost_usd);
}

pub fn set_active_jobs(stage: Stage, active: usize) {
    gauge!(names::ACTIVE_JOBS, "stage" => stage.as_str()).set(active as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::JOBS_TOTAL.starts_with("vpipe_"));
        assert!(names::JOB_DURATION_SECONDS.ends_with("_seconds"));
        assert!(names::AI_TOKENS_TOTAL.ends_with("_total"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_job(Stage::Analyze, JobOutcome::Retrying, Duration::from_millis(5));
        record_ai_usage(&TokenUsage::default(), 0.0);
        set_active_jobs(Stage::Process, 2);
    }
}
