//! Exponential backoff and the shared failure transition.

use std::time::Duration;

use chrono::{DateTime, Utc};
use vpipe_models::{Job, JobState};

use crate::store::FailOutcome;

/// Delay before the next attempt: `base * 2^attempts_before`, capped at `max`.
///
/// `attempts_before` is the number of failed attempts prior to the one that
/// just failed, so the first retry waits exactly `base`.
pub fn backoff_delay(base: Duration, attempts_before: u32, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempts_before).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

/// Record a failed attempt on an ACTIVE job.
///
/// Schedules a delayed retry while attempts remain, otherwise dead-letters
/// the job. Both store implementations route `fail` and stale-lease
/// reclamation through here.
pub(crate) fn apply_failure(
    job: &mut Job,
    error: &str,
    base_delay: Duration,
    max_delay: Duration,
    now: DateTime<Utc>,
) -> FailOutcome {
    let attempts_before = job.attempts_made;
    job.attempts_made += 1;
    job.failed_reason = Some(error.to_string());
    job.heartbeat_at = None;
    job.lease_token = None;

    if job.attempts_made < job.max_attempts {
        let delay = backoff_delay(base_delay, attempts_before, max_delay);
        job.state = JobState::Delayed;
        job.run_at = Some(now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX));
        FailOutcome::Retrying {
            attempt: job.attempts_made,
            delay,
        }
    } else {
        job.state = JobState::Failed;
        job.run_at = None;
        job.finished_at = Some(now);
        FailOutcome::DeadLettered {
            attempts: job.attempts_made,
        }
    }
}
