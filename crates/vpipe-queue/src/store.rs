//! The job store contract.

use std::time::Duration;

use async_trait::async_trait;
use vpipe_models::{EnqueueOptions, Job, JobId, JobPayload, JobStatus, Lease, Stage};

use crate::error::QueueResult;

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new waiting job was created
    Enqueued(JobId),
    /// A live job with the same id already exists; nothing was written
    Duplicate(JobId),
}

impl EnqueueOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            EnqueueOutcome::Enqueued(id) | EnqueueOutcome::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, EnqueueOutcome::Duplicate(_))
    }
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Job is DELAYED and becomes leasable after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Attempts exhausted; job is terminal FAILED
    DeadLettered { attempts: u32 },
}

impl FailOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FailOutcome::DeadLettered { .. })
    }
}

/// Per-state job counts of one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Durable, prioritized work queues, one per stage.
///
/// `lease` is the only exclusion point of the pipeline: implementations must
/// guarantee a job is held by at most one worker at a time. Writes on behalf
/// of a running attempt carry its [`Lease`] and fail with
/// [`QueueError::LeaseLost`](crate::QueueError::LeaseLost) once that lease
/// was reclaimed or replaced.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a WAITING job. A live (non-terminal) job with the same id turns
    /// this into a no-op; a terminal one is replaced.
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> QueueResult<EnqueueOutcome>;

    /// Claim the next WAITING (or due DELAYED) job of a stage. The returned
    /// job carries a fresh lease token, see [`Job::lease`].
    async fn lease(&self, stage: Stage) -> QueueResult<Option<Job>>;

    /// Raise the progress of a leased job. Returns false when the value would
    /// move backwards.
    async fn update_progress(&self, lease: &Lease, percent: u8) -> QueueResult<bool>;

    /// Refresh a lease.
    async fn heartbeat(&self, lease: &Lease) -> QueueResult<()>;

    /// Complete an ACTIVE job and, in the same atomic step, enqueue the next
    /// job of the chain. The next job can only be leased once the completed
    /// job's `finished_at` is recorded.
    async fn complete_and_enqueue(
        &self,
        lease: &Lease,
        return_value: serde_json::Value,
        next: Option<(JobPayload, EnqueueOptions)>,
    ) -> QueueResult<Option<EnqueueOutcome>>;

    /// Complete a leased job.
    async fn complete(&self, lease: &Lease, return_value: serde_json::Value) -> QueueResult<()> {
        self.complete_and_enqueue(lease, return_value, None).await?;
        Ok(())
    }

    /// Record a failed attempt: retry with backoff or dead-letter.
    async fn fail(&self, lease: &Lease, error: &str) -> QueueResult<FailOutcome>;

    /// Fetch a job record.
    async fn get_job(&self, job_id: &JobId) -> QueueResult<Option<Job>>;

    /// Status snapshot for polling.
    async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<JobStatus>> {
        Ok(self.get_job(job_id).await?.map(|job| job.status()))
    }

    /// Fail ACTIVE jobs whose last heartbeat is older than `older_than`.
    async fn reclaim_stale(
        &self,
        stage: Stage,
        older_than: Duration,
    ) -> QueueResult<Vec<(JobId, FailOutcome)>>;

    /// Per-state counts of a stage.
    async fn counts(&self, stage: Stage) -> QueueResult<StageCounts>;
}

/// Reason recorded when a lease is reclaimed.
pub const LEASE_EXPIRED: &str = "lease expired: worker stopped heartbeating";
