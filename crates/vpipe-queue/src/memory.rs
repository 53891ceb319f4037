//! In-process job store.
//!
//! Same contract as [`RedisJobStore`](crate::RedisJobStore), held behind a
//! single mutex. Used by tests and by single-process deployments that don't
//! need durability across restarts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vpipe_models::{EnqueueOptions, Job, JobId, JobPayload, JobState, Lease, Stage};

use crate::backoff::apply_failure;
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{EnqueueOutcome, FailOutcome, JobStore, StageCounts, LEASE_EXPIRED};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Insertion order, breaks priority ties FIFO
    seq: HashMap<JobId, u64>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, config: &QueueConfig, payload: JobPayload, opts: EnqueueOptions) -> EnqueueOutcome {
        let default_attempts = config.stage(payload.stage()).max_attempts;
        let job = Job::new(payload, &opts, default_attempts);

        if let Some(existing) = self.jobs.get(&job.id) {
            if !existing.state.is_terminal() {
                debug!(job_id = %job.id, state = %existing.state, "Duplicate enqueue ignored");
                return EnqueueOutcome::Duplicate(job.id);
            }
        }

        let id = job.id.clone();
        self.next_seq += 1;
        self.seq.insert(id.clone(), self.next_seq);
        self.jobs.insert(id.clone(), job);
        EnqueueOutcome::Enqueued(id)
    }

    fn held_mut(&mut self, lease: &Lease) -> QueueResult<&mut Job> {
        let job_id = &lease.job_id;
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;
        if job.state != JobState::Active {
            return Err(QueueError::not_active(job_id, job.state));
        }
        if !job.is_held_by(lease) {
            return Err(QueueError::LeaseLost(job_id.clone()));
        }
        Ok(job)
    }

    fn next_leasable(&self, stage: Stage, now: DateTime<Utc>) -> Option<JobId> {
        self.jobs
            .values()
            .filter(|job| job.stage == stage)
            .filter(|job| match job.state {
                JobState::Waiting => true,
                JobState::Delayed => job.run_at.map_or(true, |due| due <= now),
                _ => false,
            })
            .min_by_key(|job| (job.priority, self.seq.get(&job.id).copied().unwrap_or(u64::MAX)))
            .map(|job| job.id.clone())
    }

    fn prune(&mut self, stage: Stage, config: &QueueConfig, now: DateTime<Utc>) {
        let retention = &config.retention;
        let completed_cutoff = now - to_chrono(retention.completed_max_age);
        let failed_cutoff = now - to_chrono(retention.failed_max_age);

        let mut completed: Vec<(DateTime<Utc>, JobId)> = self
            .jobs
            .values()
            .filter(|job| job.stage == stage && job.state == JobState::Completed)
            .map(|job| (job.finished_at.unwrap_or(job.created_at), job.id.clone()))
            .collect();
        completed.sort_by(|a, b| b.0.cmp(&a.0));

        let mut expired: Vec<JobId> = completed
            .iter()
            .enumerate()
            .filter(|(idx, (finished, _))| *idx >= retention.completed_keep || *finished < completed_cutoff)
            .map(|(_, (_, id))| id.clone())
            .collect();

        expired.extend(
            self.jobs
                .values()
                .filter(|job| job.stage == stage && job.state == JobState::Failed)
                .filter(|job| job.finished_at.unwrap_or(job.created_at) < failed_cutoff)
                .map(|job| job.id.clone()),
        );

        for id in expired {
            self.jobs.remove(&id);
            self.seq.remove(&id);
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Mutex-guarded job store.
pub struct InMemoryJobStore {
    config: QueueConfig,
    inner: Mutex<Inner>,
}

impl InMemoryJobStore {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Every job currently held, for inspection in tests.
    pub async fn jobs(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.values().cloned().collect()
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> QueueResult<EnqueueOutcome> {
        let stage = payload.stage();
        let outcome = self.inner.lock().await.insert(&self.config, payload, opts);
        if let EnqueueOutcome::Enqueued(id) = &outcome {
            info!(job_id = %id, stage = %stage, "Enqueued job");
        }
        Ok(outcome)
    }

    async fn lease(&self, stage: Stage) -> QueueResult<Option<Job>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let Some(id) = inner.next_leasable(stage, now) else {
            return Ok(None);
        };
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.start(now);
        debug!(job_id = %id, attempt = job.attempts_made + 1, "Leased job");
        Ok(Some(job.clone()))
    }

    async fn update_progress(&self, lease: &Lease, percent: u8) -> QueueResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.held_mut(lease)?.set_progress(percent))
    }

    async fn heartbeat(&self, lease: &Lease) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        inner.held_mut(lease)?.heartbeat_at = Some(Utc::now());
        Ok(())
    }

    async fn complete_and_enqueue(
        &self,
        lease: &Lease,
        return_value: serde_json::Value,
        next: Option<(JobPayload, EnqueueOptions)>,
    ) -> QueueResult<Option<EnqueueOutcome>> {
        let now = Utc::now();
        let job_id = &lease.job_id;
        let mut inner = self.inner.lock().await;

        let job = inner.held_mut(lease)?;
        job.complete(return_value, now);
        let stage = job.stage;
        info!(job_id = %job_id, "Completed job");

        let outcome = next.map(|(payload, opts)| inner.insert(&self.config, payload, opts));
        if let Some(EnqueueOutcome::Enqueued(next_id)) = &outcome {
            info!(job_id = %next_id, parent = %job_id, "Enqueued next stage");
        }

        inner.prune(stage, &self.config, now);
        Ok(outcome)
    }

    async fn fail(&self, lease: &Lease, error: &str) -> QueueResult<FailOutcome> {
        let now = Utc::now();
        let job_id = &lease.job_id;
        let mut inner = self.inner.lock().await;

        let job = inner.held_mut(lease)?;
        let policy = self.config.stage(job.stage);
        let outcome = apply_failure(job, error, policy.base_delay, self.config.max_delay, now);
        let stage = job.stage;

        match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                warn!(job_id = %job_id, attempt, delay_ms = delay.as_millis() as u64, error, "Job failed, retrying");
            }
            FailOutcome::DeadLettered { attempts } => {
                warn!(job_id = %job_id, attempts, error, "Job dead-lettered");
                inner.prune(stage, &self.config, now);
            }
        }
        Ok(outcome)
    }

    async fn get_job(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        Ok(self.inner.lock().await.jobs.get(job_id).cloned())
    }

    async fn reclaim_stale(
        &self,
        stage: Stage,
        older_than: Duration,
    ) -> QueueResult<Vec<(JobId, FailOutcome)>> {
        let now = Utc::now();
        let cutoff = now - to_chrono(older_than);
        let policy = self.config.stage(stage).clone();
        let max_delay = self.config.max_delay;
        let mut inner = self.inner.lock().await;

        let mut reclaimed = Vec::new();
        for job in inner.jobs.values_mut() {
            if job.stage != stage || job.state != JobState::Active {
                continue;
            }
            let last_seen = job.heartbeat_at.or(job.processed_at).unwrap_or(job.created_at);
            if last_seen < cutoff {
                let outcome = apply_failure(job, LEASE_EXPIRED, policy.base_delay, max_delay, now);
                warn!(job_id = %job.id, ?outcome, "Reclaimed stale lease");
                reclaimed.push((job.id.clone(), outcome));
            }
        }
        Ok(reclaimed)
    }

    async fn counts(&self, stage: Stage) -> QueueResult<StageCounts> {
        let inner = self.inner.lock().await;
        let mut counts = StageCounts::default();
        for job in inner.jobs.values().filter(|job| job.stage == stage) {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
