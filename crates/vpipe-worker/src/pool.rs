//! Stage worker pools.
//!
//! One pool per stage. A pool leases up to its concurrency cap, runs each job
//! on its own task under a timeout with a heartbeat alongside, and records
//! the outcome: completion plus handoff, or a failed attempt. Failed attempts
//! write the error onto the video before the job store schedules the retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use vpipe_models::{Job, JobId, Lease, Stage};
use vpipe_queue::store::LEASE_EXPIRED;
use vpipe_queue::{EnqueueOutcome, FailOutcome, JobStore, QueueError};
use vpipe_storage::VideoRepository;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::logging::JobLogger;
use crate::metrics::{self, JobOutcome};
use crate::pipeline::{advance, failure_message, stage_def};
use crate::retry::{retry_async, FailureTracker, RetryConfig};
use crate::stages::{JobContext, StageHandler};

/// Worker pool for one stage.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct PoolInner {
    stage: Stage,
    handler: Arc<dyn StageHandler>,
    store: Arc<dyn JobStore>,
    videos: Arc<dyn VideoRepository>,
    config: WorkerConfig,
    concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        handler: Arc<dyn StageHandler>,
        store: Arc<dyn JobStore>,
        videos: Arc<dyn VideoRepository>,
        config: WorkerConfig,
    ) -> Self {
        let stage = handler.stage();
        let concurrency = config.concurrency(stage);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(PoolInner {
                stage,
                handler,
                store,
                videos,
                config,
                concurrency,
                semaphore: Arc::new(Semaphore::new(concurrency)),
            }),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn stage(&self) -> Stage {
        self.inner.stage
    }

    /// Jobs currently running.
    pub fn active_jobs(&self) -> usize {
        self.inner.active_jobs()
    }

    pub async fn is_running(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }

    /// Spawn the lease loop and, when configured, the stale-lease reclaimer.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            warn!(stage = %self.inner.stage, "Worker pool already running");
            return;
        }
        self.shutdown.send_replace(false);

        info!(
            stage = %self.inner.stage,
            concurrency = self.inner.concurrency,
            "Starting worker pool"
        );

        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { inner.lease_loop(shutdown_rx).await }));

        if let Some(older_than) = self.inner.config.stale_lease_after {
            let inner = Arc::clone(&self.inner);
            let shutdown_rx = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                inner.reclaim_loop(older_than, shutdown_rx).await
            }));
        }
    }

    /// Stop leasing, then wait up to the shutdown timeout for running jobs.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(stage = %self.inner.stage, "Pool task ended abnormally: {}", e);
            }
        }

        let inner = &self.inner;
        info!(
            stage = %inner.stage,
            active = inner.active_jobs(),
            "Waiting for in-flight jobs to complete..."
        );
        match tokio::time::timeout(
            inner.config.shutdown_timeout,
            inner.semaphore.acquire_many(inner.concurrency as u32),
        )
        .await
        {
            Ok(Ok(_all_permits)) => info!(stage = %inner.stage, "Worker pool stopped"),
            Ok(Err(_)) => warn!(stage = %inner.stage, "Semaphore closed during shutdown"),
            Err(_) => warn!(
                stage = %inner.stage,
                active = inner.active_jobs(),
                "Shutdown timeout reached with jobs still running"
            ),
        }
    }
}

impl PoolInner {
    fn active_jobs(&self) -> usize {
        self.concurrency
            .saturating_sub(self.semaphore.available_permits())
    }

    async fn lease_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut tracker = FailureTracker::new(3);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.store.lease(self.stage).await {
                Ok(Some(job)) => {
                    tracker.record_success();
                    let inner = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _permit = permit;
                        inner.execute(job).await;
                    });
                    metrics::set_active_jobs(self.stage, self.active_jobs());
                    continue;
                }
                Ok(None) => {
                    tracker.record_success();
                    drop(permit);
                }
                Err(e) => {
                    drop(permit);
                    if tracker.record_failure() {
                        error!(stage = %self.stage, "Failed to lease job: {}", e);
                    }
                }
            }

            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        debug!(stage = %self.stage, "Lease loop stopped");
    }

    async fn reclaim_loop(self: Arc<Self>, older_than: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.reclaim_period());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tracker = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = interval.tick() => {}
            }

            match self.store.reclaim_stale(self.stage, older_than).await {
                Ok(reclaimed) => {
                    tracker.record_success();
                    if reclaimed.is_empty() {
                        continue;
                    }
                    metrics::record_reclaimed(self.stage, reclaimed.len());
                    for (job_id, outcome) in reclaimed {
                        self.on_reclaimed(&job_id, outcome).await;
                    }
                }
                Err(e) => {
                    if tracker.record_failure() {
                        warn!(stage = %self.stage, "Failed to reclaim stale leases: {}", e);
                    }
                }
            }
        }

        debug!(stage = %self.stage, "Reclaim loop stopped");
    }

    /// A reclaimed lease counts as a failed attempt of the silent worker.
    async fn on_reclaimed(&self, job_id: &JobId, outcome: FailOutcome) {
        warn!(
            job_id = %job_id,
            stage = %self.stage,
            terminal = outcome.is_terminal(),
            "Reclaimed stale lease"
        );

        let video_id = match self.store.get_job(job_id).await {
            Ok(Some(job)) => job.payload.video_id().clone(),
            Ok(None) => return,
            Err(e) => {
                warn!(job_id = %job_id, "Failed to load reclaimed job: {}", e);
                return;
            }
        };

        let message = format!("{}{}", stage_def(self.stage).failure_prefix, LEASE_EXPIRED);
        if let Err(e) = self
            .videos
            .record_failure(&video_id, &message, outcome.is_terminal())
            .await
        {
            warn!(job_id = %job_id, video_id = %video_id, "Failed to record lease expiry: {}", e);
        }
    }

    async fn execute(self: Arc<Self>, job: Job) {
        let logger = JobLogger::new(&job);
        let span = logger.create_span();
        self.run_attempt(job, logger).instrument(span).await;
        metrics::set_active_jobs(self.stage, self.active_jobs().saturating_sub(1));
    }

    async fn run_attempt(&self, job: Job, logger: JobLogger) {
        logger.log_start(job.attempts_made + 1);
        let started = Instant::now();

        let heartbeat = self.spawn_heartbeat(job.lease());
        let ctx = JobContext::new(Arc::clone(&self.store), &job);

        let result = match tokio::time::timeout(
            self.config.job_timeout,
            self.handler.handle(&job, &ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(self.config.job_timeout.as_secs())),
        };
        let result = result.and_then(|output| {
            let next = advance(&job, &output)?;
            Ok((output.value, next))
        });

        heartbeat.abort();

        match result {
            Ok((value, next)) => self.record_success(&job, value, next, &logger, started).await,
            Err(e) => self.record_failure(&job, e, &logger, started).await,
        }
    }

    fn spawn_heartbeat(&self, lease: Lease) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let every = self.config.heartbeat_period();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            let mut tracker = FailureTracker::new(3);

            loop {
                interval.tick().await;
                match store.heartbeat(&lease).await {
                    Ok(()) => tracker.record_success(),
                    Err(QueueError::NotActive { .. })
                    | Err(QueueError::LeaseLost(_))
                    | Err(QueueError::JobNotFound(_)) => {
                        warn!(job_id = %lease.job_id, "Lease no longer held, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        if tracker.record_failure() {
                            warn!(job_id = %lease.job_id, "Heartbeat failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    async fn record_success(
        &self,
        job: &Job,
        value: serde_json::Value,
        next: Option<(vpipe_models::JobPayload, vpipe_models::EnqueueOptions)>,
        logger: &JobLogger,
        started: Instant,
    ) {
        let lease = job.lease();
        let retry = RetryConfig::new("complete_and_enqueue");
        let completed = retry_async(&retry, QueueError::is_transient, || {
            self.store
                .complete_and_enqueue(&lease, value.clone(), next.clone())
        })
        .await;

        match completed {
            Ok(handoff) => {
                if let Some(EnqueueOutcome::Duplicate(next_id)) = &handoff {
                    logger.log_warning(&format!("next job {} already queued", next_id));
                }
                metrics::record_job(self.stage, JobOutcome::Completed, started.elapsed());
                logger.log_completion(started.elapsed().as_millis());
            }
            Err(QueueError::LeaseLost(_)) | Err(QueueError::NotActive { .. }) => {
                logger.log_warning("lease was reclaimed before completion, result discarded");
            }
            Err(e) => logger.log_error(&format!("failed to record completion: {}", e)),
        }
    }

    async fn record_failure(&self, job: &Job, err: WorkerError, logger: &JobLogger, started: Instant) {
        let lease = job.lease();
        if !self.still_held(&lease).await {
            logger.log_warning(&format!("lease was reclaimed, dropping failure: {}", err));
            return;
        }

        let message = failure_message(self.stage, &err);
        let terminal = job.is_final_attempt();
        logger.log_error(&format!(
            "{} (attempt {}/{}, transient={})",
            message,
            job.attempts_made + 1,
            job.max_attempts,
            err.is_retryable()
        ));

        let video_id = job.payload.video_id();
        if let Err(e) = self.videos.record_failure(video_id, &message, terminal).await {
            logger.log_warning(&format!("failed to record error on video: {}", e));
        }

        let retry = RetryConfig::new("fail");
        let failed = retry_async(&retry, QueueError::is_transient, || {
            self.store.fail(&lease, &message)
        })
        .await;

        match failed {
            Ok(FailOutcome::Retrying { attempt, delay }) => {
                info!(
                    job_id = %job.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Job scheduled for retry"
                );
                metrics::record_job(self.stage, JobOutcome::Retrying, started.elapsed());
            }
            Ok(FailOutcome::DeadLettered { attempts }) => {
                error!(job_id = %job.id, attempts, "Job failed permanently: {}", message);
                metrics::record_job(self.stage, JobOutcome::Failed, started.elapsed());
            }
            Err(QueueError::LeaseLost(_)) | Err(QueueError::NotActive { .. }) => {
                logger.log_warning("lease was reclaimed before the failure was recorded");
            }
            Err(e) => logger.log_error(&format!("failed to record failure: {}", e)),
        }
    }

    /// Whether the attempt's lease is still the live one. A store error counts
    /// as held so the store's own fencing decides.
    async fn still_held(&self, lease: &Lease) -> bool {
        match self.store.get_job(&lease.job_id).await {
            Ok(Some(job)) => job.is_held_by(lease),
            Ok(None) => false,
            Err(_) => true,
        }
    }
}
