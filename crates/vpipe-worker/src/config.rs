//! Worker configuration.

use std::time::Duration;

use vpipe_models::Stage;

/// Floor for timer periods; `tokio::time::interval` rejects zero.
const MIN_TICK: Duration = Duration::from_millis(1);

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent leases held by the process pool
    pub process_concurrency: usize,
    /// Concurrent leases held by the analyze pool
    pub analyze_concurrency: usize,
    /// Concurrent leases held by the strategy pool
    pub strategy_concurrency: usize,
    /// Sleep between lease attempts while a queue is empty
    pub poll_interval: Duration,
    /// Upper bound for a single job attempt
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Interval for refreshing the lease of a running job
    pub heartbeat_interval: Duration,
    /// Leases without a heartbeat for this long are reclaimed. `None` disables reclaim.
    pub stale_lease_after: Option<Duration>,
    /// How often each pool scans for stale leases
    pub reclaim_interval: Duration,
    /// Provider calls allowed per window
    pub ai_rate_limit_calls: u32,
    pub ai_rate_limit_window: Duration,
    /// Key frames sent to the vision provider
    pub ai_key_frames: u32,
    /// Prometheus exporter port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            process_concurrency: 4,
            analyze_concurrency: 1,
            strategy_concurrency: 2,
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(3600), // 1 hour
            shutdown_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            stale_lease_after: Some(Duration::from_secs(300)), // 5 minutes
            reclaim_interval: Duration::from_secs(30),
            ai_rate_limit_calls: 10,
            ai_rate_limit_window: Duration::from_secs(60),
            ai_key_frames: 5,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            process_concurrency: env_parse("WORKER_PROCESS_CONCURRENCY")
                .unwrap_or(defaults.process_concurrency),
            analyze_concurrency: env_parse("WORKER_ANALYZE_CONCURRENCY")
                .unwrap_or(defaults.analyze_concurrency),
            strategy_concurrency: env_parse("WORKER_STRATEGY_CONCURRENCY")
                .unwrap_or(defaults.strategy_concurrency),
            poll_interval: env_parse("WORKER_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            job_timeout: env_parse("WORKER_JOB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            heartbeat_interval: env_parse("WORKER_HEARTBEAT_SECS")
                .map(interval_from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            stale_lease_after: match env_parse::<u64>("WORKER_STALE_LEASE_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.stale_lease_after,
            },
            reclaim_interval: env_parse("WORKER_RECLAIM_INTERVAL_SECS")
                .map(interval_from_secs)
                .unwrap_or(defaults.reclaim_interval),
            ai_rate_limit_calls: env_parse("AI_RATE_LIMIT_CALLS")
                .unwrap_or(defaults.ai_rate_limit_calls),
            ai_rate_limit_window: env_parse("AI_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ai_rate_limit_window),
            ai_key_frames: env_parse("AI_KEY_FRAMES").unwrap_or(defaults.ai_key_frames),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }

    /// Lease cap of a stage pool. Never below one.
    pub fn concurrency(&self, stage: Stage) -> usize {
        let cap = match stage {
            Stage::Process => self.process_concurrency,
            Stage::Analyze => self.analyze_concurrency,
            Stage::Strategy => self.strategy_concurrency,
        };
        cap.max(1)
    }

    /// Heartbeat timer period. Never zero.
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_interval.max(MIN_TICK)
    }

    /// Stale-lease scan period. Never zero.
    pub fn reclaim_period(&self) -> Duration {
        self.reclaim_interval.max(MIN_TICK)
    }

    /// Tight timings for tests and local runs.
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(50),
            reclaim_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            job_timeout: Duration::from_secs(30),
            ai_rate_limit_window: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

/// Timer settings given in whole seconds; zero is raised to one second.
fn interval_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
