//! Queue configuration.

use std::time::Duration;

use vpipe_models::Stage;

/// Retry policy of one stage queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageQueueConfig {
    /// Attempts before a job is dead-lettered
    pub max_attempts: u32,
    /// First retry delay; doubles on each further attempt
    pub base_delay: Duration,
}

impl StageQueueConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Defaults per stage. The AI stage gets the fewest attempts since each
    /// one is a paid provider call.
    pub fn default_for(stage: Stage) -> Self {
        match stage {
            Stage::Process => Self::new(3, Duration::from_secs(5)),
            Stage::Analyze => Self::new(2, Duration::from_secs(10)),
            Stage::Strategy => Self::new(3, Duration::from_secs(2)),
        }
    }

    fn from_env(stage: Stage) -> Self {
        let default = Self::default_for(stage);
        let prefix = format!("QUEUE_{}", stage.as_str().to_uppercase());
        Self {
            max_attempts: env_parse(&format!("{}_MAX_ATTEMPTS", prefix))
                .unwrap_or(default.max_attempts),
            base_delay: env_parse(&format!("{}_BACKOFF_MS", prefix))
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        }
    }
}

/// Retention of terminal jobs. A policy, not a correctness requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Completed jobs kept per stage
    pub completed_keep: usize,
    /// Completed jobs older than this are dropped
    pub completed_max_age: Duration,
    /// Dead-lettered jobs older than this are dropped
    pub failed_max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_keep: 100,
            completed_max_age: Duration::from_secs(24 * 3600),
            failed_max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every Redis key
    pub key_prefix: String,
    pub process: StageQueueConfig,
    pub analyze: StageQueueConfig,
    pub strategy: StageQueueConfig,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
    pub retention: RetentionPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vpipe".to_string(),
            process: StageQueueConfig::default_for(Stage::Process),
            analyze: StageQueueConfig::default_for(Stage::Analyze),
            strategy: StageQueueConfig::default_for(Stage::Strategy),
            max_delay: Duration::from_secs(3600),
            retention: RetentionPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = RetentionPolicy::default();
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or_else(|_| "vpipe".to_string()),
            process: StageQueueConfig::from_env(Stage::Process),
            analyze: StageQueueConfig::from_env(Stage::Analyze),
            strategy: StageQueueConfig::from_env(Stage::Strategy),
            max_delay: Duration::from_secs(env_parse("QUEUE_MAX_BACKOFF_SECS").unwrap_or(3600)),
            retention: RetentionPolicy {
                completed_keep: env_parse("QUEUE_COMPLETED_KEEP")
                    .unwrap_or(defaults.completed_keep),
                completed_max_age: env_parse("QUEUE_COMPLETED_MAX_AGE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.completed_max_age),
                failed_max_age: env_parse("QUEUE_FAILED_MAX_AGE_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.failed_max_age),
            },
        }
    }

    /// Retry policy for a stage.
    pub fn stage(&self, stage: Stage) -> &StageQueueConfig {
        match stage {
            Stage::Process => &self.process,
            Stage::Analyze => &self.analyze,
            Stage::Strategy => &self.strategy,
        }
    }

    /// Override one stage's retry policy.
    pub fn with_stage(mut self, stage: Stage, config: StageQueueConfig) -> Self {
        match stage {
            Stage::Process => self.process = config,
            Stage::Analyze => self.analyze = config,
            Stage::Strategy => self.strategy = config,
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
