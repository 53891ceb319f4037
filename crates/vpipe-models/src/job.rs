//! Job definitions for the stage queues.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::analysis::AiAnalysis;
use crate::video::VideoId;

/// Pipeline stage. Each stage owns one queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Metadata probe and frame extraction
    Process,
    /// Vision-model analysis
    Analyze,
    /// Caption/hashtag/hook derivation
    Strategy,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Process, Stage::Analyze, Stage::Strategy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Process => "process",
            Stage::Analyze => "analyze",
            Stage::Strategy => "strategy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unique identifier for a job.
///
/// Pipeline jobs use a deterministic `<stage>:<video_id>` id so that the same
/// video and stage never produce two live jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Deterministic id for a (stage, video) pair.
    pub fn for_stage(stage: Stage, video_id: &VideoId) -> Self {
        Self(format!("{}:{}", stage, video_id))
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of holding a job, handed out by `lease`.
///
/// Every write made on behalf of a running attempt carries it; a store
/// rejects the write once the job was reclaimed or leased again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lease {
    pub job_id: JobId,
    pub token: String,
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_id, self.token)
    }
}

/// Job state in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Waiting,
    /// Job is leased by a worker
    Active,
    /// Job completed successfully
    Completed,
    /// Attempts exhausted (dead-lettered)
    Failed,
    /// Backing off before the next attempt
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of a process job, written by the upload handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessPayload {
    pub video_id: VideoId,
    pub user_id: String,
    /// Local path of the stored upload
    pub file_path: String,
}

/// Payload of an analyze job, written by the process stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalyzePayload {
    pub video_id: VideoId,
    pub user_id: String,
    pub file_path: String,
    /// Frames sampled by the process stage
    #[serde(default)]
    pub frame_count: u32,
    /// Probed duration in seconds
    #[serde(default)]
    pub duration_secs: f64,
}

/// Payload of a strategy job; carries the persisted analysis inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StrategyPayload {
    pub video_id: VideoId,
    pub user_id: String,
    pub analysis: AiAnalysis,
}

/// Stage-specific job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    Process(ProcessPayload),
    Analyze(AnalyzePayload),
    Strategy(StrategyPayload),
}

impl JobPayload {
    pub fn stage(&self) -> Stage {
        match self {
            JobPayload::Process(_) => Stage::Process,
            JobPayload::Analyze(_) => Stage::Analyze,
            JobPayload::Strategy(_) => Stage::Strategy,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            JobPayload::Process(p) => &p.video_id,
            JobPayload::Analyze(p) => &p.video_id,
            JobPayload::Strategy(p) => &p.video_id,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            JobPayload::Process(p) => &p.user_id,
            JobPayload::Analyze(p) => &p.user_id,
            JobPayload::Strategy(p) => &p.user_id,
        }
    }

    /// Default job id for this payload.
    pub fn default_job_id(&self) -> JobId {
        JobId::for_stage(self.stage(), self.video_id())
    }
}

/// Options for enqueueing a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Explicit job id; defaults to `<stage>:<video_id>`
    pub job_id: Option<JobId>,
    /// Lower values are leased first
    pub priority: u32,
    /// Overrides the stage's configured attempt cap
    pub max_attempts: Option<u32>,
}

impl EnqueueOptions {
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// A job record as held by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Stage queue the job lives in
    pub stage: Stage,

    /// Stage payload
    pub payload: JobPayload,

    /// Job state
    #[serde(default)]
    pub state: JobState,

    /// Lower values are leased first
    #[serde(default)]
    pub priority: u32,

    /// Failed attempts so far
    #[serde(default)]
    pub attempts_made: u32,

    /// Attempt cap
    pub max_attempts: u32,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Last error; the terminal reason once FAILED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,

    /// Value recorded on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_value: Option<serde_json::Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last lease timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Completion/terminal failure timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Due time while delayed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,

    /// Last heartbeat from the lease holder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_at: Option<DateTime<Utc>>,

    /// Token of the current lease, fresh on every lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_token: Option<String>,
}

impl Job {
    /// Create a new waiting job.
    pub fn new(payload: JobPayload, opts: &EnqueueOptions, default_max_attempts: u32) -> Self {
        let id = opts
            .job_id
            .clone()
            .unwrap_or_else(|| payload.default_job_id());

        Self {
            id,
            stage: payload.stage(),
            payload,
            state: JobState::Waiting,
            priority: opts.priority,
            attempts_made: 0,
            max_attempts: opts.max_attempts.unwrap_or(default_max_attempts).max(1),
            progress: 0,
            failed_reason: None,
            return_value: None,
            created_at: Utc::now(),
            processed_at: None,
            finished_at: None,
            run_at: None,
            heartbeat_at: None,
            lease_token: None,
        }
    }

    /// Move to ACTIVE.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.processed_at = Some(now);
        self.heartbeat_at = Some(now);
        self.run_at = None;
        self.lease_token = Some(Uuid::new_v4().to_string());
    }

    /// The lease of the running attempt. Empty token when never leased.
    pub fn lease(&self) -> Lease {
        Lease {
            job_id: self.id.clone(),
            token: self.lease_token.clone().unwrap_or_default(),
        }
    }

    /// Whether `lease` is the live lease of this job.
    pub fn is_held_by(&self, lease: &Lease) -> bool {
        self.state == JobState::Active
            && self.id == lease.job_id
            && self.lease_token.as_deref() == Some(lease.token.as_str())
    }

    /// Apply a progress update. Returns false if it would move backwards.
    pub fn set_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(100);
        if self.state != JobState::Active || progress < self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    /// Move to COMPLETED.
    pub fn complete(&mut self, return_value: serde_json::Value, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.progress = 100;
        self.return_value = Some(return_value);
        self.finished_at = Some(now);
        self.heartbeat_at = None;
        self.lease_token = None;
    }

    /// Whether this is the last allowed attempt.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made + 1 >= self.max_attempts
    }

    /// Snapshot for status polling.
    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id.clone(),
            stage: self.stage,
            state: self.state,
            progress: self.progress,
            failed_reason: self.failed_reason.clone(),
            attempts_made: self.attempts_made,
        }
    }
}

/// Status snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    pub job_id: JobId,
    pub stage: Stage,
    pub state: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub attempts_made: u32,
}
