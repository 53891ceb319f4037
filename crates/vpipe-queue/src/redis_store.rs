//! Redis-backed job store.
//!
//! Layout, all under the configured prefix:
//!
//! - `{p}:job:{id}`          job record as JSON
//! - `{p}:{stage}:waiting`   zset, score `priority * 1e12 + seq`
//! - `{p}:{stage}:delayed`   zset, score = due time (ms)
//! - `{p}:{stage}:active`    zset, score = last heartbeat (ms)
//! - `{p}:{stage}:completed` zset, score = finish time (ms)
//! - `{p}:{stage}:failed`    zset, score = finish time (ms)
//! - `{p}:priority`          hash, job id -> priority
//! - `{p}:seq`               FIFO tie-breaker counter
//!
//! Membership in the `active` zset plus the `lease_token` in the job record
//! is the lease. Every write that requires a live lease goes through a script
//! that checks both first, so a job reclaimed from a stalled worker cannot be
//! resurrected by that worker, even after another worker leased it again.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use vpipe_models::{EnqueueOptions, Job, JobId, JobPayload, JobState, Lease, Stage};

use crate::backoff::apply_failure;
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::store::{EnqueueOutcome, FailOutcome, JobStore, StageCounts, LEASE_EXPIRED};

/// KEYS: job, waiting, completed, failed, priority, seq
/// ARGV: id, json, priority
const ENQUEUE_LUA: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  local state = cjson.decode(existing)['state']
  if state ~= 'completed' and state ~= 'failed' then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('ZREM', KEYS[3], ARGV[1])
redis.call('ZREM', KEYS[4], ARGV[1])
redis.call('HSET', KEYS[5], ARGV[1], ARGV[3])
local seq = redis.call('INCR', KEYS[6])
redis.call('ZADD', KEYS[2], tonumber(ARGV[3]) * 1e12 + seq, ARGV[1])
return 1
"#;

/// KEYS: waiting, delayed, active, priority, seq
/// ARGV: now_ms
const LEASE_LUA: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, id in ipairs(due) do
  local priority = tonumber(redis.call('HGET', KEYS[4], id) or '0')
  local seq = redis.call('INCR', KEYS[5])
  redis.call('ZREM', KEYS[2], id)
  redis.call('ZADD', KEYS[1], priority * 1e12 + seq, id)
end
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then
  return false
end
redis.call('ZADD', KEYS[3], ARGV[1], popped[1])
return popped[1]
"#;

/// KEYS: job, active
/// ARGV: id, json, lease token ('' for no check)
const WRITE_IF_ACTIVE_LUA: &str = r#"
if not redis.call('ZSCORE', KEYS[2], ARGV[1]) then
  return 0
end
if ARGV[3] ~= '' then
  local raw = redis.call('GET', KEYS[1])
  if not raw or cjson.decode(raw)['lease_token'] ~= ARGV[3] then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
"#;

/// KEYS: job, active
/// ARGV: id, now_ms, lease token
const HEARTBEAT_LUA: &str = r#"
if not redis.call('ZSCORE', KEYS[2], ARGV[1]) then
  return 0
end
local raw = redis.call('GET', KEYS[1])
if not raw or cjson.decode(raw)['lease_token'] ~= ARGV[3] then
  return 0
end
redis.call('ZADD', KEYS[2], ARGV[2], ARGV[1])
return 1
"#;

/// Move a job out of `active` into `delayed` or `failed`.
///
/// KEYS: job, active, target
/// ARGV: id, json, target score, max heartbeat score ('' for no check),
///       lease token ('' for no check)
const RELEASE_LUA: &str = r#"
local score = redis.call('ZSCORE', KEYS[2], ARGV[1])
if not score then
  return 0
end
if ARGV[4] ~= '' and tonumber(score) > tonumber(ARGV[4]) then
  return 0
end
if ARGV[5] ~= '' then
  local raw = redis.call('GET', KEYS[1])
  if not raw or cjson.decode(raw)['lease_token'] ~= ARGV[5] then
    return 0
  end
end
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('SET', KEYS[1], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
return 1
"#;

/// Complete a job and enqueue its successor in one step.
///
/// KEYS: job, active, completed, next job, next waiting, next completed,
///       next failed, priority, seq
/// ARGV: id, json, now_ms, next id ('' for none), next json, next priority,
///       lease token
///
/// Returns -1 when the lease was lost, 0 with no successor, 1 when the
/// successor was enqueued, 2 when it already existed.
const COMPLETE_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw or cjson.decode(raw)['lease_token'] ~= ARGV[7] then
  return -1
end
if redis.call('ZREM', KEYS[2], ARGV[1]) == 0 then
  return -1
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
if ARGV[4] == '' then
  return 0
end
local existing = redis.call('GET', KEYS[4])
if existing then
  local state = cjson.decode(existing)['state']
  if state ~= 'completed' and state ~= 'failed' then
    return 2
  end
end
redis.call('SET', KEYS[4], ARGV[5])
redis.call('ZREM', KEYS[6], ARGV[4])
redis.call('ZREM', KEYS[7], ARGV[4])
redis.call('HSET', KEYS[8], ARGV[4], ARGV[6])
local seq = redis.call('INCR', KEYS[9])
redis.call('ZADD', KEYS[5], tonumber(ARGV[6]) * 1e12 + seq, ARGV[4])
return 1
"#;

/// Drop terminal jobs from a retention zset.
///
/// KEYS: zset, priority
/// ARGV: job key prefix, ids...
const PRUNE_LUA: &str = r#"
for i = 2, #ARGV do
  local id = ARGV[i]
  local key = ARGV[1] .. id
  local raw = redis.call('GET', key)
  if raw then
    local state = cjson.decode(raw)['state']
    if state == 'completed' or state == 'failed' then
      redis.call('DEL', key)
      redis.call('HDEL', KEYS[2], id)
    end
  end
  redis.call('ZREM', KEYS[1], id)
end
return #ARGV - 1
"#;

struct Scripts {
    enqueue: redis::Script,
    lease: redis::Script,
    write_if_active: redis::Script,
    heartbeat: redis::Script,
    release: redis::Script,
    complete: redis::Script,
    prune: redis::Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            enqueue: redis::Script::new(ENQUEUE_LUA),
            lease: redis::Script::new(LEASE_LUA),
            write_if_active: redis::Script::new(WRITE_IF_ACTIVE_LUA),
            heartbeat: redis::Script::new(HEARTBEAT_LUA),
            release: redis::Script::new(RELEASE_LUA),
            complete: redis::Script::new(COMPLETE_LUA),
            prune: redis::Script::new(PRUNE_LUA),
        }
    }
}

/// Job store client.
pub struct RedisJobStore {
    client: redis::Client,
    config: QueueConfig,
    scripts: Scripts,
}

impl RedisJobStore {
    /// Create a new store.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            scripts: Scripts::load(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Check connectivity.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn job_key_prefix(&self) -> String {
        format!("{}:job:", self.config.key_prefix)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_key_prefix(), id)
    }

    fn stage_key(&self, stage: Stage, set: &str) -> String {
        format!("{}:{}:{}", self.config.key_prefix, stage, set)
    }

    fn priority_key(&self) -> String {
        format!("{}:priority", self.config.key_prefix)
    }

    fn seq_key(&self) -> String {
        format!("{}:seq", self.config.key_prefix)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job_id: &JobId,
    ) -> QueueResult<Option<Job>> {
        let raw: Option<String> = conn.get(self.job_key(job_id)).await?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(QueueError::from)
    }

    /// Load the job behind a lease. The scripts re-check the token on write.
    async fn load_held(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        lease: &Lease,
    ) -> QueueResult<Job> {
        let job_id = &lease.job_id;
        let job = self
            .load(conn, job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;
        if job.state != JobState::Active {
            return Err(QueueError::not_active(job_id, job.state));
        }
        if !job.is_held_by(lease) {
            return Err(QueueError::LeaseLost(job_id.clone()));
        }
        Ok(job)
    }

    /// Write a job record while it is still active. With a lease, the stored
    /// record must also carry that lease's token.
    async fn write_if_active(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
        lease: Option<&Lease>,
    ) -> QueueResult<bool> {
        let json = serde_json::to_string(job)?;
        let written: i32 = self
            .scripts
            .write_if_active
            .key(self.job_key(&job.id))
            .key(self.stage_key(job.stage, "active"))
            .arg(job.id.as_str())
            .arg(json)
            .arg(lease.map(|l| l.token.as_str()).unwrap_or_default())
            .invoke_async(conn)
            .await?;
        Ok(written == 1)
    }

    /// Move an ACTIVE job to DELAYED or FAILED after `apply_failure`.
    ///
    /// `max_heartbeat_ms` guards reclamation against a heartbeat that landed
    /// after the stale scan. `lease` fences a worker's own failure report.
    async fn release(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        job: &Job,
        max_heartbeat_ms: Option<i64>,
        lease: Option<&Lease>,
    ) -> QueueResult<bool> {
        let (target, score) = match job.state {
            JobState::Delayed => (
                "delayed",
                job.run_at.map(|t| t.timestamp_millis()).unwrap_or_default(),
            ),
            _ => (
                "failed",
                job.finished_at.map(|t| t.timestamp_millis()).unwrap_or_default(),
            ),
        };
        let json = serde_json::to_string(job)?;
        let guard = max_heartbeat_ms.map(|ms| ms.to_string()).unwrap_or_default();

        let released: i32 = self
            .scripts
            .release
            .key(self.job_key(&job.id))
            .key(self.stage_key(job.stage, "active"))
            .key(self.stage_key(job.stage, target))
            .arg(job.id.as_str())
            .arg(json)
            .arg(score)
            .arg(guard)
            .arg(lease.map(|l| l.token.as_str()).unwrap_or_default())
            .invoke_async(conn)
            .await?;
        Ok(released == 1)
    }

    /// Apply the retention policy to a stage's terminal sets.
    async fn prune(&self, conn: &mut redis::aio::MultiplexedConnection, stage: Stage) -> QueueResult<()> {
        let retention = &self.config.retention;
        let now_ms = Utc::now().timestamp_millis();

        let completed_key = self.stage_key(stage, "completed");
        let completed_cutoff = now_ms - retention.completed_max_age.as_millis() as i64;
        let mut expired: Vec<String> = conn
            .zrangebyscore(&completed_key, "-inf", completed_cutoff)
            .await?;
        let overflow: Vec<String> = conn
            .zrevrange(&completed_key, retention.completed_keep as isize, -1)
            .await?;
        expired.extend(overflow);
        expired.sort();
        expired.dedup();
        self.prune_ids(conn, &completed_key, &expired).await?;

        let failed_key = self.stage_key(stage, "failed");
        let failed_cutoff = now_ms - retention.failed_max_age.as_millis() as i64;
        let expired: Vec<String> = conn.zrangebyscore(&failed_key, "-inf", failed_cutoff).await?;
        self.prune_ids(conn, &failed_key, &expired).await
    }

    async fn prune_ids(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        zset: &str,
        ids: &[String],
    ) -> QueueResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut invocation = self.scripts.prune.prepare_invoke();
        invocation
            .key(zset)
            .key(self.priority_key())
            .arg(self.job_key_prefix());
        for id in ids {
            invocation.arg(id);
        }
        let removed: i64 = invocation.invoke_async(conn).await?;
        debug!(zset, removed, "Pruned terminal jobs");
        Ok(())
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, payload: JobPayload, opts: EnqueueOptions) -> QueueResult<EnqueueOutcome> {
        let mut conn = self.connection().await?;
        let stage = payload.stage();
        let job = Job::new(payload, &opts, self.config.stage(stage).max_attempts);
        let json = serde_json::to_string(&job)?;

        let inserted: i32 = self
            .scripts
            .enqueue
            .key(self.job_key(&job.id))
            .key(self.stage_key(stage, "waiting"))
            .key(self.stage_key(stage, "completed"))
            .key(self.stage_key(stage, "failed"))
            .key(self.priority_key())
            .key(self.seq_key())
            .arg(job.id.as_str())
            .arg(json)
            .arg(job.priority)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        if inserted == 1 {
            info!(job_id = %job.id, stage = %stage, "Enqueued job");
            Ok(EnqueueOutcome::Enqueued(job.id))
        } else {
            debug!(job_id = %job.id, "Duplicate enqueue ignored");
            Ok(EnqueueOutcome::Duplicate(job.id))
        }
    }

    async fn lease(&self, stage: Stage) -> QueueResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let now = Utc::now();

        let leased: Option<String> = self
            .scripts
            .lease
            .key(self.stage_key(stage, "waiting"))
            .key(self.stage_key(stage, "delayed"))
            .key(self.stage_key(stage, "active"))
            .key(self.priority_key())
            .key(self.seq_key())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        let Some(id) = leased.map(JobId::from_string) else {
            return Ok(None);
        };

        let Some(mut job) = self.load(&mut conn, &id).await? else {
            warn!(job_id = %id, "Leased id has no job record, dropping");
            let _: i64 = conn.zrem(self.stage_key(stage, "active"), id.as_str()).await?;
            return Ok(None);
        };

        job.start(now);
        if !self.write_if_active(&mut conn, &job, None).await? {
            return Ok(None);
        }
        debug!(job_id = %id, attempt = job.attempts_made + 1, "Leased job");
        Ok(Some(job))
    }

    async fn update_progress(&self, lease: &Lease, percent: u8) -> QueueResult<bool> {
        let mut conn = self.connection().await?;
        let mut job = self.load_held(&mut conn, lease).await?;
        if !job.set_progress(percent) {
            return Ok(false);
        }
        if !self.write_if_active(&mut conn, &job, Some(lease)).await? {
            return Err(QueueError::LeaseLost(lease.job_id.clone()));
        }
        Ok(true)
    }

    async fn heartbeat(&self, lease: &Lease) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let job_id = &lease.job_id;
        let job = self.load_held(&mut conn, lease).await?;

        let refreshed: i32 = self
            .scripts
            .heartbeat
            .key(self.job_key(job_id))
            .key(self.stage_key(job.stage, "active"))
            .arg(job_id.as_str())
            .arg(Utc::now().timestamp_millis())
            .arg(lease.token.as_str())
            .invoke_async(&mut conn)
            .await?;
        if refreshed == 0 {
            return Err(QueueError::LeaseLost(job_id.clone()));
        }
        Ok(())
    }

    async fn complete_and_enqueue(
        &self,
        lease: &Lease,
        return_value: serde_json::Value,
        next: Option<(JobPayload, EnqueueOptions)>,
    ) -> QueueResult<Option<EnqueueOutcome>> {
        let mut conn = self.connection().await?;
        let now = Utc::now();
        let job_id = &lease.job_id;

        let mut job = self.load_held(&mut conn, lease).await?;
        job.complete(return_value, now);
        let json = serde_json::to_string(&job)?;

        let next_job = next.map(|(payload, opts)| {
            let stage = payload.stage();
            Job::new(payload, &opts, self.config.stage(stage).max_attempts)
        });
        // With no successor the next-job keys are unused; the script only
        // needs a well-formed key list.
        let (next_id, next_json, next_priority, next_stage) = match &next_job {
            Some(next) => (
                next.id.to_string(),
                serde_json::to_string(next)?,
                next.priority,
                next.stage,
            ),
            None => (String::new(), String::new(), 0, job.stage),
        };

        let result: i32 = self
            .scripts
            .complete
            .key(self.job_key(job_id))
            .key(self.stage_key(job.stage, "active"))
            .key(self.stage_key(job.stage, "completed"))
            .key(self.job_key(&JobId::from_string(next_id.clone())))
            .key(self.stage_key(next_stage, "waiting"))
            .key(self.stage_key(next_stage, "completed"))
            .key(self.stage_key(next_stage, "failed"))
            .key(self.priority_key())
            .key(self.seq_key())
            .arg(job_id.as_str())
            .arg(json)
            .arg(now.timestamp_millis())
            .arg(&next_id)
            .arg(next_json)
            .arg(next_priority)
            .arg(lease.token.as_str())
            .invoke_async(&mut conn)
            .await?;

        if result < 0 {
            return Err(QueueError::LeaseLost(job_id.clone()));
        }
        info!(job_id = %job_id, "Completed job");

        let outcome = next_job.map(|next| {
            if result == 1 {
                info!(job_id = %next.id, parent = %job_id, "Enqueued next stage");
                EnqueueOutcome::Enqueued(next.id)
            } else {
                EnqueueOutcome::Duplicate(next.id)
            }
        });

        self.prune(&mut conn, job.stage).await?;
        Ok(outcome)
    }

    async fn fail(&self, lease: &Lease, error: &str) -> QueueResult<FailOutcome> {
        let mut conn = self.connection().await?;
        let now = Utc::now();
        let job_id = &lease.job_id;

        let mut job = self.load_held(&mut conn, lease).await?;
        let policy = self.config.stage(job.stage);
        let outcome = apply_failure(&mut job, error, policy.base_delay, self.config.max_delay, now);

        if !self.release(&mut conn, &job, None, Some(lease)).await? {
            return Err(QueueError::LeaseLost(job_id.clone()));
        }

        match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                warn!(job_id = %job_id, attempt, delay_ms = delay.as_millis() as u64, error, "Job failed, retrying");
            }
            FailOutcome::DeadLettered { attempts } => {
                warn!(job_id = %job_id, attempts, error, "Job dead-lettered");
                self.prune(&mut conn, job.stage).await?;
            }
        }
        Ok(outcome)
    }

    async fn get_job(&self, job_id: &JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let Some(mut job) = self.load(&mut conn, job_id).await? else {
            return Ok(None);
        };

        // Heartbeats only touch the active zset.
        if job.state == JobState::Active {
            let score: Option<f64> = conn
                .zscore(self.stage_key(job.stage, "active"), job_id.as_str())
                .await?;
            if let Some(at) = score.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms as i64)) {
                job.heartbeat_at = Some(at);
            }
        }
        Ok(Some(job))
    }

    async fn reclaim_stale(
        &self,
        stage: Stage,
        older_than: Duration,
    ) -> QueueResult<Vec<(JobId, FailOutcome)>> {
        let mut conn = self.connection().await?;
        let now = Utc::now();
        let cutoff_ms = now.timestamp_millis() - older_than.as_millis() as i64;

        let stale: Vec<String> = conn
            .zrangebyscore(self.stage_key(stage, "active"), "-inf", cutoff_ms)
            .await?;

        let policy = self.config.stage(stage).clone();
        let mut reclaimed = Vec::new();
        for id in stale.into_iter().map(JobId::from_string) {
            let Some(mut job) = self.load(&mut conn, &id).await? else {
                continue;
            };
            let outcome = apply_failure(&mut job, LEASE_EXPIRED, policy.base_delay, self.config.max_delay, now);
            if self.release(&mut conn, &job, Some(cutoff_ms), None).await? {
                warn!(job_id = %id, ?outcome, "Reclaimed stale lease");
                reclaimed.push((id, outcome));
            }
        }
        Ok(reclaimed)
    }

    async fn counts(&self, stage: Stage) -> QueueResult<StageCounts> {
        let mut conn = self.connection().await?;
        let (waiting, active, delayed, completed, failed): (u64, u64, u64, u64, u64) = redis::pipe()
            .zcard(self.stage_key(stage, "waiting"))
            .zcard(self.stage_key(stage, "active"))
            .zcard(self.stage_key(stage, "delayed"))
            .zcard(self.stage_key(stage, "completed"))
            .zcard(self.stage_key(stage, "failed"))
            .query_async(&mut conn)
            .await?;

        Ok(StageCounts {
            waiting,
            active,
            delayed,
            completed,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpipe_models::{ProcessPayload, StrategyPayload, VideoId, AiAnalysis};

    fn test_store() -> RedisJobStore {
        dotenvy::dotenv().ok();
        let config = QueueConfig {
            key_prefix: format!("vpipe-test-{}", uuid_suffix()),
            ..QueueConfig::from_env()
        };
        RedisJobStore::new(config).unwrap()
    }

    fn uuid_suffix() -> String {
        format!("{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    fn process(video: &str) -> JobPayload {
        JobPayload::Process(ProcessPayload {
            video_id: VideoId::from_string(video),
            user_id: "user-1".into(),
            file_path: format!("/uploads/{}.mp4", video),
        })
    }

    #[test]
    fn test_key_layout() {
        let store = RedisJobStore::new(QueueConfig::default()).unwrap();
        assert_eq!(store.job_key(&JobId::from_string("process:v1")), "vpipe:job:process:v1");
        assert_eq!(store.stage_key(Stage::Analyze, "waiting"), "vpipe:analyze:waiting");
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_enqueue_lease_complete_roundtrip() {
        let store = test_store();
        store.ping().await.unwrap();

        let first = store.enqueue(process("v1"), EnqueueOptions::default()).await.unwrap();
        let dup = store.enqueue(process("v1"), EnqueueOptions::default()).await.unwrap();
        assert!(!first.is_duplicate());
        assert!(dup.is_duplicate());

        let job = store.lease(Stage::Process).await.unwrap().unwrap();
        assert!(store.lease(Stage::Process).await.unwrap().is_none());
        assert!(store.update_progress(&job.lease(), 50).await.unwrap());
        store.heartbeat(&job.lease()).await.unwrap();

        let next = JobPayload::Strategy(StrategyPayload {
            video_id: VideoId::from_string("v1"),
            user_id: "user-1".into(),
            analysis: AiAnalysis::default(),
        });
        let outcome = store
            .complete_and_enqueue(&job.lease(), serde_json::json!({"ok": true}), Some((next, EnqueueOptions::default())))
            .await
            .unwrap();
        assert_eq!(outcome, Some(EnqueueOutcome::Enqueued(JobId::from_string("strategy:v1"))));

        let status = store.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(store.counts(Stage::Strategy).await.unwrap().waiting, 1);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_fail_until_dead_lettered() {
        let config = QueueConfig {
            key_prefix: format!("vpipe-test-{}", uuid_suffix()),
            ..QueueConfig::from_env()
        }
        .with_stage(Stage::Process, crate::StageQueueConfig::new(2, Duration::from_millis(20)));
        let store = RedisJobStore::new(config).unwrap();

        store.enqueue(process("v2"), EnqueueOptions::default()).await.unwrap();
        let job = store.lease(Stage::Process).await.unwrap().unwrap();
        assert!(matches!(store.fail(&job.lease(), "boom").await.unwrap(), FailOutcome::Retrying { attempt: 1, .. }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let job = store.lease(Stage::Process).await.unwrap().unwrap();
        assert_eq!(store.fail(&job.lease(), "boom").await.unwrap(), FailOutcome::DeadLettered { attempts: 2 });
        assert_eq!(store.counts(Stage::Process).await.unwrap().failed, 1);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_reclaimed_holder_cannot_write() {
        let config = QueueConfig {
            key_prefix: format!("vpipe-test-{}", uuid_suffix()),
            ..QueueConfig::from_env()
        }
        .with_stage(Stage::Process, crate::StageQueueConfig::new(3, Duration::from_millis(20)));
        let store = RedisJobStore::new(config).unwrap();

        store.enqueue(process("v3"), EnqueueOptions::default()).await.unwrap();
        let stale = store.lease(Stage::Process).await.unwrap().unwrap().lease();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reclaimed = store.reclaim_stale(Stage::Process, Duration::from_millis(10)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let current = store.lease(Stage::Process).await.unwrap().unwrap();

        let err = store.complete(&stale, serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, QueueError::LeaseLost(_)));
        assert!(matches!(store.fail(&stale, "late").await.unwrap_err(), QueueError::LeaseLost(_)));
        assert!(matches!(store.heartbeat(&stale).await.unwrap_err(), QueueError::LeaseLost(_)));
        assert!(matches!(store.update_progress(&stale, 90).await.unwrap_err(), QueueError::LeaseLost(_)));
        assert_eq!(store.get_status(&current.id).await.unwrap().unwrap().state, JobState::Active);

        store.complete(&current.lease(), serde_json::Value::Null).await.unwrap();
        assert_eq!(store.get_status(&current.id).await.unwrap().unwrap().state, JobState::Completed);
    }
}
