//! Durable per-stage job queues.
//!
//! This crate provides:
//! - The `JobStore` contract (enqueue, lease, progress, completion, retry)
//! - Exponential backoff and dead-lettering
//! - An in-memory store for tests and single-process runs
//! - A Redis-backed store shared by all worker processes

pub mod backoff;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use backoff::backoff_delay;
pub use config::{QueueConfig, RetentionPolicy, StageQueueConfig};
pub use error::{QueueError, QueueResult};
pub use memory::InMemoryJobStore;
pub use redis_store::RedisJobStore;
pub use store::{EnqueueOutcome, FailOutcome, JobStore, StageCounts};
