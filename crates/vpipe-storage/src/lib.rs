//! Persistence for video records and posting strategies.
//!
//! `VideoRepository` is the seam the workers write through. Two backends:
//! an in-memory map for tests and single-process runs, and Redis JSON
//! documents shared with the job store's server.

pub mod error;
pub mod memory;
pub mod redis_repo;
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use memory::InMemoryVideoRepository;
pub use redis_repo::RedisVideoRepository;
pub use repository::{VideoRepository, VideoUpdate};
