//! Shared data models for the vpipe video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Pipeline stages, jobs and stage payloads
//! - The shared video status record
//! - AI analysis results and derived posting strategies
//! - Progress aggregation across a video's job chain

pub mod analysis;
pub mod error;
pub mod job;
pub mod progress;
pub mod strategy;
pub mod video;

// Re-export common types
pub use analysis::{AiAnalysis, AnalysisOutcome, ContentType, TokenUsage};
pub use error::{ModelError, ModelResult};
pub use job::{
    AnalyzePayload, EnqueueOptions, Job, JobId, JobPayload, JobState, JobStatus, Lease,
    ProcessPayload,
    Stage, StrategyPayload,
};
pub use progress::{PipelineProgress, ProgressLabel};
pub use strategy::{Platform, PostingWindow, Strategy, StrategyId};
pub use video::{Video, VideoId, VideoMetadata, VideoStatus};
