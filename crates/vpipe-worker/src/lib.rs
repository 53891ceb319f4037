//! Video pipeline workers.
//!
//! This crate provides:
//! - The three stage handlers (process, analyze, strategy)
//! - The pipeline table and stage handoff
//! - Worker pools with bounded concurrency, heartbeats and stale-lease reclaim
//! - The AI call budget, Gemini vision client and response parser
//! - The `Pipeline` runtime used by the upload and status endpoints

pub mod analysis_parser;
pub mod config;
pub mod error;
pub mod gemini;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod runtime;
pub mod stages;
pub mod strategy_gen;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use logging::JobLogger;
pub use pool::WorkerPool;
pub use provider::{VisionProvider, VisionResponse};
pub use rate_limit::CallBudget;
pub use runtime::{Pipeline, PipelineDeps, VideoStatusView};
pub use stages::{JobContext, StageHandler, StageOutput};
