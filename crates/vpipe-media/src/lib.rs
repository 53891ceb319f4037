//! FFmpeg CLI wrapper for the processing and analysis stages.
//!
//! This crate provides:
//! - Video probing via ffprobe
//! - Frame sampling policies
//! - Single-frame JPEG extraction via ffmpeg
//! - The `MediaToolkit` seam used by the workers

pub mod command;
pub mod error;
pub mod frames;
pub mod probe;
pub mod toolkit;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use frames::{even_timestamps, processing_frame_budget, window_timestamps, Frame, FRAME_WINDOW_SECS, MAX_PROCESSING_FRAMES};
pub use probe::{probe_video, VideoInfo};
pub use toolkit::{FfmpegMedia, MediaToolkit};
