//! Frame sampling policies.

use serde::{Deserialize, Serialize};

/// Upper bound on frames sampled by the processing stage.
pub const MAX_PROCESSING_FRAMES: u32 = 5;

/// Each processing frame represents one window of this many seconds.
pub const FRAME_WINDOW_SECS: f64 = 10.0;

/// A decoded still, JPEG-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(skip)]
    pub image: Vec<u8>,
    pub timestamp_secs: f64,
}

impl Frame {
    pub fn new(image: Vec<u8>, timestamp_secs: f64) -> Self {
        Self {
            image,
            timestamp_secs,
        }
    }
}

/// Frames the processing stage samples: one per full 10 s window, at most 5.
///
/// A clip shorter than one window gets no frames and extraction is skipped.
pub fn processing_frame_budget(duration_secs: f64) -> u32 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0;
    }
    let windows = (duration_secs / FRAME_WINDOW_SECS).floor() as u32;
    windows.min(MAX_PROCESSING_FRAMES)
}

/// Midpoints of the first `count` windows.
pub fn window_timestamps(count: u32) -> Vec<f64> {
    (0..count)
        .map(|i| f64::from(i) * FRAME_WINDOW_SECS + FRAME_WINDOW_SECS / 2.0)
        .collect()
}

/// `count` timestamps evenly spaced strictly inside `(0, duration)`.
pub fn even_timestamps(duration_secs: f64, count: u32) -> Vec<f64> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Vec::new();
    }
    let step = duration_secs / f64::from(count + 1);
    (1..=count).map(|i| f64::from(i) * step).collect()
}
