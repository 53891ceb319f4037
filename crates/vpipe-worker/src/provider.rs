//! Vision provider seam.

use async_trait::async_trait;
use vpipe_media::Frame;
use vpipe_models::TokenUsage;

use crate::error::WorkerResult;

/// Raw provider reply.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionResponse {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that produced the reply
    pub model: String,
}

/// A multimodal model that reads still frames plus a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// One request carrying every frame.
    async fn analyze(&self, frames: &[Frame], prompt: &str) -> WorkerResult<VisionResponse>;

    /// Estimated spend in USD for the given usage.
    fn estimate_cost(&self, usage: &TokenUsage) -> f64;
}

/// Structured analysis prompt sent with the key frames.
pub fn analysis_prompt(frame_count: usize, duration_secs: f64) -> String {
    format!(
        r#"You are a short-form video strategist. The {frame_count} images are key frames
sampled evenly from a {duration_secs:.0} second video, in order.

Return ONLY a single JSON object with this schema:
{{
  "viral_score": 0.0,
  "summary": "One or two sentences describing the video",
  "strengths": ["..."],
  "weaknesses": ["..."],
  "hooks": ["Opening lines that would stop the scroll"],
  "emotional_tones": ["e.g. inspiring, funny, calm"],
  "recommendations": ["..."],
  "target_audience": "Who this video is for",
  "content_type": "tutorial | vlog | comedy | educational | review | fitness | food | gaming | music | travel | entertainment"
}}

Rules:
- viral_score is a number from 0 to 10.
- Keep every list to at most 5 short items.
- Return ONLY the JSON object and nothing else.
"#
    )
}
