//! Posting strategy derived from an analysis.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::video::VideoId;

/// Unique identifier for a strategy record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct StrategyId(pub String);

impl StrategyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Publishing platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
    Facebook,
    Twitter,
    Linkedin,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Youtube,
        Platform::Facebook,
        Platform::Twitter,
        Platform::Linkedin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Twitter => "twitter",
            Platform::Linkedin => "linkedin",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recommended posting slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PostingWindow {
    /// Day label, e.g. "tuesday" or "weekdays"
    pub day: String,
    /// Local time, "HH:MM"
    pub time: String,
}

impl PostingWindow {
    pub fn new(day: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            time: time.into(),
        }
    }
}

/// Strategy record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Strategy {
    pub id: StrategyId,
    pub video_id: VideoId,
    pub user_id: String,
    pub hooks: Vec<String>,
    pub captions: Vec<String>,
    /// Alternative hashtag sets
    pub hashtags: Vec<Vec<String>>,
    pub best_posting_times: BTreeMap<Platform, Vec<PostingWindow>>,
    pub target_audience: String,
    pub content_pillars: Vec<String>,
    /// Copied from the analysis
    pub viral_score: f32,
    pub created_at: DateTime<Utc>,
}
