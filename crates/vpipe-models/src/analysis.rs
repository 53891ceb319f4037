//! AI analysis results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Neutral viral score used when the provider gives none.
pub const DEFAULT_VIRAL_SCORE: f32 = 5.0;

/// Content classification used to pick hook and hashtag templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Tutorial,
    Vlog,
    Comedy,
    Educational,
    Review,
    Fitness,
    Food,
    Gaming,
    Music,
    Travel,
    #[default]
    Entertainment,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Tutorial => "tutorial",
            ContentType::Vlog => "vlog",
            ContentType::Comedy => "comedy",
            ContentType::Educational => "educational",
            ContentType::Review => "review",
            ContentType::Fitness => "fitness",
            ContentType::Food => "food",
            ContentType::Gaming => "gaming",
            ContentType::Music => "music",
            ContentType::Travel => "travel",
            ContentType::Entertainment => "entertainment",
        }
    }

    /// Classify a free-text label from the provider.
    ///
    /// Matching is keyword based so "Cooking tutorial" and "how-to" both land
    /// on a sensible bucket. Unknown labels fall back to `Entertainment`.
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| label.contains(w));

        if has(&["tutorial", "how-to", "how to", "diy", "guide"]) {
            ContentType::Tutorial
        } else if has(&["vlog", "day in the life", "lifestyle", "daily"]) {
            ContentType::Vlog
        } else if has(&["comedy", "funny", "humor", "humour", "prank", "skit"]) {
            ContentType::Comedy
        } else if has(&["educat", "explainer", "science", "history", "learn"]) {
            ContentType::Educational
        } else if has(&["review", "unboxing", "comparison"]) {
            ContentType::Review
        } else if has(&["fitness", "workout", "gym", "exercise"]) {
            ContentType::Fitness
        } else if has(&["food", "cooking", "recipe", "kitchen"]) {
            ContentType::Food
        } else if has(&["gaming", "gameplay", "game", "esports"]) {
            ContentType::Gaming
        } else if has(&["music", "song", "dance", "cover"]) {
            ContentType::Music
        } else if has(&["travel", "trip", "destination"]) {
            ContentType::Travel
        } else {
            ContentType::Entertainment
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider token accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Structured analysis persisted on the video record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AiAnalysis {
    /// 0-10 engagement potential
    pub viral_score: f32,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub hooks: Vec<String>,
    pub emotional_tones: Vec<String>,
    pub recommendations: Vec<String>,
    pub target_audience: String,
    pub content_type: ContentType,
    /// Estimated provider cost in USD
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub token_usage: TokenUsage,
    /// Model that produced the analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for AiAnalysis {
    fn default() -> Self {
        Self {
            viral_score: DEFAULT_VIRAL_SCORE,
            summary: String::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            hooks: Vec::new(),
            emotional_tones: Vec::new(),
            recommendations: Vec::new(),
            target_audience: String::new(),
            content_type: ContentType::default(),
            cost_usd: 0.0,
            token_usage: TokenUsage::default(),
            model: None,
        }
    }
}

impl AiAnalysis {
    /// Clamp the score into 0-10, mapping NaN to the neutral default.
    pub fn clamp_score(score: f32) -> f32 {
        if score.is_nan() {
            DEFAULT_VIRAL_SCORE
        } else {
            score.clamp(0.0, 10.0)
        }
    }
}

/// Result of parsing a provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Every field came from well-formed structured output
    Parsed(AiAnalysis),
    /// Some fields were recovered from loose text or defaulted
    PartiallyParsed {
        analysis: AiAnalysis,
        warnings: Vec<String>,
    },
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> &AiAnalysis {
        match self {
            AnalysisOutcome::Parsed(a) => a,
            AnalysisOutcome::PartiallyParsed { analysis, .. } => analysis,
        }
    }

    pub fn into_analysis(self) -> AiAnalysis {
        match self {
            AnalysisOutcome::Parsed(a) => a,
            AnalysisOutcome::PartiallyParsed { analysis, .. } => analysis,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            AnalysisOutcome::Parsed(_) => &[],
            AnalysisOutcome::PartiallyParsed { warnings, .. } => warnings,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, AnalysisOutcome::PartiallyParsed { .. })
    }
}
