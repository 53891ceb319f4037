//! Turns a raw provider reply into an `AiAnalysis`.
//!
//! Structured JSON is tried first, tolerating code fences and surrounding
//! prose. When no JSON object can be read the reply is scanned for headed
//! sections and a score. Either way every field ends up populated; fields
//! that had to be recovered or defaulted are reported as warnings.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use vpipe_models::{AiAnalysis, AnalysisOutcome, ContentType};

const SUMMARY_MAX_CHARS: usize = 280;
const LIST_MAX_ITEMS: usize = 10;

const DEFAULT_SUMMARY: &str = "Analysis unavailable";
const DEFAULT_STRENGTH: &str = "Clear visual content";
const DEFAULT_WEAKNESS: &str = "No specific weaknesses identified";
const DEFAULT_HOOK: &str = "Watch until the end";
const DEFAULT_TONE: &str = "neutral";
const DEFAULT_RECOMMENDATION: &str = "Post consistently and test different hooks";
const DEFAULT_AUDIENCE: &str = "General audience";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Section {
    Score,
    Summary,
    Strengths,
    Weaknesses,
    Hooks,
    Tones,
    Recommendations,
    Audience,
    ContentType,
}

impl Section {
    fn from_heading(word: &str) -> Option<Self> {
        let word = word.to_lowercase();
        let section = match word.trim_end_matches('s') {
            "viral score" | "score" => Section::Score,
            "summary" => Section::Summary,
            "strength" => Section::Strengths,
            "weaknesse" | "weakness" => Section::Weaknesses,
            "hook" => Section::Hooks,
            "emotional tone" | "tone" => Section::Tones,
            "recommendation" => Section::Recommendations,
            "target audience" | "audience" => Section::Audience,
            "content type" => Section::ContentType,
            _ => return None,
        };
        Some(section)
    }

    fn name(&self) -> &'static str {
        match self {
            Section::Score => "viral_score",
            Section::Summary => "summary",
            Section::Strengths => "strengths",
            Section::Weaknesses => "weaknesses",
            Section::Hooks => "hooks",
            Section::Tones => "emotional_tones",
            Section::Recommendations => "recommendations",
            Section::Audience => "target_audience",
            Section::ContentType => "content_type",
        }
    }
}

/// Shape of the structured reply. Every field is optional and loosely typed;
/// providers mix camelCase, strings for lists and "7/10" scores.
#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default, alias = "viralScore", alias = "score")]
    viral_score: Option<Value>,
    #[serde(default)]
    summary: Option<Value>,
    #[serde(default)]
    strengths: Option<Value>,
    #[serde(default)]
    weaknesses: Option<Value>,
    #[serde(default)]
    hooks: Option<Value>,
    #[serde(default, alias = "emotionalTones", alias = "tones", alias = "emotional_tone")]
    emotional_tones: Option<Value>,
    #[serde(default)]
    recommendations: Option<Value>,
    #[serde(default, alias = "targetAudience", alias = "audience")]
    target_audience: Option<Value>,
    #[serde(default, alias = "contentType")]
    content_type: Option<Value>,
}

/// Fields recovered from a reply, before defaults.
#[derive(Debug, Default)]
struct Recovered {
    score: Option<f32>,
    summary: Option<String>,
    lists: HashMap<Section, Vec<String>>,
    audience: Option<String>,
    content_type: Option<String>,
}

/// Parse a provider reply. Never fails.
pub fn parse_analysis(raw: &str) -> AnalysisOutcome {
    let mut warnings = Vec::new();

    let recovered = match extract_json(raw).and_then(|json| serde_json::from_str::<RawAnalysis>(json).ok()) {
        Some(structured) => from_structured(structured),
        None => {
            warnings.push("structured output unavailable, recovered from text".to_string());
            from_text(raw)
        }
    };

    let analysis = finish(recovered, raw, &mut warnings);
    if warnings.is_empty() {
        AnalysisOutcome::Parsed(analysis)
    } else {
        AnalysisOutcome::PartiallyParsed { analysis, warnings }
    }
}

/// Locate the JSON object inside a reply.
fn extract_json(raw: &str) -> Option<&str> {
    let text = raw.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn from_structured(raw: RawAnalysis) -> Recovered {
    let mut recovered = Recovered {
        score: raw.viral_score.as_ref().and_then(score_from_value),
        summary: raw.summary.as_ref().and_then(text_from_value),
        audience: raw.target_audience.as_ref().and_then(text_from_value),
        content_type: raw.content_type.as_ref().and_then(text_from_value),
        ..Recovered::default()
    };

    let lists = [
        (Section::Strengths, raw.strengths),
        (Section::Weaknesses, raw.weaknesses),
        (Section::Hooks, raw.hooks),
        (Section::Tones, raw.emotional_tones),
        (Section::Recommendations, raw.recommendations),
    ];
    for (section, value) in lists {
        if let Some(items) = value.as_ref().map(list_from_value).filter(|items| !items.is_empty()) {
            recovered.lists.insert(section, items);
        }
    }
    recovered
}

fn score_from_value(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v as f32),
        Value::String(s) => score_from_text(s),
        _ => None,
    }
}

fn text_from_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn list_from_value(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Object(map) => map.values().find_map(|v| v.as_str()).map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::String(s) => split_inline(s),
        _ => Vec::new(),
    };
    clean_list(items)
}

/// Split "a, b; c" or a multi-line bullet string into items.
fn split_inline(text: &str) -> Vec<String> {
    if text.contains('\n') {
        text.lines().map(|line| strip_bullet(line).to_string()).collect()
    } else {
        text.split([',', ';']).map(|s| s.to_string()).collect()
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().trim_matches('"').trim().to_string())
        .filter(|item| !item.is_empty())
        .take(LIST_MAX_ITEMS)
        .collect()
}

fn heading_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(#+\s*)?\**\s*(viral score|score|summary|strengths?|weaknesse?s?|hooks?|emotional tones?|tones?|recommendations?|target audience|audience|content type)\s*\**\s*(:)?\s*\**\s*(.*)$",
        )
        .ok()
    })
    .as_ref()
}

fn bullet_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.*)$").ok())
        .as_ref()
}

fn score_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:/\s*(\d+))?").ok())
        .as_ref()
}

fn labelled_score_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)score\D{0,20}?(\d+(?:\.\d+)?)\s*(?:/\s*(\d+))?").ok()
    })
    .as_ref()
}

/// "7", "7.5/10", "72 / 100" to a 0-10 value (unclamped).
fn score_from_text(text: &str) -> Option<f32> {
    let caps = score_pattern()?.captures(text)?;
    scaled_score(&caps)
}

fn scaled_score(caps: &regex::Captures<'_>) -> Option<f32> {
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2).and_then(|d| d.as_str().parse::<f32>().ok()) {
        Some(denominator) if denominator > 0.0 => Some(value * 10.0 / denominator),
        _ => Some(value),
    }
}

fn strip_bullet(line: &str) -> &str {
    bullet_pattern()
        .and_then(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(line)
        .trim()
}

/// Scan headed sections out of free text.
fn from_text(raw: &str) -> Recovered {
    let mut recovered = Recovered::default();
    let mut current: Option<Section> = None;
    let mut summary_lines: Vec<String> = Vec::new();
    let mut first_prose: Option<String> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((section, rest)) = parse_heading(trimmed) {
            current = Some(section);
            if !rest.is_empty() {
                take_value(&mut recovered, &mut summary_lines, section, rest, true);
            }
            continue;
        }

        let is_bullet = bullet_pattern().is_some_and(|re| re.is_match(trimmed));
        let text = strip_bullet(trimmed).trim_matches('*').trim();
        if text.is_empty() {
            continue;
        }
        match current {
            Some(section) => take_value(&mut recovered, &mut summary_lines, section, text, false),
            None if !is_bullet && first_prose.is_none() => first_prose = Some(text.to_string()),
            None => {}
        }
    }

    if !summary_lines.is_empty() {
        recovered.summary = Some(summary_lines.join(" "));
    }
    if recovered.summary.is_none() {
        recovered.summary = first_prose;
    }
    if recovered.score.is_none() {
        recovered.score = labelled_score_pattern()
            .and_then(|re| re.captures(raw))
            .and_then(|caps| scaled_score(&caps));
    }
    recovered
}

/// A heading needs a colon, a markdown `#`, or nothing after the keyword.
fn parse_heading(line: &str) -> Option<(Section, &str)> {
    let caps = heading_pattern()?.captures(line)?;
    let section = Section::from_heading(caps.get(2)?.as_str())?;
    let rest = caps.get(4).map(|m| m.as_str().trim()).unwrap_or("");
    let rest = rest.trim_matches('*').trim();

    let marked = caps.get(1).is_some() || caps.get(3).is_some();
    (marked || rest.is_empty()).then_some((section, rest))
}

fn take_value(
    recovered: &mut Recovered,
    summary_lines: &mut Vec<String>,
    section: Section,
    text: &str,
    inline: bool,
) {
    match section {
        Section::Score => {
            if recovered.score.is_none() {
                recovered.score = score_from_text(text);
            }
        }
        Section::Summary => summary_lines.push(text.to_string()),
        Section::Audience => {
            recovered.audience.get_or_insert_with(|| text.to_string());
        }
        Section::ContentType => {
            recovered.content_type.get_or_insert_with(|| text.to_string());
        }
        list => {
            let items = if inline {
                split_inline(text)
            } else {
                vec![text.to_string()]
            };
            let entry = recovered.lists.entry(list).or_default();
            entry.extend(items);
            let cleaned = clean_list(std::mem::take(entry));
            *entry = cleaned;
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Apply defaults and assemble the analysis.
fn finish(mut recovered: Recovered, raw: &str, warnings: &mut Vec<String>) -> AiAnalysis {
    let mut defaulted = |field: &str| warnings.push(format!("{} missing, using default", field));

    let viral_score = match recovered.score {
        Some(score) if score.is_finite() => AiAnalysis::clamp_score(score),
        _ => {
            defaulted(Section::Score.name());
            AiAnalysis::default().viral_score
        }
    };

    let summary = match recovered.summary.take() {
        Some(summary) => truncate_chars(&summary, SUMMARY_MAX_CHARS),
        None => {
            defaulted(Section::Summary.name());
            let fallback = raw.trim();
            if fallback.is_empty() || fallback.starts_with('{') {
                DEFAULT_SUMMARY.to_string()
            } else {
                truncate_chars(fallback, SUMMARY_MAX_CHARS)
            }
        }
    };

    let mut list = |section: Section, default: &str| -> Vec<String> {
        match recovered.lists.remove(&section) {
            Some(items) if !items.is_empty() => items,
            _ => {
                defaulted(section.name());
                vec![default.to_string()]
            }
        }
    };
    let strengths = list(Section::Strengths, DEFAULT_STRENGTH);
    let weaknesses = list(Section::Weaknesses, DEFAULT_WEAKNESS);
    let hooks = list(Section::Hooks, DEFAULT_HOOK);
    let emotional_tones = list(Section::Tones, DEFAULT_TONE)
        .into_iter()
        .map(|tone| tone.to_lowercase())
        .collect();
    let recommendations = list(Section::Recommendations, DEFAULT_RECOMMENDATION);

    let target_audience = recovered.audience.take().unwrap_or_else(|| {
        defaulted(Section::Audience.name());
        DEFAULT_AUDIENCE.to_string()
    });

    let content_type = match recovered.content_type.take() {
        Some(label) => ContentType::from_label(&label),
        None => {
            defaulted(Section::ContentType.name());
            ContentType::from_label(&summary)
        }
    };

    AiAnalysis {
        viral_score,
        summary,
        strengths,
        weaknesses,
        hooks,
        emotional_tones,
        recommendations,
        target_audience,
        content_type,
        ..AiAnalysis::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_JSON: &str = r#"{
        "viral_score": 7.5,
        "summary": "A quick pasta recipe filmed in a home kitchen.",
        "strengths": ["Fast pacing", "Good lighting"],
        "weaknesses": ["No captions"],
        "hooks": ["You have been cooking pasta wrong"],
        "emotional_tones": ["Upbeat", "Cozy"],
        "recommendations": ["Add on-screen text"],
        "target_audience": "Home cooks aged 20-35",
        "content_type": "food"
    }"#;

    #[test]
    fn test_well_formed_json_is_fully_parsed() {
        let outcome = parse_analysis(FULL_JSON);
        assert!(!outcome.is_partial(), "warnings: {:?}", outcome.warnings());

        let analysis = outcome.analysis();
        assert_eq!(analysis.viral_score, 7.5);
        assert_eq!(analysis.content_type, ContentType::Food);
        assert_eq!(analysis.emotional_tones, vec!["upbeat", "cozy"]);
        assert_eq!(analysis.target_audience, "Home cooks aged 20-35");
    }

    #[test]
    fn test_code_fence_and_prose_are_tolerated() {
        let raw = format!("Here is my analysis:\n```json\n{}\n```\nHope this helps!", FULL_JSON);
        let outcome = parse_analysis(&raw);
        assert!(!outcome.is_partial());
        assert_eq!(outcome.analysis().strengths.len(), 2);

        let raw = format!("Sure. {} Let me know.", FULL_JSON);
        assert!(!parse_analysis(&raw).is_partial());
    }

    #[test]
    fn test_loose_json_types_are_coerced() {
        let raw = r#"{"viralScore": "8/10", "summary": "ok", "strengths": "Hook, Music; Editing",
            "weaknesses": ["slow start"], "hooks": ["wait for it"], "tones": ["funny"],
            "recommendations": ["shorter intro"], "targetAudience": "teens", "contentType": "Comedy skit"}"#;
        let outcome = parse_analysis(raw);
        let analysis = outcome.analysis();

        assert!(!outcome.is_partial(), "warnings: {:?}", outcome.warnings());
        assert_eq!(analysis.viral_score, 8.0);
        assert_eq!(analysis.strengths, vec!["Hook", "Music", "Editing"]);
        assert_eq!(analysis.content_type, ContentType::Comedy);
    }

    #[test]
    fn test_out_of_range_score_is_clamped() {
        let outcome = parse_analysis(r#"{"viral_score": 42}"#);
        assert_eq!(outcome.analysis().viral_score, 10.0);

        let outcome = parse_analysis(r#"{"viral_score": "72/100"}"#);
        assert!((outcome.analysis().viral_score - 7.2).abs() < 1e-4);
    }

    #[test]
    fn test_missing_json_fields_get_defaults_with_warnings() {
        let outcome = parse_analysis(r#"{"viral_score": 6, "summary": "A dog on a skateboard."}"#);
        assert!(outcome.is_partial());

        let analysis = outcome.analysis();
        assert_eq!(analysis.viral_score, 6.0);
        assert_eq!(analysis.strengths, vec![DEFAULT_STRENGTH]);
        assert_eq!(analysis.hooks, vec![DEFAULT_HOOK]);
        assert_eq!(analysis.target_audience, DEFAULT_AUDIENCE);
        assert!(outcome.warnings().iter().any(|w| w.starts_with("strengths")));
    }

    #[test]
    fn test_markdown_prose_falls_back_to_sections() {
        let raw = "\
**Viral Score:** 8/10

## Summary
A travel vlog walking through Lisbon at sunset.

**Strengths:**
- Beautiful golden hour shots
- Smooth transitions

Weaknesses:
1. Music is too loud

Hooks: Wait for the last shot, You won't believe this view
Emotional tones: Calm, Nostalgic
Target audience: Young travellers
";
        let outcome = parse_analysis(raw);
        assert!(outcome.is_partial());

        let analysis = outcome.analysis();
        assert_eq!(analysis.viral_score, 8.0);
        assert_eq!(analysis.summary, "A travel vlog walking through Lisbon at sunset.");
        assert_eq!(
            analysis.strengths,
            vec!["Beautiful golden hour shots", "Smooth transitions"]
        );
        assert_eq!(analysis.weaknesses, vec!["Music is too loud"]);
        assert_eq!(analysis.hooks, vec!["Wait for the last shot", "You won't believe this view"]);
        assert_eq!(analysis.emotional_tones, vec!["calm", "nostalgic"]);
        assert_eq!(analysis.target_audience, "Young travellers");
        assert_eq!(analysis.recommendations, vec![DEFAULT_RECOMMENDATION]);
        assert_eq!(analysis.content_type, ContentType::Vlog);
    }

    #[test]
    fn test_unstructured_text_is_fully_populated() {
        let outcome = parse_analysis("I could not really tell what happens in this video.");
        let analysis = outcome.analysis();

        assert!(outcome.is_partial());
        assert_eq!(analysis.viral_score, vpipe_models::analysis::DEFAULT_VIRAL_SCORE);
        assert_eq!(analysis.summary, "I could not really tell what happens in this video.");
        assert!(!analysis.strengths.is_empty());
        assert!(!analysis.weaknesses.is_empty());
        assert!(!analysis.hooks.is_empty());
        assert!(!analysis.emotional_tones.is_empty());
        assert!(!analysis.recommendations.is_empty());
        assert!(!analysis.target_audience.is_empty());
    }

    #[test]
    fn test_empty_reply_uses_placeholder_summary() {
        let analysis = parse_analysis("   ").into_analysis();
        assert_eq!(analysis.summary, DEFAULT_SUMMARY);
        assert_eq!(analysis.viral_score, 5.0);
    }

    #[test]
    fn test_long_summary_is_truncated() {
        let long = "word ".repeat(200);
        let raw = format!(r#"{{"summary": "{}"}}"#, long);
        let analysis = parse_analysis(&raw).into_analysis();
        assert!(analysis.summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(analysis.summary.ends_with("..."));
    }

    #[test]
    fn test_bullets_are_not_mistaken_for_headings() {
        let raw = "Strengths:\n- Hooks are strong in the intro\n- Good color";
        let analysis = parse_analysis(raw).into_analysis();
        assert_eq!(
            analysis.strengths,
            vec!["Hooks are strong in the intro", "Good color"]
        );
        assert_eq!(analysis.hooks, vec![DEFAULT_HOOK]);
    }
}
