//! Posting strategy derivation.
//!
//! Pure functions of an `AiAnalysis`: hooks, captions, hashtag sets, posting
//! windows and content pillars.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use vpipe_models::{AiAnalysis, ContentType, Platform, PostingWindow, Strategy, StrategyId, VideoId};

pub const MAX_HOOKS: usize = 10;
pub const MAX_CAPTIONS: usize = 5;
pub const HASHTAG_SETS: usize = 3;
pub const HASHTAGS_PER_SET: usize = 10;
const MAX_PILLARS: usize = 5;

/// Reach tags. Each set draws a disjoint slice of these, which keeps the
/// sets pairwise distinct.
const BASE_TAGS: [&str; 9] = [
    "fyp",
    "viral",
    "trending",
    "foryou",
    "explore",
    "viralvideo",
    "foryoupage",
    "trendingnow",
    "reels",
];
const BASE_PER_SET: usize = 3;

const FILLER_TAGS: [&str; 12] = [
    "shortvideo",
    "contentcreator",
    "videooftheday",
    "mustwatch",
    "watchthis",
    "dailycontent",
    "creator",
    "socialmedia",
    "newpost",
    "shorts",
    "digitalcreator",
    "instadaily",
];

fn hook_templates(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Tutorial => &[
            "Learn this simple trick!",
            "Here's the trick nobody tells you",
            "Do this before you try anything else",
            "Save this for later, you'll need it",
            "Most people get this step wrong",
        ],
        ContentType::Vlog => &[
            "Day in the life of...",
            "Come spend the day with me",
            "You won't believe how this day ended",
            "Real life, no filter",
        ],
        ContentType::Comedy => &[
            "Wait for it...",
            "Tell me this hasn't happened to you",
            "I can't believe this actually happened",
        ],
        ContentType::Educational => &[
            "Did you know this?",
            "This will change how you see it",
            "The science behind it is wild",
        ],
        ContentType::Review => &[
            "Is it actually worth it?",
            "Honest review, no sponsorship",
            "Watch this before you buy",
        ],
        ContentType::Fitness => &[
            "Try this for 30 days",
            "The move that changed my training",
            "No gym needed for this one",
        ],
        ContentType::Food => &[
            "You've been making this wrong",
            "Ready in under 15 minutes",
            "The secret ingredient is...",
        ],
        ContentType::Gaming => &[
            "This play was insane",
            "Nobody saw this coming",
            "Try this strategy next match",
        ],
        ContentType::Music => &[
            "Turn your sound on",
            "Wait for the drop",
            "This one hits different",
        ],
        ContentType::Travel => &[
            "Add this place to your list",
            "Hidden gem most tourists miss",
            "Would you go here?",
        ],
        ContentType::Entertainment => &[
            "You need to see this",
            "Watch until the end",
            "This is why I love the internet",
        ],
    }
}

fn content_tags(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Tutorial => &[
            "tutorial", "howto", "diy", "tips", "lifehacks", "learnontiktok", "stepbystep",
            "guide", "protips", "tipsandtricks",
        ],
        ContentType::Vlog => &[
            "vlog", "dayinmylife", "lifestyle", "dailyvlog", "vlogger", "routine", "reallife",
            "behindthescenes", "storytime", "minivlog",
        ],
        ContentType::Comedy => &[
            "comedy", "funny", "humor", "lol", "memes", "skit", "relatable", "funnyvideos",
            "jokes", "laugh",
        ],
        ContentType::Educational => &[
            "education", "learn", "didyouknow", "facts", "science", "knowledge", "edutok",
            "learning", "history", "explained",
        ],
        ContentType::Review => &[
            "review", "honestreview", "unboxing", "productreview", "worthit", "tested",
            "comparison", "recommendations", "musthave", "firstimpressions",
        ],
        ContentType::Fitness => &[
            "fitness", "workout", "gym", "fitnessmotivation", "homeworkout", "training",
            "health", "fitfam", "exercise", "strength",
        ],
        ContentType::Food => &[
            "food", "recipe", "cooking", "foodie", "easyrecipe", "homecooking", "yummy",
            "foodtok", "delicious", "kitchen",
        ],
        ContentType::Gaming => &[
            "gaming", "gamer", "gameplay", "videogames", "twitch", "gamingclips", "esports",
            "pcgaming", "gamingcommunity", "streamer",
        ],
        ContentType::Music => &[
            "music", "newmusic", "song", "musician", "cover", "singing", "producer", "dance",
            "musicvideo", "beats",
        ],
        ContentType::Travel => &[
            "travel", "wanderlust", "traveltok", "explore", "adventure", "travelgram",
            "bucketlist", "vacation", "traveltips", "hiddengems",
        ],
        ContentType::Entertainment => &[
            "entertainment", "fun", "wow", "amazing", "mustsee", "omg", "epic", "crazy",
            "unbelievable", "satisfying",
        ],
    }
}

fn pillar_templates(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::Tutorial => &["Step-by-step guides", "Quick tips", "Common mistakes"],
        ContentType::Vlog => &["Day in the life", "Behind the scenes", "Personal stories"],
        ContentType::Comedy => &["Relatable skits", "Reactions", "Running jokes"],
        ContentType::Educational => &["Explainers", "Myth busting", "Fun facts"],
        ContentType::Review => &["Honest reviews", "Comparisons", "First impressions"],
        ContentType::Fitness => &["Workouts", "Progress updates", "Form tips"],
        ContentType::Food => &["Recipes", "Cooking tips", "Taste tests"],
        ContentType::Gaming => &["Highlights", "Strategy tips", "Challenges"],
        ContentType::Music => &["Performances", "Covers", "Behind the music"],
        ContentType::Travel => &["Destinations", "Travel tips", "Hidden gems"],
        ContentType::Entertainment => &["Highlights", "Reactions", "Trends"],
    }
}

fn call_to_action(tone: &str) -> &'static str {
    let tone = tone.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| tone.contains(w));

    if has(&["funny", "humor", "humour", "playful", "silly"]) {
        "Tag a friend who needs a laugh!"
    } else if has(&["inspir", "motivat", "uplift", "empower"]) {
        "Save this for when you need a push."
    } else if has(&["calm", "relax", "peace", "cozy", "nostalg"]) {
        "Slow down and watch till the end."
    } else if has(&["excit", "energ", "hype", "upbeat", "thrill"]) {
        "Share this with someone who needs the energy!"
    } else if has(&["emotional", "touching", "heartfelt", "sad"]) {
        "Send this to someone you care about."
    } else if has(&["curious", "informative", "educational", "surpris"]) {
        "Follow for more things you didn't know."
    } else {
        "Follow for more like this!"
    }
}

/// Normalize a word into a `#tag`. Tags without letters are dropped.
fn hashtag(word: &str) -> Option<String> {
    let tag: String = word
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect();
    tag.chars()
        .any(|c| c.is_alphabetic())
        .then(|| format!("#{}", tag))
}

fn dedup_case_insensitive(items: impl IntoIterator<Item = String>, cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .take(cap)
        .collect()
}

/// Provider hooks first, then content-type templates.
pub fn generate_hooks(analysis: &AiAnalysis) -> Vec<String> {
    let templates = hook_templates(analysis.content_type).iter().map(|t| t.to_string());
    dedup_case_insensitive(analysis.hooks.iter().cloned().chain(templates), MAX_HOOKS)
}

/// The summary, then one call-to-action variant per emotional tone.
pub fn generate_captions(analysis: &AiAnalysis) -> Vec<String> {
    let summary = analysis.summary.trim();
    let variants = analysis
        .emotional_tones
        .iter()
        .map(|tone| format!("{} {}", summary, call_to_action(tone)));

    dedup_case_insensitive(std::iter::once(summary.to_string()).chain(variants), MAX_CAPTIONS)
}

const STOPWORDS: [&str; 12] = [
    "the", "and", "for", "with", "who", "are", "that", "this", "from", "into", "aged", "age",
];

fn audience_tags(target_audience: &str) -> Vec<String> {
    let words: Vec<String> = target_audience
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect();

    let mut tags = Vec::new();
    if words.len() >= 2 {
        tags.extend(hashtag(&format!("{}{}", words[0], words[1])));
    }
    tags.extend(words.iter().filter_map(|w| hashtag(w)));
    if let Some(first) = words.first() {
        tags.extend(hashtag(&format!("{}community", first)));
    }
    tags
}

fn tone_tags(tones: &[String]) -> Vec<String> {
    tones
        .iter()
        .flat_map(|tone| [hashtag(tone), hashtag(&format!("{}vibes", tone))])
        .flatten()
        .collect()
}

struct TagSet {
    tags: Vec<String>,
    seen: HashSet<String>,
}

impl TagSet {
    fn new() -> Self {
        Self {
            tags: Vec::with_capacity(HASHTAGS_PER_SET),
            seen: HashSet::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.tags.len() >= HASHTAGS_PER_SET
    }

    fn push(&mut self, tag: &str) {
        if !self.is_full() && self.seen.insert(tag.to_string()) {
            self.tags.push(tag.to_string());
        }
    }

    /// Take up to `limit` tags from `pool`, in order.
    fn take(&mut self, pool: &[String], limit: usize) {
        let target = (self.tags.len() + limit).min(HASHTAGS_PER_SET);
        for tag in pool {
            if self.tags.len() >= target {
                break;
            }
            self.push(tag);
        }
    }
}

/// Three sets of ten tags: broad reach, niche, and mixed.
///
/// Each set owns a disjoint slice of the reach tags and no other pool may
/// contain a reach tag, so no two sets can be equal.
pub fn generate_hashtag_sets(analysis: &AiAnalysis) -> Vec<Vec<String>> {
    let tagged = |words: &[&str]| -> Vec<String> { words.iter().filter_map(|w| hashtag(w)).collect() };
    let base = tagged(&BASE_TAGS[..]);
    let not_base = |tags: Vec<String>| -> Vec<String> {
        tags.into_iter().filter(|t| !base.contains(t)).collect()
    };

    let content = not_base(tagged(content_tags(analysis.content_type)));
    let audience = not_base(audience_tags(&analysis.target_audience));
    let tones = not_base(tone_tags(&analysis.emotional_tones));
    let filler = not_base(tagged(&FILLER_TAGS[..]));
    let base_slice = |i: usize| &base[i * BASE_PER_SET..(i + 1) * BASE_PER_SET];

    let mut broad = TagSet::new();
    broad.take(base_slice(0), BASE_PER_SET);
    broad.take(&content, 4);
    broad.take(&audience, 1);
    broad.take(&tones, 1);

    let mut niche = TagSet::new();
    niche.take(base_slice(1), BASE_PER_SET);
    niche.take(&content[content.len().min(4)..], 4);
    niche.take(&audience, 2);

    let mut mixed = TagSet::new();
    mixed.take(base_slice(2), BASE_PER_SET);
    mixed.take(&tones, 2);
    mixed.take(&audience[audience.len().min(1)..], 2);
    mixed.take(&content[content.len().min(2)..], 2);

    let mut sets = Vec::with_capacity(HASHTAG_SETS);
    for mut set in [broad, niche, mixed] {
        set.take(&content, HASHTAGS_PER_SET);
        set.take(&filler, HASHTAGS_PER_SET);
        sets.push(set.tags);
    }
    sets
}

/// Best posting windows per platform, local time.
pub fn posting_schedule() -> BTreeMap<Platform, Vec<PostingWindow>> {
    Platform::ALL
        .iter()
        .map(|platform| {
            let slots: &[(&str, &str)] = match platform {
                Platform::Tiktok => &[("tuesday", "09:00"), ("thursday", "12:00"), ("friday", "17:00")],
                Platform::Instagram => &[("monday", "11:00"), ("wednesday", "11:00"), ("friday", "10:00")],
                Platform::Youtube => &[("friday", "15:00"), ("saturday", "10:00"), ("sunday", "10:00")],
                Platform::Facebook => &[("wednesday", "09:00"), ("thursday", "13:00")],
                Platform::Twitter => &[("wednesday", "09:00"), ("friday", "09:00")],
                Platform::Linkedin => &[("tuesday", "10:00"), ("wednesday", "12:00")],
            };
            let windows = slots
                .iter()
                .map(|(day, time)| PostingWindow::new(*day, *time))
                .collect();
            (*platform, windows)
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Recurring themes: the content type's pillars plus the leading tones.
pub fn content_pillars(analysis: &AiAnalysis) -> Vec<String> {
    let by_type = pillar_templates(analysis.content_type).iter().map(|p| p.to_string());
    let by_tone = analysis
        .emotional_tones
        .iter()
        .take(2)
        .map(|tone| format!("{} moments", capitalize(tone.trim())));

    dedup_case_insensitive(by_type.chain(by_tone), MAX_PILLARS)
}

/// Derive the full strategy for a video.
pub fn generate_strategy(video_id: &VideoId, user_id: &str, analysis: &AiAnalysis) -> Strategy {
    Strategy {
        id: StrategyId::new(),
        video_id: video_id.clone(),
        user_id: user_id.to_string(),
        hooks: generate_hooks(analysis),
        captions: generate_captions(analysis),
        hashtags: generate_hashtag_sets(analysis),
        best_posting_times: posting_schedule(),
        target_audience: analysis.target_audience.clone(),
        content_pillars: content_pillars(analysis),
        viral_score: analysis.viral_score,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> AiAnalysis {
        AiAnalysis {
            viral_score: 7.0,
            summary: "A quick pasta recipe.".into(),
            hooks: vec!["You've been making this WRONG".into(), "Pasta in 10 minutes".into()],
            emotional_tones: vec!["upbeat".into(), "cozy".into(), "funny".into()],
            target_audience: "Busy home cooks".into(),
            content_type: ContentType::Food,
            ..AiAnalysis::default()
        }
    }

    #[test]
    fn test_hooks_merge_and_dedup_case_insensitive() {
        let hooks = generate_hooks(&analysis());
        assert_eq!(hooks[0], "You've been making this WRONG");
        assert_eq!(hooks[1], "Pasta in 10 minutes");
        let lowered: Vec<String> = hooks.iter().map(|h| h.to_lowercase()).collect();
        assert_eq!(
            lowered.iter().filter(|h| h.as_str() == "you've been making this wrong").count(),
            1
        );
        assert!(hooks.len() <= MAX_HOOKS);
    }

    #[test]
    fn test_hooks_include_content_type_templates() {
        let tutorial = AiAnalysis {
            content_type: ContentType::Tutorial,
            ..analysis()
        };
        assert!(generate_hooks(&tutorial).iter().any(|h| h == "Learn this simple trick!"));

        let vlog = AiAnalysis {
            content_type: ContentType::Vlog,
            ..analysis()
        };
        assert!(generate_hooks(&vlog).iter().any(|h| h == "Day in the life of..."));
    }

    #[test]
    fn test_hooks_are_capped() {
        let mut a = analysis();
        a.hooks = (0..20).map(|i| format!("hook {}", i)).collect();
        assert_eq!(generate_hooks(&a).len(), MAX_HOOKS);
    }

    #[test]
    fn test_captions_start_with_summary_and_cap() {
        let mut a = analysis();
        let captions = generate_captions(&a);
        assert_eq!(captions[0], "A quick pasta recipe.");
        assert_eq!(captions.len(), 4);
        assert!(captions[3].ends_with("Tag a friend who needs a laugh!"));

        a.emotional_tones = (0..10).map(|i| format!("tone{}", i)).collect();
        assert!(generate_captions(&a).len() <= MAX_CAPTIONS);
    }

    fn assert_valid_sets(sets: &[Vec<String>]) {
        assert_eq!(sets.len(), HASHTAG_SETS);
        for set in sets {
            assert_eq!(set.len(), HASHTAGS_PER_SET, "set {:?}", set);
            let unique: HashSet<&String> = set.iter().collect();
            assert_eq!(unique.len(), set.len(), "duplicate tag in {:?}", set);
            assert!(set.iter().all(|t| t.starts_with('#') && t.len() > 1));
        }
        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                let a: HashSet<&String> = sets[i].iter().collect();
                let b: HashSet<&String> = sets[j].iter().collect();
                assert_ne!(a, b, "sets {} and {} are equal", i, j);
            }
        }
    }

    #[test]
    fn test_hashtag_sets_are_full_and_distinct() {
        assert_valid_sets(&generate_hashtag_sets(&analysis()));
    }

    #[test]
    fn test_hashtag_sets_with_sparse_analysis() {
        let sparse = AiAnalysis {
            emotional_tones: Vec::new(),
            target_audience: String::new(),
            ..AiAnalysis::default()
        };
        assert_valid_sets(&generate_hashtag_sets(&sparse));
    }

    #[test]
    fn test_hashtag_sets_for_every_content_type() {
        use ContentType::*;
        for content_type in [
            Tutorial, Vlog, Comedy, Educational, Review, Fitness, Food, Gaming, Music, Travel,
            Entertainment,
        ] {
            let a = AiAnalysis {
                content_type,
                ..analysis()
            };
            assert_valid_sets(&generate_hashtag_sets(&a));
        }
    }

    #[test]
    fn test_hashtag_normalization() {
        assert_eq!(hashtag("Home Cooking!"), Some("#homecooking".to_string()));
        assert_eq!(hashtag("20-35"), None);
    }

    #[test]
    fn test_posting_schedule_covers_every_platform() {
        let schedule = posting_schedule();
        assert_eq!(schedule.len(), Platform::ALL.len());
        assert!(schedule.values().all(|w| !w.is_empty()));
    }

    #[test]
    fn test_content_pillars() {
        let pillars = content_pillars(&analysis());
        assert_eq!(pillars[0], "Recipes");
        assert!(pillars.contains(&"Upbeat moments".to_string()));
        assert!(pillars.len() <= 5);
    }

    #[test]
    fn test_generate_strategy_copies_score_and_audience() {
        let video_id = VideoId::from_string("v");
        let strategy = generate_strategy(&video_id, "u", &analysis());
        assert_eq!(strategy.video_id, video_id);
        assert_eq!(strategy.viral_score, 7.0);
        assert_eq!(strategy.target_audience, "Busy home cooks");
        assert_eq!(strategy.hashtags.len(), 3);
    }
}
