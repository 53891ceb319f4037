//! Progress aggregation across a video's job chain.
//!
//! Folds the three per-stage job statuses into a single 0-100 percentage and
//! a label for status polling. Each stage owns a fixed slice of the bar, so
//! as long as individual job progress is monotonic the aggregate is too.
//! Retention may drop completed job records; the video status then acts as a
//! floor, see [`PipelineProgress::floored_by`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{JobState, JobStatus, Stage};
use crate::video::VideoStatus;

/// Share of the bar owned by each stage. Sums to 100.
pub const STAGE_WEIGHTS: [(Stage, u8); 3] =
    [(Stage::Process, 30), (Stage::Analyze, 50), (Stage::Strategy, 20)];

/// Human-readable phase shown next to the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLabel {
    Queued,
    ProcessingVideo,
    AnalyzingWithAi,
    GeneratingStrategy,
    Ready,
    Failed,
}

impl ProgressLabel {
    fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Process => ProgressLabel::ProcessingVideo,
            Stage::Analyze => ProgressLabel::AnalyzingWithAi,
            Stage::Strategy => ProgressLabel::GeneratingStrategy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressLabel::Queued => "Queued",
            ProgressLabel::ProcessingVideo => "Processing video",
            ProgressLabel::AnalyzingWithAi => "Analyzing with AI",
            ProgressLabel::GeneratingStrategy => "Generating strategy",
            ProgressLabel::Ready => "Ready",
            ProgressLabel::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProgressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified view of a video's pipeline progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineProgress {
    /// 0-100
    pub percent: u8,
    pub label: ProgressLabel,
    /// Stage currently holding the bar, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// The current stage is backing off after a failed attempt
    #[serde(default)]
    pub retrying: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineProgress {
    /// Aggregate the per-stage statuses of one video.
    ///
    /// A missing status for a stage whose predecessor completed means the
    /// handoff is queued; it reports the upcoming stage at its base offset.
    /// A missing status followed by a present one was pruned after completing.
    pub fn aggregate(
        process: Option<&JobStatus>,
        analyze: Option<&JobStatus>,
        strategy: Option<&JobStatus>,
    ) -> Self {
        let statuses = [process, analyze, strategy];
        let mut base: u8 = 0;

        for (idx, ((stage, weight), status)) in STAGE_WEIGHTS.iter().zip(statuses).enumerate() {
            let Some(status) = status else {
                if statuses[idx + 1..].iter().any(Option::is_some) {
                    base += weight;
                    continue;
                }
                let label = if *stage == Stage::Process {
                    ProgressLabel::Queued
                } else {
                    ProgressLabel::for_stage(*stage)
                };
                return Self::at(base, label, Some(*stage));
            };

            let within = (u16::from(*weight) * u16::from(status.progress.min(100)) / 100) as u8;
            match status.state {
                JobState::Completed => base += weight,
                JobState::Failed => {
                    return Self {
                        percent: base + within,
                        label: ProgressLabel::Failed,
                        stage: Some(*stage),
                        retrying: false,
                        error: status.failed_reason.clone(),
                    };
                }
                JobState::Waiting | JobState::Delayed | JobState::Active => {
                    let label = if *stage == Stage::Process
                        && status.state == JobState::Waiting
                        && status.attempts_made == 0
                    {
                        ProgressLabel::Queued
                    } else {
                        ProgressLabel::for_stage(*stage)
                    };
                    let mut progress = Self::at(base + within, label, Some(*stage));
                    progress.retrying = status.state == JobState::Delayed
                        || (status.attempts_made > 0 && status.state == JobState::Waiting);
                    return progress;
                }
            }
        }

        Self::at(100, ProgressLabel::Ready, None)
    }

    /// Raise the aggregate to what the video record already proves.
    ///
    /// A READY video is always at 100. A FAILED video whose job records are
    /// gone reports the error stored on the video.
    pub fn floored_by(self, video_status: VideoStatus, video_error: Option<&str>) -> Self {
        let stage = match video_status {
            VideoStatus::Ready => return Self::at(100, ProgressLabel::Ready, None),
            VideoStatus::Failed if self.is_failed() => return self,
            VideoStatus::Failed => {
                return Self {
                    label: ProgressLabel::Failed,
                    retrying: false,
                    error: video_error.map(str::to_string),
                    ..self
                }
            }
            VideoStatus::Uploading => return self,
            VideoStatus::Processing => Stage::Process,
            VideoStatus::Analyzing => Stage::Analyze,
            VideoStatus::GeneratingStrategy => Stage::Strategy,
        };

        let floor = stage_base(stage);
        let behind = self.percent < floor || self.stage.map_or(true, |current| current < stage);
        if self.is_failed() || self.is_ready() || !behind {
            return self;
        }
        Self::at(floor.max(self.percent), ProgressLabel::for_stage(stage), Some(stage))
    }

    fn at(percent: u8, label: ProgressLabel, stage: Option<Stage>) -> Self {
        Self {
            percent: percent.min(100),
            label,
            stage,
            retrying: false,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.label == ProgressLabel::Ready
    }

    pub fn is_failed(&self) -> bool {
        self.label == ProgressLabel::Failed
    }
}

/// Offset at which a stage's slice of the bar starts.
fn stage_base(stage: Stage) -> u8 {
    STAGE_WEIGHTS
        .iter()
        .take_while(|(s, _)| *s != stage)
        .map(|(_, weight)| weight)
        .sum()
}
