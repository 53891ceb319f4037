//! The stage table and the handoff between stages.

use vpipe_models::{EnqueueOptions, Job, JobPayload, Stage, VideoStatus};

use crate::error::{WorkerError, WorkerResult};
use crate::stages::StageOutput;

/// Static description of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDef {
    pub stage: Stage,
    /// Stage enqueued after this one completes
    pub next: Option<Stage>,
    /// Prefix of the video's error message when an attempt fails
    pub failure_prefix: &'static str,
    /// Video status while the stage runs
    pub status: VideoStatus,
}

pub const PIPELINE: [StageDef; 3] = [
    StageDef {
        stage: Stage::Process,
        next: Some(Stage::Analyze),
        failure_prefix: "processing failed: ",
        status: VideoStatus::Processing,
    },
    StageDef {
        stage: Stage::Analyze,
        next: Some(Stage::Strategy),
        failure_prefix: "AI analysis failed: ",
        status: VideoStatus::Analyzing,
    },
    StageDef {
        stage: Stage::Strategy,
        next: None,
        failure_prefix: "strategy generation failed: ",
        status: VideoStatus::GeneratingStrategy,
    },
];

pub fn stage_def(stage: Stage) -> &'static StageDef {
    match stage {
        Stage::Process => &PIPELINE[0],
        Stage::Analyze => &PIPELINE[1],
        Stage::Strategy => &PIPELINE[2],
    }
}

/// Human-readable error recorded on the video.
pub fn failure_message(stage: Stage, error: &WorkerError) -> String {
    format!("{}{}", stage_def(stage).failure_prefix, error.cause())
}

/// Decide what follows a successful attempt.
///
/// The handoff must target the table's next stage for the same video; the
/// next job inherits the completed job's priority.
pub fn advance(
    completed: &Job,
    output: &StageOutput,
) -> WorkerResult<Option<(JobPayload, EnqueueOptions)>> {
    let def = stage_def(completed.stage);

    match (def.next, &output.handoff) {
        (None, None) => Ok(None),
        (Some(next), Some(payload)) => {
            if payload.stage() != next {
                return Err(WorkerError::pipeline(format!(
                    "{} must hand off to {}, not {}",
                    completed.stage,
                    next,
                    payload.stage()
                )));
            }
            if payload.video_id() != completed.payload.video_id() {
                return Err(WorkerError::pipeline(format!(
                    "handoff from {} targets video {}",
                    completed.id,
                    payload.video_id()
                )));
            }
            let opts = EnqueueOptions::default().with_priority(completed.priority);
            Ok(Some((payload.clone(), opts)))
        }
        (Some(next), None) => Err(WorkerError::pipeline(format!(
            "{} completed without a {} handoff",
            completed.stage, next
        ))),
        (None, Some(payload)) => Err(WorkerError::pipeline(format!(
            "{} is the last stage but produced a {} handoff",
            completed.stage,
            payload.stage()
        ))),
    }
}
