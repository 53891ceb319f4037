//! End-to-end runs of the three-stage chain over the in-memory stores.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{
    build, fast_queue, pruning_queue, wait_for_outcome, FakeMedia, FakeProvider, JSON_REPLY,
    PROSE_REPLY,
};
use vpipe_models::{ContentType, JobId, JobState, ProgressLabel, Stage, VideoStatus};
use vpipe_queue::{EnqueueOutcome, JobStore};
use vpipe_storage::VideoRepository;

#[tokio::test]
async fn test_upload_reaches_ready_with_strategy() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/pasta.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_ready(), "unexpected progress {:?}", view.progress);
    assert_eq!(view.progress.percent, 100);

    let video = view.video;
    assert_eq!(video.status, VideoStatus::Ready);
    assert_eq!(video.frame_count, 5);
    assert!(video.error_message.is_none());
    assert_eq!(video.metadata.as_ref().map(|m| m.duration), Some(65.0));

    let analysis = video.ai_analysis.expect("analysis persisted");
    assert!((0.0..=10.0).contains(&analysis.viral_score));
    assert_eq!(analysis.viral_score, 8.4);
    assert_eq!(analysis.content_type, ContentType::Food);
    assert_eq!(analysis.token_usage.total(), 1600);
    assert!(analysis.cost_usd > 0.0);
    assert_eq!(t.provider.calls(), 1);
    assert_eq!(t.provider.last_frame_count(), 5);

    let strategy = t
        .videos
        .strategy_for_video(&video_id)
        .await
        .unwrap()
        .expect("strategy persisted");
    assert_eq!(strategy.viral_score, analysis.viral_score);
    assert_eq!(strategy.hashtags.len(), 3);
    for set in &strategy.hashtags {
        assert_eq!(set.len(), 10);
        let unique: HashSet<_> = set.iter().map(|t| t.to_lowercase()).collect();
        assert_eq!(unique.len(), 10, "duplicate tag in {:?}", set);
    }
    let sets: HashSet<Vec<String>> = strategy.hashtags.iter().cloned().collect();
    assert_eq!(sets.len(), 3);
    assert!(strategy.hooks.len() <= 10);
    assert!(strategy.captions.len() <= 5);
    assert!(!strategy.best_posting_times.is_empty());
}

#[tokio::test]
async fn test_stages_run_in_chain_order() {
    let t = build(FakeMedia::new(47.0), FakeProvider::new(JSON_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;
    assert!(view.progress.is_ready());
    assert_eq!(view.video.frame_count, 4);

    let job = |stage| {
        let store = t.store.clone();
        let id = JobId::for_stage(stage, &video_id);
        async move { store.get_job(&id).await.unwrap().expect("job exists") }
    };
    let process = job(Stage::Process).await;
    let analyze = job(Stage::Analyze).await;
    let strategy = job(Stage::Strategy).await;

    for j in [&process, &analyze, &strategy] {
        assert_eq!(j.state, JobState::Completed);
        assert_eq!(j.progress, 100);
    }
    assert!(analyze.processed_at.unwrap() >= process.finished_at.unwrap());
    assert!(strategy.processed_at.unwrap() >= analyze.finished_at.unwrap());
    assert_eq!(process.return_value.as_ref().unwrap()["frame_count"], 4);
}

#[tokio::test]
async fn test_process_failure_stops_chain() {
    let t = build(FakeMedia::corrupt(), FakeProvider::new(JSON_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/broken.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_failed());
    assert_eq!(view.progress.stage, Some(Stage::Process));
    assert_eq!(view.video.status, VideoStatus::Failed);
    assert!(view.video.failed_at.is_some());

    let message = view.video.error_message.expect("error recorded");
    assert!(message.starts_with("processing failed: "), "{}", message);
    assert!(message.contains("moov atom not found"), "{}", message);

    let process = t
        .store
        .get_job(&JobId::for_stage(Stage::Process, &video_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(process.state, JobState::Failed);
    assert_eq!(process.attempts_made, process.max_attempts);
    assert_eq!(process.failed_reason.as_deref(), Some(message.as_str()));

    for stage in [Stage::Analyze, Stage::Strategy] {
        let next = t.store.get_job(&JobId::for_stage(stage, &video_id)).await.unwrap();
        assert!(next.is_none(), "{} job must never be created", stage);
    }
    assert_eq!(t.provider.calls(), 0);
}

#[tokio::test]
async fn test_provider_error_is_retried() {
    let t = build(
        FakeMedia::new(65.0),
        FakeProvider::failing_first(JSON_REPLY, 1),
        fast_queue(),
    );
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_ready());
    assert_eq!(view.video.status, VideoStatus::Ready);
    assert!(view.video.error_message.is_none());
    assert_eq!(t.provider.calls(), 2);

    let analyze = t
        .store
        .get_job(&JobId::for_stage(Stage::Analyze, &video_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(analyze.attempts_made, 1);
}

#[tokio::test]
async fn test_exhausted_provider_fails_video() {
    let t = build(
        FakeMedia::new(65.0),
        FakeProvider::failing_first(JSON_REPLY, 10),
        fast_queue(),
    );
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_failed());
    assert_eq!(view.progress.stage, Some(Stage::Analyze));
    // Process slice is complete, analyze slice froze where it failed
    assert!(view.progress.percent >= 30 && view.progress.percent < 80);

    assert_eq!(view.video.status, VideoStatus::Failed);
    assert!(view.video.metadata.is_some());
    assert!(view.video.ai_analysis.is_none());
    let message = view.video.error_message.unwrap();
    assert!(message.starts_with("AI analysis failed: "), "{}", message);
    assert!(message.contains("503"), "{}", message);

    // Analyze stage allows two attempts by default
    assert_eq!(t.provider.calls(), 2);
    let strategy = t
        .store
        .get_job(&JobId::for_stage(Stage::Strategy, &video_id))
        .await
        .unwrap();
    assert!(strategy.is_none());
    assert!(t.videos.strategy_for_video(&video_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_reply_still_yields_full_analysis() {
    let t = build(FakeMedia::new(30.0), FakeProvider::new(PROSE_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_ready());
    let analysis = view.video.ai_analysis.unwrap();
    assert_eq!(analysis.viral_score, 5.0);
    assert!(!analysis.summary.is_empty());
    assert!(!analysis.strengths.is_empty());
    assert!(!analysis.weaknesses.is_empty());
    assert!(!analysis.hooks.is_empty());
    assert!(!analysis.emotional_tones.is_empty());
    assert!(!analysis.recommendations.is_empty());
    assert!(!analysis.target_audience.is_empty());

    let strategy = t.videos.strategy_for_video(&video_id).await.unwrap().unwrap();
    assert_eq!(strategy.hashtags.len(), 3);
}

#[tokio::test]
async fn test_short_video_skips_frames_but_completes() {
    let t = build(FakeMedia::new(8.0), FakeProvider::new(JSON_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/short.mp4").await.unwrap();
    let view = wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(view.progress.is_ready());
    assert_eq!(view.video.frame_count, 0);
    // Only the analysis key frames were extracted
    assert_eq!(t.media.frames_extracted(), 5);
}

#[tokio::test]
async fn test_submit_is_queued_once() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), fast_queue());

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    let again = t.pipeline.resume(&video_id).await.unwrap();
    assert!(matches!(again, EnqueueOutcome::Duplicate(_)));

    let counts = t.store.counts(Stage::Process).await.unwrap();
    assert_eq!(counts.waiting, 1);

    let view = t.pipeline.status(&video_id).await.unwrap().unwrap();
    assert_eq!(view.video.status, VideoStatus::Uploading);
    assert_eq!(view.progress.percent, 0);
    assert_eq!(view.progress.label, ProgressLabel::Queued);
}

#[tokio::test]
async fn test_resume_rejects_started_video() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), fast_queue());
    t.pipeline.start().await;

    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    wait_for_outcome(&t.pipeline, &video_id).await;
    t.pipeline.stop().await;

    assert!(t.pipeline.resume(&video_id).await.is_err());
}

#[tokio::test]
async fn test_unknown_video_has_no_status() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), fast_queue());
    let missing = vpipe_models::VideoId::from_string("missing");
    assert!(t.pipeline.status(&missing).await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_never_goes_backwards() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), fast_queue());
    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    t.pipeline.start().await;

    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = t.pipeline.status(&video_id).await.unwrap().unwrap();
        seen.push(view.progress.percent);
        if view.progress.is_ready() || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    t.pipeline.stop().await;

    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {:?}", seen);
}

#[tokio::test]
async fn test_status_holds_after_jobs_are_pruned() {
    let t = build(FakeMedia::new(65.0), FakeProvider::new(JSON_REPLY), pruning_queue());
    let video_id = t.pipeline.submit_upload("user-1", "/uploads/a.mp4").await.unwrap();
    t.pipeline.start().await;

    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = t.pipeline.status(&video_id).await.unwrap().unwrap();
        seen.push(view.progress.percent);
        if view.progress.is_ready() || tokio::time::Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    t.pipeline.stop().await;
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {:?}", seen);

    for stage in Stage::ALL {
        let job = t.store.get_job(&JobId::for_stage(stage, &video_id)).await.unwrap();
        assert!(job.is_none(), "{} job should have been pruned", stage);
    }

    let view = t.pipeline.status(&video_id).await.unwrap().unwrap();
    assert_eq!(view.video.status, VideoStatus::Ready);
    assert!(view.progress.is_ready());
    assert_eq!(view.progress.percent, 100);
    assert_eq!(view.progress.label, ProgressLabel::Ready);
}
