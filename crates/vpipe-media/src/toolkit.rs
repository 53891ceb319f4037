//! Media access seam for the workers.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::frames::Frame;
use crate::probe::{probe_video, VideoInfo};

/// Probe and frame extraction.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo>;

    /// Grab one JPEG still per timestamp, in order.
    async fn extract_frames(&self, path: &Path, timestamps: &[f64]) -> MediaResult<Vec<Frame>>;
}

/// FFmpeg-backed toolkit.
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    /// Longest edge of extracted frames
    max_dimension: u32,
    jpeg_quality: u8,
    per_frame_timeout: Duration,
}

impl Default for FfmpegMedia {
    fn default() -> Self {
        Self {
            max_dimension: 768,
            jpeg_quality: 4,
            per_frame_timeout: Duration::from_secs(30),
        }
    }
}

impl FfmpegMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(mut self, px: u32) -> Self {
        self.max_dimension = px;
        self
    }

    fn scale_filter(&self) -> String {
        format!(
            "scale='min({d},iw)':'min({d},ih)':force_original_aspect_ratio=decrease",
            d = self.max_dimension
        )
    }
}

#[async_trait]
impl MediaToolkit for FfmpegMedia {
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }

    async fn extract_frames(&self, path: &Path, timestamps: &[f64]) -> MediaResult<Vec<Frame>> {
        if timestamps.is_empty() {
            return Ok(Vec::new());
        }
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let workdir = tempfile::tempdir()?;
        let runner = FfmpegRunner::new().with_timeout(self.per_frame_timeout);
        let mut frames = Vec::with_capacity(timestamps.len());

        for (idx, ts) in timestamps.iter().enumerate() {
            let output = workdir.path().join(format!("frame_{:02}.jpg", idx));
            let cmd = FfmpegCommand::new(path, &output)
                .seek(*ts)
                .single_frame()
                .video_filter(self.scale_filter())
                .jpeg_quality(self.jpeg_quality);
            runner.run(&cmd).await?;

            // ffmpeg exits 0 without writing when seeking past the last frame
            let image = tokio::fs::read(&output).await.map_err(|_| {
                MediaError::invalid_video(format!("no frame decoded at {:.2}s", ts))
            })?;
            debug!(timestamp = ts, bytes = image.len(), "Extracted frame");
            frames.push(Frame::new(image, *ts));
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_timestamps_is_a_no_op() {
        let frames = FfmpegMedia::new()
            .extract_frames(Path::new("/does/not/matter.mp4"), &[])
            .await
            .unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_distinct_error() {
        let err = FfmpegMedia::new()
            .extract_frames(Path::new("/nope/video.mp4"), &[1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[test]
    fn test_scale_filter_caps_dimension() {
        let filter = FfmpegMedia::new().with_max_dimension(512).scale_filter();
        assert!(filter.contains("min(512,iw)"));
    }
}
