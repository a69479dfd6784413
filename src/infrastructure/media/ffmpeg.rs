//! Frame extraction through `ffprobe` and `ffmpeg` subprocesses.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::domain::errors::MediaError;
use crate::domain::ports::{FrameExtractor, MediaSession};

/// Frame extractor shelling out to the ffmpeg tools on `PATH` (or given
/// binaries).
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegFrameExtractor {
    /// Creates an extractor using the given binaries.
    #[must_use]
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn probe_duration(&self, url: &str) -> Result<Duration, MediaError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::open(url, format!("failed to run {}: {e}", self.ffprobe)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::open(url, stderr.trim()));
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| MediaError::open(url, "no duration in metadata"))
    }
}

/// Distance from the end of the stream the last seek lands at.
const END_OF_STREAM_MARGIN: Duration = Duration::from_millis(100);

/// Returns the position to seek to for `offset`. Seeking to the very end
/// decodes no frame, so offsets are kept short of it.
fn seek_position(offset: Duration, duration: Duration) -> Duration {
    offset.min(duration.saturating_sub(END_OF_STREAM_MARGIN))
}

/// Parses ffprobe's duration output in seconds.
fn parse_duration(raw: &str) -> Option<Duration> {
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn open(&self, url: &str) -> Result<Box<dyn MediaSession>, MediaError> {
        let duration = self.probe_duration(url).await?;
        debug!(url = url, duration_ms = duration.as_millis(), "Opened video");

        Ok(Box::new(FfmpegSession {
            ffmpeg: self.ffmpeg.clone(),
            url: url.to_string(),
            duration,
        }))
    }
}

/// An opened video read through one `ffmpeg` run per seek.
struct FfmpegSession {
    ffmpeg: String,
    url: String,
    duration: Duration,
}

#[async_trait]
impl MediaSession for FfmpegSession {
    fn duration(&self) -> Duration {
        self.duration
    }

    async fn frame_at(
        &mut self,
        offset: Duration,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, MediaError> {
        let position = seek_position(offset, self.duration);
        trace!(
            url = %self.url,
            offset_ms = offset.as_millis(),
            position_ms = position.as_millis(),
            "Seeking video"
        );

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", position.as_secs_f64()))
            .arg("-i")
            .arg(&self.url)
            .args(["-frames:v", "1", "-vf"])
            .arg(format!("scale={width}:{height}"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::seek(offset, format!("failed to run {}: {e}", self.ffmpeg)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::seek(offset, stderr.trim()));
        }

        let expected = width as usize * height as usize * 4;
        if output.stdout.len() < expected {
            return Err(MediaError::Decode(format!(
                "expected {expected} bytes of RGBA, got {}",
                output.stdout.len()
            )));
        }

        let mut raw = output.stdout;
        raw.truncate(expected);
        RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| MediaError::Decode("frame buffer size mismatch".to_string()))
    }
}
