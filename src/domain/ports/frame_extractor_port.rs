//! Port for decoding still frames out of video resources.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;

use crate::domain::errors::MediaError;

/// Opens video resources for frame readback.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Loads a video and waits for its metadata.
    async fn open(&self, url: &str) -> Result<Box<dyn MediaSession>, MediaError>;
}

/// An opened video.
#[async_trait]
pub trait MediaSession: Send {
    /// Total duration reported by the metadata.
    fn duration(&self) -> Duration;

    /// Seeks to `offset` and reads the frame back into a `width` x `height`
    /// RGBA raster.
    async fn frame_at(
        &mut self,
        offset: Duration,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, MediaError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A synthetic video whose frames are solid gray levels.
    ///
    /// Each `(start, level)` pair covers offsets from `start` until the next
    /// pair's start.
    #[derive(Clone)]
    pub struct SyntheticVideo {
        duration: Duration,
        segments: Vec<(Duration, u8)>,
        pub opens: Arc<AtomicUsize>,
        pub seeks: Arc<parking_lot::Mutex<Vec<Duration>>>,
        fail_open: bool,
        fail_from: Option<Duration>,
    }

    impl SyntheticVideo {
        pub fn new(duration: Duration, segments: Vec<(Duration, u8)>) -> Self {
            Self {
                duration,
                segments,
                opens: Arc::new(AtomicUsize::new(0)),
                seeks: Arc::new(parking_lot::Mutex::new(Vec::new())),
                fail_open: false,
                fail_from: None,
            }
        }

        /// Seeks at or past `offset` return no frame.
        pub fn failing_from(self, offset: Duration) -> Self {
            Self {
                fail_from: Some(offset),
                ..self
            }
        }

        pub fn broken() -> Self {
            Self {
                fail_open: true,
                ..Self::new(Duration::ZERO, Vec::new())
            }
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn level_at(&self, offset: Duration) -> u8 {
            self.segments
                .iter()
                .rev()
                .find(|(start, _)| *start <= offset)
                .map_or(0, |(_, level)| *level)
        }
    }

    #[async_trait]
    impl FrameExtractor for SyntheticVideo {
        async fn open(&self, url: &str) -> Result<Box<dyn MediaSession>, MediaError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(MediaError::open(url, "unsupported codec"));
            }
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl MediaSession for SyntheticVideo {
        fn duration(&self) -> Duration {
            self.duration
        }

        async fn frame_at(
            &mut self,
            offset: Duration,
            width: u32,
            height: u32,
        ) -> Result<RgbaImage, MediaError> {
            self.seeks.lock().push(offset);
            if self.fail_from.is_some_and(|from| offset >= from) {
                return Err(MediaError::Decode("no frame at offset".to_string()));
            }
            let level = self.level_at(offset);
            Ok(RgbaImage::from_pixel(
                width,
                height,
                image::Rgba([level, level, level, 255]),
            ))
        }
    }
}
