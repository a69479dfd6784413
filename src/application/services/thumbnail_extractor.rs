//! Video thumbnails: pick a non-black frame, encode it, cache it by version.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{ThumbnailCacheEntry, ThumbnailKey, ThumbnailState};
use crate::domain::errors::{MediaError, StorageError, ThumbnailError};
use crate::domain::ports::{Clock, FrameExtractor, KeyValueStore};
use crate::infrastructure::media::{DEFAULT_JPEG_QUALITY, data_url, encode_jpeg, mean_luma};

use super::retry::{RetryPolicy, RetryState};

const KEY_PREFIX: &str = "thumbnail:";

/// Thumbnail pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailConfig {
    /// Invalidation tag; bumping it orphans every stored thumbnail.
    pub cache_version: String,
    /// Raster width.
    pub width: u32,
    /// Raster height.
    pub height: u32,
    /// Frames with a mean luma below this are skipped while offsets remain.
    pub brightness_threshold: f64,
    /// Candidate seek offsets, tried in order.
    pub offsets: Vec<Duration>,
    /// JPEG quality on a 0.0-1.0 scale.
    pub jpeg_quality: f32,
    /// Lifetime of a stored thumbnail.
    pub max_age: Duration,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            cache_version: "v1".to_string(),
            width: 320,
            height: 180,
            brightness_threshold: 50.0,
            offsets: [500, 1000, 2000, 5000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_age: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// An extracted (or cached) thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct Thumbnail {
    /// `data:image/jpeg;base64,...` URL.
    pub data_url: String,
    /// Offset of the frame that was picked.
    pub offset: Duration,
    /// True if served from the thumbnail store.
    pub from_cache: bool,
}

/// Extracts representative stills from videos.
///
/// Has its own store, independent of the image byte cache. Extractions of
/// the same URL are not deduplicated; store writes for one key are
/// idempotent.
pub struct VideoThumbnailExtractor {
    store: Arc<dyn KeyValueStore>,
    frames: Arc<dyn FrameExtractor>,
    clock: Arc<dyn Clock>,
    config: ThumbnailConfig,
}

impl std::fmt::Debug for VideoThumbnailExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoThumbnailExtractor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VideoThumbnailExtractor {
    /// Creates an extractor.
    #[must_use]
    pub fn new(
        config: ThumbnailConfig,
        store: Arc<dyn KeyValueStore>,
        frames: Arc<dyn FrameExtractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            frames,
            clock,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    fn key(&self, url: &str) -> String {
        ThumbnailKey::new(&self.config.cache_version, url).storage_key()
    }

    /// Returns the thumbnail for `url`, extracting it on a miss.
    ///
    /// # Errors
    /// Returns error if the video cannot be opened, seeked, or encoded.
    pub async fn get(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        if let Some(thumbnail) = self.cached(url).await {
            return Ok(thumbnail);
        }
        self.extract(url).await
    }

    /// Discards any stored thumbnail for `url` and extracts a new one.
    ///
    /// # Errors
    /// See [`Self::get`].
    pub async fn refetch(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        self.invalidate(url).await;
        self.extract(url).await
    }

    /// Removes the stored thumbnail for `url` under the current version.
    pub async fn invalidate(&self, url: &str) {
        let key = self.key(url);
        if let Err(e) = self.store.remove(&key).await {
            warn!(url = url, error = %e, "Failed to remove stored thumbnail");
        }
    }

    /// Returns the stored thumbnail, if present and unexpired.
    ///
    /// Store failures count as a miss. Expired or unreadable records are
    /// deleted.
    pub async fn cached(&self, url: &str) -> Option<Thumbnail> {
        let key = self.key(url);
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(url = url, error = %e, "Thumbnail store read failed");
                return None;
            }
        };

        let entry = match serde_json::from_str::<ThumbnailCacheEntry>(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = url, error = %e, "Discarding unreadable thumbnail");
                self.invalidate(url).await;
                return None;
            }
        };

        if entry.is_expired(self.clock.now(), self.config.max_age) {
            trace!(url = url, "Stored thumbnail expired");
            self.invalidate(url).await;
            return None;
        }

        trace!(url = url, offset_ms = entry.offset_ms, "Thumbnail cache hit");
        Some(Thumbnail {
            data_url: entry.data_url,
            offset: Duration::from_millis(entry.offset_ms),
            from_cache: true,
        })
    }

    /// Returns the offsets to try for a video of `duration`.
    ///
    /// Each offset is clamped to the duration; repeats produced by clamping
    /// are dropped.
    #[must_use]
    pub fn candidate_offsets(&self, duration: Duration) -> Vec<Duration> {
        let mut offsets: Vec<Duration> = self
            .config
            .offsets
            .iter()
            .map(|offset| (*offset).min(duration))
            .collect();
        offsets.dedup();
        if offsets.is_empty() {
            offsets.push(Duration::ZERO);
        }
        offsets
    }

    async fn extract(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        debug!(url = url, "Extracting thumbnail");
        let mut session = self.frames.open(url).await?;
        let offsets = self.candidate_offsets(session.duration());
        let (width, height) = (self.config.width, self.config.height);

        // A failed seek after an earlier frame was read keeps that frame.
        let mut picked = None;
        for (index, offset) in offsets.iter().copied().enumerate() {
            let frame = match session.frame_at(offset, width, height).await {
                Ok(frame) => frame,
                Err(e) if picked.is_some() => {
                    warn!(
                        url = url,
                        offset_ms = offset.as_millis(),
                        error = %e,
                        "Seek failed, keeping previous frame"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            let luma = mean_luma(&frame);
            let is_last = index + 1 == offsets.len();
            picked = Some((offset, frame));

            if luma < self.config.brightness_threshold && !is_last {
                trace!(
                    url = url,
                    offset_ms = offset.as_millis(),
                    luma = luma,
                    "Frame too dark, trying next offset"
                );
                continue;
            }

            break;
        }

        let (offset, frame) =
            picked.ok_or_else(|| MediaError::Decode("no frame could be read".to_string()))?;

        let quality = self.config.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
            .await
            .map_err(|e| ThumbnailError::Aborted(e.to_string()))??;

        let thumbnail = Thumbnail {
            data_url: data_url("image/jpeg", &jpeg),
            offset,
            from_cache: false,
        };

        if let Err(e) = self.store_thumbnail(url, &thumbnail).await {
            warn!(url = url, error = %e, "Failed to store thumbnail");
        }

        info!(
            url = url,
            offset_ms = offset.as_millis(),
            size = jpeg.len(),
            "Extracted thumbnail"
        );
        Ok(thumbnail)
    }

    async fn store_thumbnail(&self, url: &str, thumbnail: &Thumbnail) -> Result<(), StorageError> {
        let entry = ThumbnailCacheEntry {
            data_url: thumbnail.data_url.clone(),
            offset_ms: u64::try_from(thumbnail.offset.as_millis()).unwrap_or(u64::MAX),
            created_at: self.clock.now(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&self.key(url), &raw).await
    }

    /// Removes every stored thumbnail, across all versions.
    pub async fn clear(&self) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list stored thumbnails");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|key| key.starts_with(KEY_PREFIX)) {
            match self.store.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to remove stored thumbnail"),
            }
        }
        info!(removed = removed, "Cleared thumbnail store");
        removed
    }

    /// Returns the number of stored thumbnails, across all versions.
    pub async fn len(&self) -> usize {
        match self.store.keys().await {
            Ok(keys) => keys.iter().filter(|key| key.starts_with(KEY_PREFIX)).count(),
            Err(e) => {
                warn!(error = %e, "Failed to list stored thumbnails");
                0
            }
        }
    }
}

/// One consumer's view of a video thumbnail.
///
/// Extraction runs on its own task, which is aborted when the handle is
/// dropped.
pub struct ThumbnailHandle {
    extractor: Arc<VideoThumbnailExtractor>,
    url: String,
    fallback: Option<String>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<ThumbnailState>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThumbnailHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailHandle")
            .field("url", &self.url)
            .field("fallback", &self.fallback)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ThumbnailHandle {
    /// Creates an idle handle. `fallback` is shown in place of the
    /// thumbnail when extraction fails.
    #[must_use]
    pub fn new(
        extractor: Arc<VideoThumbnailExtractor>,
        url: impl Into<String>,
        policy: RetryPolicy,
        fallback: Option<String>,
    ) -> Self {
        let (state, _) = watch::channel(ThumbnailState::default());
        Self {
            extractor,
            url: url.into(),
            fallback,
            policy,
            state: Arc::new(state),
            task: None,
        }
    }

    /// Returns the video URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ThumbnailState {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ThumbnailState> {
        self.state.subscribe()
    }

    /// Starts extraction in the background unless it is running, done, or
    /// failed.
    pub fn start(&mut self) {
        let running = self.task.as_ref().is_some_and(|task| !task.is_finished());
        // A failure stays until `refetch` starts a new lifecycle.
        let done = {
            let state = self.state.borrow();
            state.thumbnail_url.is_some() || state.error.is_some()
        };
        if !running && !done {
            self.spawn(false);
        }
    }

    /// Loads the thumbnail and waits for the outcome.
    pub async fn load(&mut self) -> ThumbnailState {
        self.start();
        self.wait().await
    }

    /// Drops the stored thumbnail, extracts again, and waits for the outcome.
    pub async fn refetch(&mut self) -> ThumbnailState {
        self.spawn(true);
        self.wait().await
    }

    fn spawn(&mut self, refetch: bool) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.state.send_replace(ThumbnailState {
            thumbnail_url: None,
            is_loading: true,
            error: None,
        });

        let extractor = Arc::clone(&self.extractor);
        let url = self.url.clone();
        let fallback = self.fallback.clone();
        let policy = self.policy;
        let state = Arc::clone(&self.state);

        self.task = Some(tokio::spawn(async move {
            if refetch {
                extractor.invalidate(&url).await;
            }

            let mut retry = RetryState::new(policy);
            let result = retry.run(|| extractor.get(&url), |_, _| {}).await;

            let next = match result {
                Ok(thumbnail) => ThumbnailState {
                    thumbnail_url: Some(thumbnail.data_url),
                    is_loading: false,
                    error: None,
                },
                Err(e) => {
                    warn!(url = %url, error = %e, "Thumbnail extraction failed");
                    ThumbnailState {
                        thumbnail_url: fallback,
                        is_loading: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            state.send_replace(next);
        }));
    }

    async fn wait(&mut self) -> ThumbnailState {
        let outcome = match self.task.as_mut() {
            Some(task) => task.await,
            None => Ok(()),
        };
        self.task = None;

        if let Err(e) = outcome {
            let error = ThumbnailError::Aborted(e.to_string());
            self.state.send_replace(ThumbnailState {
                thumbnail_url: self.fallback.clone(),
                is_loading: false,
                error: Some(error.to_string()),
            });
        }
        self.state()
    }
}

impl Drop for ThumbnailHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
