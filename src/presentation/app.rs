//! Command-line front end over the media service.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, eyre};
use futures_util::future::join_all;
use tracing::{debug, info};

use crate::application::{
    MediaService, RequestCoalescer, RetryPolicy, ThumbnailConfig, VideoThumbnailExtractor,
};
use crate::domain::ports::{Clock, KeyValueStore, SystemClock};
use crate::infrastructure::media::decode_data_url;
use crate::infrastructure::{
    AppConfig, ByteCache, ByteCacheConfig, Command, FfmpegFrameExtractor, FileStore, HttpFetcher,
    MemoryStore, StorageBackend,
};

const IMAGE_STORE_DIR: &str = "images";
const THUMBNAIL_STORE_DIR: &str = "thumbnails";

fn byte_cache_config(config: &AppConfig) -> ByteCacheConfig {
    ByteCacheConfig {
        memory_cap_bytes: config.cache.memory_cap_bytes,
        low_water_ratio: config.cache.low_water_ratio,
        max_age: Duration::from_secs(config.cache.max_age_secs),
        persist_max_entry_bytes: config.cache.persist_max_entry_bytes,
    }
}

fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.retry.max_retries,
        Duration::from_millis(config.retry.delay_ms),
    )
}

fn thumbnail_config(config: &AppConfig) -> ThumbnailConfig {
    let settings = &config.thumbnail;
    ThumbnailConfig {
        cache_version: settings.cache_version.clone(),
        width: settings.width,
        height: settings.height,
        brightness_threshold: settings.brightness_threshold,
        offsets: settings
            .offsets_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect(),
        jpeg_quality: settings.jpeg_quality,
        max_age: Duration::from_secs(settings.max_age_secs),
    }
}

async fn open_store(backend: StorageBackend, dir: &Path) -> Result<Arc<dyn KeyValueStore>> {
    match backend {
        StorageBackend::File => Ok(Arc::new(FileStore::new(dir.to_path_buf()).await?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Runs cache commands and prints their results.
pub struct App {
    media: MediaService,
}

impl App {
    /// Creates an app over an existing media service.
    #[must_use]
    pub const fn new(media: MediaService) -> Self {
        Self { media }
    }

    /// Builds every service from the configuration.
    ///
    /// # Errors
    /// Returns error if a store cannot be opened or the HTTP client fails to
    /// build.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let cache_dir = config.effective_cache_dir();
        debug!(
            path = %cache_dir.display(),
            backend = ?config.cache.backend,
            "Opening persistent caches"
        );

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let image_store = open_store(config.cache.backend, &cache_dir.join(IMAGE_STORE_DIR)).await?;
        let thumbnail_store =
            open_store(config.cache.backend, &cache_dir.join(THUMBNAIL_STORE_DIR)).await?;

        let cache = Arc::new(ByteCache::new(
            byte_cache_config(config),
            image_store,
            Arc::clone(&clock),
        ));
        let fetcher = Arc::new(HttpFetcher::new(
            Duration::from_secs(config.http.timeout_secs),
            &config.http.user_agent,
        )?);
        let frames = Arc::new(FfmpegFrameExtractor::new(
            config.thumbnail.ffmpeg.clone(),
            config.thumbnail.ffprobe.clone(),
        ));
        let thumbnails = Arc::new(VideoThumbnailExtractor::new(
            thumbnail_config(config),
            thumbnail_store,
            frames,
            clock,
        ));
        let coalescer =
            RequestCoalescer::new(Duration::from_secs(config.coalescer.failure_ttl_secs));

        Ok(Self::new(MediaService::new(
            cache,
            coalescer,
            fetcher,
            thumbnails,
            retry_policy(config),
        )))
    }

    /// Returns the media service.
    #[must_use]
    pub const fn media(&self) -> &MediaService {
        &self.media
    }

    /// Executes one command, writing human-readable output to `out`.
    ///
    /// # Errors
    /// Returns error if the command failed or output could not be written.
    pub async fn run(&self, command: Command, out: &mut impl Write) -> Result<()> {
        match command {
            Command::Resolve { urls } => self.resolve(&urls, out).await,
            Command::Thumbnail {
                url,
                refetch,
                fallback,
                output,
            } => {
                self.thumbnail(&url, refetch, fallback, output.as_deref(), out)
                    .await
            }
            Command::Stats => {
                let stats = self.media.cache_stats().await;
                writeln!(out, "{stats}")?;
                writeln!(out, "Thumbnails: {}", self.media.thumbnail_count().await)?;
                Ok(())
            }
            Command::Clear { thumbnails } => {
                self.media.clear_cache().await;
                writeln!(out, "Image cache cleared")?;
                if thumbnails {
                    let removed = self.media.clear_thumbnails().await;
                    writeln!(out, "Removed {removed} thumbnails")?;
                }
                Ok(())
            }
            Command::Purge => {
                let removed = self.media.purge_expired().await;
                writeln!(out, "Removed {removed} expired entries")?;
                Ok(())
            }
        }
    }

    async fn resolve(&self, urls: &[String], out: &mut impl Write) -> Result<()> {
        let loads = urls.iter().map(|url| {
            let mut resource = self.media.image(url.as_str());
            async move {
                let state = resource.load().await;
                let size = state
                    .renderable_ref
                    .as_ref()
                    .and_then(|renderable| self.media.lookup(renderable))
                    .map(|bytes| bytes.len());
                (state, size)
            }
        });
        let results = join_all(loads).await;

        let mut failed = 0;
        for (url, (state, size)) in urls.iter().zip(results) {
            match (&state.renderable_ref, size) {
                (Some(renderable), Some(size)) => {
                    writeln!(out, "{url} -> {renderable} ({size} bytes)")?;
                }
                _ => {
                    failed += 1;
                    writeln!(out, "{url}: {}", state.error().unwrap_or("not loaded"))?;
                }
            }
        }

        info!(total = urls.len(), failed = failed, "Resolved images");
        if failed > 0 {
            return Err(eyre!("{failed} of {} images failed to load", urls.len()));
        }
        Ok(())
    }

    async fn thumbnail(
        &self,
        url: &str,
        refetch: bool,
        fallback: Option<String>,
        output: Option<&Path>,
        out: &mut impl Write,
    ) -> Result<()> {
        let has_fallback = fallback.is_some();
        let mut handle = self.media.thumbnail_handle(url, fallback);
        let state = if refetch {
            handle.refetch().await
        } else {
            handle.load().await
        };

        if let Some(error) = &state.error {
            writeln!(out, "{url}: {error}")?;
            if let Some(fallback) = &state.thumbnail_url {
                writeln!(out, "Using fallback {fallback}")?;
            }
            return if has_fallback {
                Ok(())
            } else {
                Err(eyre!("thumbnail extraction failed for {url}"))
            };
        }

        let data_url = state
            .thumbnail_url
            .ok_or_else(|| eyre!("no thumbnail produced for {url}"))?;
        let jpeg = decode_data_url(&data_url).ok_or_else(|| eyre!("malformed thumbnail data"))?;

        match output {
            Some(path) => {
                tokio::fs::write(path, &jpeg).await?;
                writeln!(out, "{url}: wrote {} bytes to {}", jpeg.len(), path.display())?;
            }
            None => writeln!(out, "{url}: {} byte JPEG thumbnail", jpeg.len())?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::LoadError;
    use crate::domain::ports::mocks::{ManualClock, MockResourceFetcher, SyntheticVideo};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn app(fetcher: MockResourceFetcher, video: SyntheticVideo) -> App {
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let cache = Arc::new(ByteCache::new(
            ByteCacheConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));
        let thumbnails = Arc::new(VideoThumbnailExtractor::new(
            ThumbnailConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(video),
            clock,
        ));
        App::new(MediaService::new(
            cache,
            RequestCoalescer::default(),
            Arc::new(fetcher),
            thumbnails,
            RetryPolicy::disabled(),
        ))
    }

    fn bright_video() -> SyntheticVideo {
        SyntheticVideo::new(Duration::from_secs(10), vec![(Duration::ZERO, 180)])
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_config_conversion() {
        let mut config = AppConfig::default();
        config.retry.max_retries = 5;
        config.thumbnail.offsets_ms = vec![100, 200];

        let policy = retry_policy(&config);
        assert_eq!(policy, RetryPolicy::new(5, Duration::from_millis(1000)));

        let thumbnails = thumbnail_config(&config);
        assert_eq!(
            thumbnails.offsets,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert_eq!(thumbnails.cache_version, "v1");

        let cache = byte_cache_config(&config);
        assert_eq!(cache.max_age, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cache.memory_cap_bytes, 50 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_resolve_reports_each_url() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher.expect_fetch().returning(|url| {
            if url.ends_with("missing.png") {
                Err(LoadError::http_status(404, url))
            } else {
                Ok(Bytes::from_static(b"12345"))
            }
        });
        let app = app(fetcher, bright_video());
        let mut buffer = Vec::new();

        let result = app
            .run(
                Command::Resolve {
                    urls: vec![
                        "https://x/ok.png".to_string(),
                        "https://x/missing.png".to_string(),
                    ],
                },
                &mut buffer,
            )
            .await;

        assert!(result.is_err());
        let text = output(buffer);
        assert!(text.contains("https://x/ok.png -> blob:contest-media/"));
        assert!(text.contains("(5 bytes)"));
        assert!(text.contains("https://x/missing.png: HTTP 404 for https://x/missing.png"));
    }

    #[tokio::test]
    async fn test_thumbnail_written_to_file() {
        let app = app(MockResourceFetcher::new(), bright_video());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thumb.jpg");
        let mut buffer = Vec::new();

        app.run(
            Command::Thumbnail {
                url: "https://x/clip.mp4".to_string(),
                refetch: false,
                fallback: None,
                output: Some(path.clone()),
            },
            &mut buffer,
        )
        .await
        .unwrap();

        let jpeg = std::fs::read(&path).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(output(buffer).contains("wrote"));
    }

    #[tokio::test]
    async fn test_thumbnail_failure_with_fallback_succeeds() {
        let app = app(MockResourceFetcher::new(), SyntheticVideo::broken());
        let mut buffer = Vec::new();

        app.run(
            Command::Thumbnail {
                url: "https://x/clip.mp4".to_string(),
                refetch: false,
                fallback: Some("/icons/video.svg".to_string()),
                output: None,
            },
            &mut buffer,
        )
        .await
        .unwrap();

        assert!(output(buffer).contains("Using fallback /icons/video.svg"));
    }

    #[tokio::test]
    async fn test_stats_clear_and_purge() {
        let mut fetcher = MockResourceFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"img")));
        let app = app(fetcher, bright_video());
        let mut buffer = Vec::new();

        app.run(
            Command::Resolve {
                urls: vec!["https://x/a.png".to_string()],
            },
            &mut buffer,
        )
        .await
        .unwrap();
        app.run(Command::Stats, &mut buffer).await.unwrap();
        app.run(Command::Clear { thumbnails: true }, &mut buffer)
            .await
            .unwrap();
        app.run(Command::Purge, &mut buffer).await.unwrap();

        let text = output(buffer);
        assert!(text.contains("Cache: 1 in memory (0.0 MB), 1 persisted"));
        assert!(text.contains("Image cache cleared"));
        assert!(text.contains("Removed 0 thumbnails"));
        assert!(text.contains("Removed 0 expired entries"));
        assert_eq!(app.media().cache_stats().await.memory_entry_count, 0);
    }

    #[tokio::test]
    async fn test_from_config_with_memory_backend() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.cache.backend = StorageBackend::Memory;
        config.cache.cache_dir = Some(dir.path().to_path_buf());

        let app = App::from_config(&config).await.unwrap();

        let stats = app.media().cache_stats().await;
        assert_eq!(stats.persistent_entry_count, 0);
    }

    #[tokio::test]
    async fn test_from_config_with_file_backend_creates_dirs() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.cache.cache_dir = Some(dir.path().to_path_buf());

        App::from_config(&config).await.unwrap();

        assert!(dir.path().join(IMAGE_STORE_DIR).is_dir());
        assert!(dir.path().join(THUMBNAIL_STORE_DIR).is_dir());
    }
}
