//! Entry point for consumers of the media caches.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::application::services::{
    ImageResource, ImageResourceLoader, RequestCoalescer, RetryPolicy, Thumbnail,
    ThumbnailHandle, VideoThumbnailExtractor,
};
use crate::domain::entities::RenderableRef;
use crate::domain::errors::{LoadError, ThumbnailError};
use crate::domain::ports::ResourceFetcher;
use crate::infrastructure::{ByteCache, CacheStats, ObjectUrlRegistry};

/// Shared media services, constructed once and cloned into consumers.
#[derive(Clone)]
pub struct MediaService {
    cache: Arc<ByteCache>,
    coalescer: Arc<RequestCoalescer>,
    object_urls: Arc<ObjectUrlRegistry>,
    loader: Arc<ImageResourceLoader>,
    thumbnails: Arc<VideoThumbnailExtractor>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for MediaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaService")
            .field("cache", &self.cache)
            .field("thumbnails", &self.thumbnails)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl MediaService {
    /// Wires the services together.
    #[must_use]
    pub fn new(
        cache: Arc<ByteCache>,
        coalescer: RequestCoalescer,
        fetcher: Arc<dyn ResourceFetcher>,
        thumbnails: Arc<VideoThumbnailExtractor>,
        retry: RetryPolicy,
    ) -> Self {
        let coalescer = Arc::new(coalescer);
        let object_urls = Arc::new(ObjectUrlRegistry::new());
        let loader = Arc::new(ImageResourceLoader::new(
            Arc::clone(&cache),
            Arc::clone(&coalescer),
            fetcher,
            Arc::clone(&object_urls),
        ));

        Self {
            cache,
            coalescer,
            object_urls,
            loader,
            thumbnails,
            retry,
        }
    }

    /// Resolves an image URL to a renderable reference, without retries.
    ///
    /// # Errors
    /// Returns error if the image cannot be fetched or retained.
    pub async fn resolve(&self, url: &str) -> Result<RenderableRef, LoadError> {
        self.loader.resolve(url).await
    }

    /// Returns the bytes behind a live renderable reference.
    #[must_use]
    pub fn lookup(&self, renderable: &RenderableRef) -> Option<Bytes> {
        self.loader.lookup(renderable)
    }

    /// Releases a renderable reference handed out by [`Self::resolve`].
    pub fn revoke(&self, renderable: &RenderableRef) {
        self.loader.revoke(renderable);
    }

    /// Creates an idle image resource for one consumer.
    #[must_use]
    pub fn image(&self, url: impl Into<String>) -> ImageResource {
        ImageResource::new(Arc::clone(&self.loader), url, self.retry)
    }

    /// Returns the thumbnail for a video, extracting it on a miss.
    ///
    /// # Errors
    /// Returns error if extraction fails.
    pub async fn thumbnail(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        self.thumbnails.get(url).await
    }

    /// Extracts a thumbnail again, ignoring any stored one.
    ///
    /// # Errors
    /// Returns error if extraction fails.
    pub async fn refetch_thumbnail(&self, url: &str) -> Result<Thumbnail, ThumbnailError> {
        self.thumbnails.refetch(url).await
    }

    /// Creates an idle thumbnail handle for one consumer.
    #[must_use]
    pub fn thumbnail_handle(&self, url: impl Into<String>, fallback: Option<String>) -> ThumbnailHandle {
        ThumbnailHandle::new(Arc::clone(&self.thumbnails), url, self.retry, fallback)
    }

    /// Empties the byte cache and forgets every settled fetch.
    ///
    /// Renderable references issued before the call stop resolving.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        self.coalescer.clear_settled();
        let revoked = self.object_urls.revoke_all();
        info!(revoked = revoked, "Cleared media cache");
    }

    /// Removes every stored thumbnail. Returns how many were removed.
    pub async fn clear_thumbnails(&self) -> usize {
        self.thumbnails.clear().await
    }

    /// Returns byte cache occupancy.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Returns the number of stored thumbnails.
    pub async fn thumbnail_count(&self) -> usize {
        self.thumbnails.len().await
    }

    /// Sweeps expired byte cache entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let removed = self.cache.purge_expired().await;
        debug!(removed = removed, "Purged expired media");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::ThumbnailConfig;
    use crate::domain::ports::mocks::{ManualClock, MockResourceFetcher, SyntheticVideo};
    use crate::infrastructure::ByteCacheConfig;
    use crate::infrastructure::storage::MemoryStore;
    use std::time::Duration;

    const URL: &str = "https://cdn.example.com/contest/logo.png";

    fn service(fetcher: MockResourceFetcher, clock: Arc<ManualClock>) -> MediaService {
        let cache = Arc::new(ByteCache::new(
            ByteCacheConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&clock) as _,
        ));
        let thumbnails = Arc::new(VideoThumbnailExtractor::new(
            ThumbnailConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(SyntheticVideo::new(
                Duration::from_secs(10),
                vec![(Duration::ZERO, 128)],
            )),
            clock as _,
        ));
        MediaService::new(
            cache,
            RequestCoalescer::default(),
            Arc::new(fetcher),
            thumbnails,
            RetryPolicy::disabled(),
        )
    }

    fn fetcher(times: usize) -> MockResourceFetcher {
        let mut fetcher = MockResourceFetcher::new();
        fetcher
            .expect_fetch()
            .times(times)
            .returning(|_| Ok(Bytes::from_static(b"\x89PNG")));
        fetcher
    }

    #[tokio::test]
    async fn test_clear_cache_leaves_refs_dangling_and_refetches() {
        let media = service(fetcher(2), Arc::new(ManualClock::at(1_700_000_000)));

        let before = media.resolve(URL).await.unwrap();
        media.clear_cache().await;

        assert!(media.lookup(&before).is_none());
        assert_eq!(media.cache_stats().await, CacheStats::default());

        let after = media.resolve(URL).await.unwrap();
        assert_ne!(before, after);
        assert!(media.lookup(&after).is_some());

        media.clear_cache().await;
        media.clear_cache().await;
    }

    #[tokio::test]
    async fn test_stats_and_purge() {
        let clock = Arc::new(ManualClock::at(1_700_000_000));
        let media = service(fetcher(1), Arc::clone(&clock));

        media.resolve(URL).await.unwrap();
        let stats = media.cache_stats().await;
        assert_eq!(stats.memory_entry_count, 1);
        assert_eq!(stats.memory_byte_size, 4);
        assert_eq!(stats.persistent_entry_count, 1);

        clock.advance(Duration::from_secs(24 * 60 * 60 + 1));
        assert_eq!(media.purge_expired().await, 2);
        assert_eq!(media.cache_stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn test_image_resource_uses_shared_cache() {
        let media = service(fetcher(1), Arc::new(ManualClock::at(1_700_000_000)));
        let mut first = media.image(URL);
        let mut second = media.image(URL);

        assert!(first.load().await.is_loaded());
        assert!(second.load().await.is_loaded());
    }

    #[tokio::test]
    async fn test_thumbnail_roundtrip_through_facade() {
        let media = service(fetcher(0), Arc::new(ManualClock::at(1_700_000_000)));
        let video = "https://cdn.example.com/contest/intro.mp4";

        assert!(!media.thumbnail(video).await.unwrap().from_cache);
        assert!(media.thumbnail(video).await.unwrap().from_cache);
        assert_eq!(media.thumbnail_count().await, 1);

        let mut handle = media.thumbnail_handle(video, None);
        assert!(handle.load().await.thumbnail_url.is_some());

        assert_eq!(media.clear_thumbnails().await, 1);
        assert_eq!(media.thumbnail_count().await, 0);
    }
}
