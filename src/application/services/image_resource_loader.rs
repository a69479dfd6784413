//! Image loading: cache first, then one coalesced fetch per URL.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::domain::entities::{LoadStatus, RenderableRef, ResourceState};
use crate::domain::errors::LoadError;
use crate::domain::ports::ResourceFetcher;
use crate::infrastructure::{ByteCache, ObjectUrlRegistry};

use super::request_coalescer::RequestCoalescer;
use super::retry::{RetryPolicy, RetryState};

/// Resolves image URLs into renderable references.
///
/// Bytes always flow through the [`ByteCache`]; the coalescer only tracks
/// whether a fetch for a URL is running, done, or failed.
pub struct ImageResourceLoader {
    cache: Arc<ByteCache>,
    coalescer: Arc<RequestCoalescer>,
    fetcher: Arc<dyn ResourceFetcher>,
    object_urls: Arc<ObjectUrlRegistry>,
}

impl std::fmt::Debug for ImageResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResourceLoader")
            .field("cache", &self.cache)
            .field("coalescer", &self.coalescer)
            .finish_non_exhaustive()
    }
}

impl ImageResourceLoader {
    /// Creates a loader over shared services.
    #[must_use]
    pub fn new(
        cache: Arc<ByteCache>,
        coalescer: Arc<RequestCoalescer>,
        fetcher: Arc<dyn ResourceFetcher>,
        object_urls: Arc<ObjectUrlRegistry>,
    ) -> Self {
        Self {
            cache,
            coalescer,
            fetcher,
            object_urls,
        }
    }

    /// Returns the bytes for `url`, fetching them on a cache miss.
    ///
    /// # Errors
    /// Returns the fetch failure, or [`LoadError::NotRetained`] if the bytes
    /// were fetched but are no longer in the cache on read-back.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, LoadError> {
        if let Some(bytes) = self.cache.get(url).await {
            trace!(url = url, "Image served from cache");
            return Ok(bytes);
        }

        // A settled success only says the bytes were stored once; they may
        // since have been evicted, so read back and refetch once if needed.
        for round in 0..2 {
            self.coalesced_fetch(url).await?;

            if let Some(bytes) = self.cache.get(url).await {
                return Ok(bytes);
            }

            debug!(url = url, round = round, "Fetched image missing from cache");
            self.coalescer.forget(url);
        }

        warn!(url = url, "Image could not be retained in cache");
        Err(LoadError::not_retained(url))
    }

    async fn coalesced_fetch(&self, url: &str) -> Result<(), LoadError> {
        let cache = Arc::clone(&self.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let owned = url.to_string();

        self.coalescer
            .load(url, move || async move {
                let bytes = fetcher.fetch(&owned).await?;
                debug!(url = %owned, size = bytes.len(), "Fetched image");
                cache.put(&owned, bytes).await;
                Ok(())
            })
            .await
    }

    /// Resolves `url` to a fresh renderable reference.
    ///
    /// Every call issues a new reference; release it with [`Self::revoke`].
    ///
    /// # Errors
    /// See [`Self::fetch_bytes`].
    pub async fn resolve(&self, url: &str) -> Result<RenderableRef, LoadError> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(self.object_urls.create(bytes))
    }

    /// Drops the recorded fetch outcome for `url` so the next load refetches.
    pub fn forget(&self, url: &str) {
        self.coalescer.forget(url);
    }

    /// Releases a renderable reference.
    pub fn revoke(&self, renderable: &RenderableRef) {
        self.object_urls.revoke(renderable);
    }

    /// Returns the bytes behind a live renderable reference.
    #[must_use]
    pub fn lookup(&self, renderable: &RenderableRef) -> Option<Bytes> {
        self.object_urls.lookup(renderable)
    }
}

/// One consumer's view of an image.
///
/// Owns the renderable reference it was handed and revokes it on drop, on
/// reload, and when the URL changes.
pub struct ImageResource {
    loader: Arc<ImageResourceLoader>,
    url: String,
    retry: RetryState,
    state: watch::Sender<ResourceState>,
}

impl std::fmt::Debug for ImageResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageResource")
            .field("url", &self.url)
            .field("retry", &self.retry)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl ImageResource {
    /// Creates an idle resource for `url`.
    #[must_use]
    pub fn new(loader: Arc<ImageResourceLoader>, url: impl Into<String>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ResourceState::default());
        Self {
            loader,
            url: url.into(),
            retry: RetryState::new(policy),
            state,
        }
    }

    /// Returns the source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.state.subscribe()
    }

    /// Loads the image, retrying failures within the retry budget.
    ///
    /// Does nothing if already loaded.
    pub async fn load(&mut self) -> ResourceState {
        if self.state.borrow().is_loaded() {
            return self.state();
        }

        self.release();
        self.state.send_replace(ResourceState {
            status: LoadStatus::Loading,
            renderable_ref: None,
        });

        let loader = Arc::clone(&self.loader);
        let url = self.url.clone();
        let result = self
            .retry
            .run(
                || loader.resolve(&url),
                |_, _| {
                    // Retries must reach the network rather than the
                    // recorded failure.
                    loader.forget(&url);
                },
            )
            .await;

        let next = match result {
            Ok(renderable) => ResourceState {
                status: LoadStatus::Loaded,
                renderable_ref: Some(renderable),
            },
            Err(e) => {
                warn!(url = %self.url, error = %e, "Image load failed");
                ResourceState {
                    status: LoadStatus::Failed(e.to_string()),
                    renderable_ref: None,
                }
            }
        };
        self.state.send_replace(next);
        self.state()
    }

    /// Starts a new load lifecycle: fresh retry budget, no recorded failure.
    pub async fn reload(&mut self) -> ResourceState {
        debug!(url = %self.url, "Reloading image");
        self.release();
        self.state.send_replace(ResourceState::default());
        self.retry.reset();
        self.loader.forget(&self.url);
        self.load().await
    }

    /// Points the resource at another URL and loads it.
    pub async fn set_url(&mut self, url: impl Into<String>) -> ResourceState {
        let url = url.into();
        if url == self.url {
            return self.load().await;
        }

        self.release();
        self.state.send_replace(ResourceState::default());
        self.retry.reset();
        self.url = url;
        self.load().await
    }

    fn release(&self) {
        let previous = self.state.borrow().renderable_ref.clone();
        if let Some(renderable) = previous {
            self.loader.revoke(&renderable);
        }
    }
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        self.release();
    }
}
