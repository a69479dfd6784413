//! Port for fetching remote resources.

use bytes::Bytes;

use crate::domain::errors::LoadError;

/// Fetches the raw bytes behind a URL.
///
/// Non-success HTTP statuses are failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Downloads the resource.
    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError>;
}
