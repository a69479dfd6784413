//! HTTP adapter for fetching resource bytes.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::domain::errors::LoadError;
use crate::domain::ports::ResourceFetcher;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches resources over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| LoadError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, LoadError> {
        debug!(url = url, "Fetching resource");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::http_status(status.as_u16(), url));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::network(format!("Failed to read body: {e}")))?;

        debug!(url = url, size = bytes.len(), "Fetched resource");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        assert!(HttpFetcher::new(DEFAULT_TIMEOUT, "contest-media/test").is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2), "contest-media/test").unwrap();

        let err = fetcher.fetch("http://127.0.0.1:9/img.png").await.unwrap_err();

        assert!(matches!(err, LoadError::Network { .. }));
    }
}
