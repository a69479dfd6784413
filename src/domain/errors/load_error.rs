//! Resource load error types.

use thiserror::Error;

/// Failure to obtain the bytes of a remote resource.
///
/// Cloneable because a single coalesced fetch hands the same outcome to every
/// caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("request failed: {message}")]
    Network { message: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("resource fetched but no longer cached: {url}")]
    NotRetained { url: String },

    #[error("load aborted: {message}")]
    Aborted { message: String },
}

impl LoadError {
    /// Creates network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates HTTP status error.
    #[must_use]
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    /// Creates not-retained error.
    #[must_use]
    pub fn not_retained(url: impl Into<String>) -> Self {
        Self::NotRetained { url: url.into() }
    }

    /// Creates aborted error.
    #[must_use]
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::Aborted {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status_and_url() {
        let err = LoadError::http_status(404, "https://x/img.png");
        assert_eq!(err.to_string(), "HTTP 404 for https://x/img.png");
    }
}
