//! Video decoding and thumbnail error types.

use thiserror::Error;

/// Failures of the frame extraction primitive.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum MediaError {
    #[error("failed to open {url}: {message}")]
    Open { url: String, message: String },

    #[error("failed to seek to {offset_ms}ms: {message}")]
    Seek { offset_ms: u128, message: String },

    #[error("failed to decode frame: {0}")]
    Decode(String),
}

/// Failures of the thumbnail pipeline as a whole.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum ThumbnailError {
    #[error("extraction failed: {0}")]
    Media(#[from] MediaError),

    #[error("failed to encode thumbnail: {0}")]
    Encode(String),

    #[error("extraction aborted: {0}")]
    Aborted(String),
}

impl MediaError {
    /// Creates open error.
    #[must_use]
    pub fn open(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates seek error.
    #[must_use]
    pub fn seek(offset: std::time::Duration, message: impl Into<String>) -> Self {
        Self::Seek {
            offset_ms: offset.as_millis(),
            message: message.into(),
        }
    }
}
