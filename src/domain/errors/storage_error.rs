//! Persistent storage error types.

use thiserror::Error;

/// Failures of a key/value store backing a persistent cache.
///
/// These never reach callers of the caches: they are logged and treated as
/// a miss at the cache boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would exceed the store's quota.
    #[error("storage quota exceeded: {needed} bytes requested, {available} available")]
    QuotaExceeded {
        /// Bytes the write required.
        needed: usize,
        /// Bytes left under the quota.
        available: usize,
    },

    /// Storage is disabled or cannot be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored record parsed but its contents are invalid.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}
