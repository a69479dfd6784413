//! Cached byte entries and their persisted representation.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::StorageError;

/// Raw bytes of a fetched resource, keyed by its source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Source URL, used verbatim.
    pub key: String,
    /// Fetched bytes.
    pub payload: Bytes,
    /// Time of the network fetch that produced the payload.
    pub created_at: DateTime<Utc>,
    /// Size of `payload` in bytes.
    pub byte_size: usize,
}

impl CacheEntry {
    /// Creates an entry for a fresh fetch.
    #[must_use]
    pub fn new(key: impl Into<String>, payload: Bytes, created_at: DateTime<Utc>) -> Self {
        let byte_size = payload.len();
        Self {
            key: key.into(),
            payload,
            created_at,
            byte_size,
        }
    }

    /// Returns true once the entry is older than `max_age`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        is_expired(self.created_at, now, max_age)
    }
}

/// Returns true if something created at `created_at` is older than `max_age`.
#[must_use]
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(created_at) > max_age
}

/// Serialized form of a [`CacheEntry`] in a string-valued store.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedEntry {
    /// Insertion time of the original entry.
    pub created_at: DateTime<Utc>,
    /// Payload length, checked against the decoded payload.
    pub byte_size: usize,
    /// Base64 encoded payload.
    pub payload: String,
}

impl PersistedEntry {
    /// Builds the persisted form of an entry.
    #[must_use]
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            created_at: entry.created_at,
            byte_size: entry.byte_size,
            payload: STANDARD.encode(&entry.payload),
        }
    }

    /// Decodes the stored payload back into an entry.
    ///
    /// # Errors
    /// Returns error if the payload is not valid base64 or its length does
    /// not match the recorded size.
    pub fn into_entry(self, key: impl Into<String>) -> Result<CacheEntry, StorageError> {
        let payload = STANDARD
            .decode(self.payload.as_bytes())
            .map_err(|e| StorageError::Corrupt(format!("invalid payload encoding: {e}")))?;

        if payload.len() != self.byte_size {
            return Err(StorageError::Corrupt(format!(
                "payload is {} bytes, record says {}",
                payload.len(),
                self.byte_size
            )));
        }

        Ok(CacheEntry::new(key, Bytes::from(payload), self.created_at))
    }
}

/// Identity of a cached video thumbnail.
///
/// Bumping `cache_version` gives every URL a fresh key, which invalidates
/// all previously stored thumbnails without a migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    /// Invalidation tag.
    pub cache_version: String,
    /// Source video URL.
    pub video_url: String,
}

impl ThumbnailKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(cache_version: impl Into<String>, video_url: impl Into<String>) -> Self {
        Self {
            cache_version: cache_version.into(),
            video_url: video_url.into(),
        }
    }

    /// Returns the key used in the thumbnail store.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("thumbnail:{}:{}", self.cache_version, self.video_url)
    }
}

impl std::fmt::Display for ThumbnailKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.video_url, self.cache_version)
    }
}

/// A stored thumbnail. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailCacheEntry {
    /// Encoded still image as a `data:` URL.
    pub data_url: String,
    /// Offset of the selected frame in milliseconds.
    pub offset_ms: u64,
    /// Time the thumbnail was extracted.
    pub created_at: DateTime<Utc>,
}

impl ThumbnailCacheEntry {
    /// Returns true once the entry is older than `max_age`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        is_expired(self.created_at, now, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_expiry_is_strictly_after_max_age() {
        let entry = CacheEntry::new("https://x/a.png", Bytes::from_static(b"a"), at(1_000));
        let max_age = Duration::from_secs(60);

        assert!(!entry.is_expired(at(1_059), max_age));
        assert!(!entry.is_expired(at(1_060), max_age));
        assert!(entry.is_expired(at(1_061), max_age));
    }

    #[test]
    fn test_persisted_entry_keeps_bytes_and_timestamp() {
        let entry = CacheEntry::new("k", Bytes::from(vec![0u8, 255, 7, 42]), at(5));
        let json = serde_json::to_string(&PersistedEntry::from_entry(&entry)).unwrap();

        let restored = serde_json::from_str::<PersistedEntry>(&json)
            .unwrap()
            .into_entry("k")
            .unwrap();

        assert_eq!(restored, entry);
    }

    #[test]
    fn test_persisted_entry_rejects_size_mismatch() {
        let record = PersistedEntry {
            created_at: at(0),
            byte_size: 10,
            payload: STANDARD.encode(b"abc"),
        };

        assert!(matches!(
            record.into_entry("k"),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_thumbnail_keys_differ_by_version() {
        let v1 = ThumbnailKey::new("v1", "https://x/clip.mp4");
        let v2 = ThumbnailKey::new("v2", "https://x/clip.mp4");

        assert_ne!(v1.storage_key(), v2.storage_key());
        assert_eq!(v1.storage_key(), "thumbnail:v1:https://x/clip.mp4");
    }
}
