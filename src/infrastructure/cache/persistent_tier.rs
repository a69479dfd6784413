//! Persistent tier of the byte cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheEntry, PersistedEntry, is_expired};
use crate::domain::errors::StorageError;
use crate::domain::ports::KeyValueStore;

/// Key prefix separating byte cache records from anything else in the store.
const KEY_PREFIX: &str = "image:";

/// Persistent tier over a key/value store.
///
/// Every storage failure is logged and reported as a miss; nothing here
/// returns an error.
pub struct PersistentTier {
    store: Arc<dyn KeyValueStore>,
    max_entry_bytes: usize,
}

impl PersistentTier {
    /// Creates a tier admitting payloads smaller than `max_entry_bytes`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, max_entry_bytes: usize) -> Self {
        Self {
            store,
            max_entry_bytes,
        }
    }

    fn store_key(url: &str) -> String {
        format!("{KEY_PREFIX}{url}")
    }

    /// Returns true if a payload of `byte_size` bytes may be persisted.
    #[must_use]
    pub const fn admits(&self, byte_size: usize) -> bool {
        byte_size < self.max_entry_bytes
    }

    /// Reads an unexpired entry. Expired or unreadable records are deleted.
    pub async fn get(&self, url: &str, now: DateTime<Utc>, max_age: Duration) -> Option<CacheEntry> {
        let key = Self::store_key(url);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!(url = url, "Persistent tier miss");
                return None;
            }
            Err(e) => {
                warn!(url = url, error = %e, "Persistent tier read failed");
                return None;
            }
        };

        let entry = match Self::decode(url, &raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = url, error = %e, "Discarding unreadable persistent entry");
                self.delete(&key).await;
                return None;
            }
        };

        if entry.is_expired(now, max_age) {
            trace!(url = url, "Persistent tier entry expired");
            self.delete(&key).await;
            return None;
        }

        trace!(url = url, size = entry.byte_size, "Persistent tier hit");
        Some(entry)
    }

    fn decode(url: &str, raw: &str) -> Result<CacheEntry, StorageError> {
        serde_json::from_str::<PersistedEntry>(raw)?.into_entry(url)
    }

    /// Persists an entry if it passes the size gate. A rejected entry also
    /// drops any older record for the same URL. Returns true if written.
    pub async fn put(&self, entry: &CacheEntry) -> bool {
        let key = Self::store_key(&entry.key);

        if !self.admits(entry.byte_size) {
            debug!(
                url = %entry.key,
                size = entry.byte_size,
                max = self.max_entry_bytes,
                "Payload too large for persistent tier, keeping in memory only"
            );
            self.delete(&key).await;
            return false;
        }

        let raw = match serde_json::to_string(&PersistedEntry::from_entry(entry)) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url = %entry.key, error = %e, "Failed to serialize persistent entry");
                return false;
            }
        };

        match self.store.set(&key, &raw).await {
            Ok(()) => {
                trace!(url = %entry.key, size = entry.byte_size, "Stored entry in persistent tier");
                true
            }
            Err(e) => {
                warn!(url = %entry.key, error = %e, "Persistent tier write failed");
                false
            }
        }
    }

    /// Removes the entry for `url`.
    pub async fn remove(&self, url: &str) {
        self.delete(&Self::store_key(url)).await;
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(key = key, error = %e, "Persistent tier delete failed");
        }
    }

    async fn own_keys(&self) -> Vec<String> {
        match self.store.keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(KEY_PREFIX))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list persistent tier keys");
                Vec::new()
            }
        }
    }

    /// Returns the number of persisted entries, or zero if storage fails.
    pub async fn len(&self) -> usize {
        self.own_keys().await.len()
    }

    /// Removes every persisted entry.
    pub async fn clear(&self) {
        for key in self.own_keys().await {
            self.delete(&key).await;
        }
        debug!("Cleared persistent tier");
    }

    /// Deletes expired or unreadable entries. Returns the number removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let mut removed = 0;

        for key in self.own_keys().await {
            let raw = match self.store.get(&key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Persistent tier read failed during purge");
                    continue;
                }
            };

            let keep = serde_json::from_str::<PersistedEntry>(&raw)
                .is_ok_and(|record| !is_expired(record.created_at, now, max_age));
            if !keep {
                self.delete(&key).await;
                removed += 1;
            }
        }

        removed
    }
}
