//! In-process key/value store with an optional byte quota.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::domain::errors::StorageError;
use crate::domain::ports::KeyValueStore;

/// Key/value store held in memory.
///
/// Behaves like browser-style storage: writes that would push the summed
/// key and value lengths over the quota are rejected, and the whole store
/// can be switched off.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    disabled: AtomicBool,
}

impl MemoryStore {
    /// Creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `quota_bytes`.
    #[must_use]
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Enables or disables the store. A disabled store fails every call.
    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Relaxed);
    }

    /// Returns the bytes counted against the quota.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    fn check_enabled(&self) -> Result<(), StorageError> {
        if self.disabled.load(Ordering::Relaxed) {
            return Err(StorageError::Unavailable("storage disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_enabled()?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_enabled()?;
        let mut entries = self.entries.write();

        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + value.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded { needed, available });
            }
        }

        trace!(key = key, size = value.len(), "Stored value in memory store");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_enabled()?;
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.check_enabled()?;
        Ok(self.entries.read().keys().cloned().collect())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        self.check_enabled()?;
        Ok(self.entries.read().len())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.check_enabled()?;
        self.entries.write().clear();
        Ok(())
    }
}
