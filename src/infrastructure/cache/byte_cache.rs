//! Two-tier byte cache keyed by source URL.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::domain::entities::CacheEntry;
use crate::domain::ports::{Clock, KeyValueStore};

use super::memory_tier::MemoryTier;
use super::persistent_tier::PersistentTier;

/// Default memory tier cap (50 MB).
pub const DEFAULT_MEMORY_CAP_BYTES: usize = 50 * 1024 * 1024;
/// Default low-water mark as a fraction of the memory cap.
pub const DEFAULT_LOW_WATER_RATIO: f64 = 0.8;
/// Default entry lifetime (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
/// Payloads at or above this size stay memory-only (1 MB).
pub const DEFAULT_PERSIST_MAX_ENTRY_BYTES: usize = 1024 * 1024;

/// Configuration for the byte cache.
#[derive(Debug, Clone)]
pub struct ByteCacheConfig {
    /// Memory tier cap in bytes.
    pub memory_cap_bytes: usize,
    /// Fraction of the cap eviction stops at.
    pub low_water_ratio: f64,
    /// Age after which entries are treated as absent.
    pub max_age: Duration,
    /// Exclusive upper bound on persisted payload size.
    pub persist_max_entry_bytes: usize,
}

impl Default for ByteCacheConfig {
    fn default() -> Self {
        Self {
            memory_cap_bytes: DEFAULT_MEMORY_CAP_BYTES,
            low_water_ratio: DEFAULT_LOW_WATER_RATIO,
            max_age: DEFAULT_MAX_AGE,
            persist_max_entry_bytes: DEFAULT_PERSIST_MAX_ENTRY_BYTES,
        }
    }
}

/// Snapshot of cache occupancy for a cache inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Entries in the memory tier.
    pub memory_entry_count: usize,
    /// Summed payload size of the memory tier.
    pub memory_byte_size: usize,
    /// Entries in the persistent tier.
    pub persistent_entry_count: usize,
}

impl std::fmt::Display for CacheStats {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} in memory ({:.1} MB), {} persisted",
            self.memory_entry_count,
            self.memory_byte_size as f64 / (1024.0 * 1024.0),
            self.persistent_entry_count
        )
    }
}

/// Bounded memory tier in front of a larger persistent tier.
///
/// The memory tier is authoritative: it keeps working when persistent
/// storage is unavailable.
pub struct ByteCache {
    memory: Mutex<MemoryTier>,
    persistent: PersistentTier,
    clock: Arc<dyn Clock>,
    config: ByteCacheConfig,
}

impl std::fmt::Debug for ByteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ByteCache {
    /// Creates a cache persisting into `store`.
    #[must_use]
    pub fn new(
        config: ByteCacheConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(
                config.memory_cap_bytes,
                config.low_water_ratio,
            )),
            persistent: PersistentTier::new(store, config.persist_max_entry_bytes),
            clock,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ByteCacheConfig {
        &self.config
    }

    /// Returns the bytes for `url`, checking memory first.
    ///
    /// A persistent hit is promoted into memory with its original creation
    /// time, so it expires on the same schedule.
    pub async fn get(&self, url: &str) -> Option<Bytes> {
        let now = self.clock.now();

        let hit = self.memory.lock().get(url, now, self.config.max_age);
        if let Some(bytes) = hit {
            trace!(url = url, "Memory cache hit");
            return Some(bytes);
        }

        let entry = self.persistent.get(url, now, self.config.max_age).await?;
        let payload = entry.payload.clone();
        self.memory.lock().insert(entry);
        debug!(url = url, size = payload.len(), "Promoted persistent entry to memory");
        Some(payload)
    }

    /// Stores freshly fetched bytes.
    ///
    /// Always goes into memory; only payloads under the per-entry limit are
    /// also persisted.
    pub async fn put(&self, url: &str, bytes: Bytes) {
        let entry = CacheEntry::new(url, bytes, self.clock.now());

        let evicted = self.memory.lock().insert(entry.clone());
        if evicted > 0 {
            debug!(url = url, evicted = evicted, "Memory eviction after insert");
        }

        self.persistent.put(&entry).await;
    }

    /// Removes `url` from both tiers.
    pub async fn remove(&self, url: &str) {
        self.memory.lock().remove(url);
        self.persistent.remove(url).await;
    }

    /// Empties both tiers. Safe to call repeatedly.
    pub async fn clear(&self) {
        self.memory.lock().clear();
        self.persistent.clear().await;
        info!("Cleared byte cache");
    }

    /// Sweeps expired entries from both tiers. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let from_memory = self.memory.lock().purge_expired(now, self.config.max_age);
        let from_storage = self.persistent.purge_expired(now, self.config.max_age).await;

        if from_memory + from_storage > 0 {
            debug!(
                memory = from_memory,
                persistent = from_storage,
                "Purged expired cache entries"
            );
        }
        from_memory + from_storage
    }

    /// Returns a read-only occupancy snapshot.
    pub async fn stats(&self) -> CacheStats {
        let (memory_entry_count, memory_byte_size) = {
            let memory = self.memory.lock();
            (memory.len(), memory.total_bytes())
        };

        CacheStats {
            memory_entry_count,
            memory_byte_size,
            persistent_entry_count: self.persistent.len().await,
        }
    }

    /// Returns true if `url` is in the memory tier.
    #[must_use]
    pub fn in_memory(&self, url: &str) -> bool {
        self.memory.lock().contains(url)
    }
}
