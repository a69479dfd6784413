//! Bounded in-memory tier of the byte cache.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::domain::entities::CacheEntry;

struct Slot {
    entry: CacheEntry,
    /// Insertion order, breaks `created_at` ties during eviction.
    seq: u64,
}

/// Memory tier with oldest-first, low-water-mark eviction.
///
/// Not synchronized; the byte cache keeps it behind a mutex.
pub struct MemoryTier {
    slots: HashMap<String, Slot>,
    total_bytes: usize,
    cap_bytes: usize,
    low_water_bytes: usize,
    next_seq: u64,
}

impl MemoryTier {
    /// Creates an empty tier. Eviction runs once usage exceeds `cap_bytes`
    /// and stops at `low_water_ratio * cap_bytes`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn new(cap_bytes: usize, low_water_ratio: f64) -> Self {
        let ratio = low_water_ratio.clamp(0.0, 1.0);
        Self {
            slots: HashMap::new(),
            total_bytes: 0,
            cap_bytes,
            low_water_bytes: (cap_bytes as f64 * ratio) as usize,
            next_seq: 0,
        }
    }

    /// Returns the payload for `key` unless missing or expired. Expired
    /// entries are removed.
    pub fn get(&mut self, key: &str, now: DateTime<Utc>, max_age: Duration) -> Option<Bytes> {
        let expired = self.slots.get(key)?.entry.is_expired(now, max_age);
        if expired {
            trace!(key = key, "Memory tier entry expired");
            self.remove(key);
            return None;
        }
        self.slots.get(key).map(|slot| slot.entry.payload.clone())
    }

    /// Inserts or replaces an entry, then evicts if over the cap.
    /// Returns the number of evicted entries.
    pub fn insert(&mut self, entry: CacheEntry) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.total_bytes += entry.byte_size;

        if let Some(old) = self.slots.insert(entry.key.clone(), Slot { entry, seq }) {
            self.total_bytes -= old.entry.byte_size;
        }

        self.evict_if_needed()
    }

    /// Removes an entry. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.total_bytes -= slot.entry.byte_size;
                true
            }
            None => false,
        }
    }

    /// Removes every entry older than `max_age`. Returns the number removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let expired: Vec<String> = self
            .slots
            .values()
            .filter(|slot| slot.entry.is_expired(now, max_age))
            .map(|slot| slot.entry.key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.total_bytes = 0;
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the tier holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the summed payload size.
    #[must_use]
    pub const fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Returns true if `key` is present, expired or not.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    fn evict_if_needed(&mut self) -> usize {
        if self.total_bytes <= self.cap_bytes {
            return 0;
        }

        debug!(
            total_bytes = self.total_bytes,
            cap_bytes = self.cap_bytes,
            "Memory tier over cap, evicting oldest entries"
        );

        let mut order: Vec<(DateTime<Utc>, u64, String)> = self
            .slots
            .values()
            .map(|slot| (slot.entry.created_at, slot.seq, slot.entry.key.clone()))
            .collect();
        order.sort();

        let mut evicted = 0;
        for (_, _, key) in order {
            if self.total_bytes <= self.low_water_bytes {
                break;
            }
            if self.remove(&key) {
                trace!(key = %key, "Evicted from memory tier");
                evicted += 1;
            }
        }

        debug!(
            evicted = evicted,
            total_bytes = self.total_bytes,
            "Memory tier eviction complete"
        );
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn entry(key: &str, size: usize, created: i64) -> CacheEntry {
        CacheEntry::new(key, Bytes::from(vec![0u8; size]), at(created))
    }

    #[test]
    fn test_insert_and_get() {
        let mut tier = MemoryTier::new(1_000, 0.8);
        tier.insert(entry("a", 100, 0));

        assert_eq!(tier.get("a", at(1), DAY).map(|b| b.len()), Some(100));
        assert_eq!(tier.total_bytes(), 100);
        assert!(tier.get("b", at(1), DAY).is_none());
    }

    #[test]
    fn test_replace_adjusts_total() {
        let mut tier = MemoryTier::new(1_000, 0.8);
        tier.insert(entry("a", 100, 0));
        tier.insert(entry("a", 40, 5));

        assert_eq!(tier.len(), 1);
        assert_eq!(tier.total_bytes(), 40);
    }

    #[test]
    fn test_evicts_oldest_until_low_water_mark() {
        let mut tier = MemoryTier::new(1_000, 0.8);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            tier.insert(entry(key, 250, i64::try_from(i).unwrap()));
        }
        assert_eq!(tier.total_bytes(), 1_000);

        let evicted = tier.insert(entry("e", 250, 10));

        // 1250 -> 1000 -> 750: two oldest go.
        assert_eq!(evicted, 2);
        assert!(!tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c") && tier.contains("d") && tier.contains("e"));
        assert!(tier.total_bytes() <= 800);
    }

    #[test]
    fn test_eviction_orders_by_created_at_not_insertion() {
        let mut tier = MemoryTier::new(100, 0.8);
        tier.insert(entry("new", 50, 100));
        tier.insert(entry("old", 50, 1));

        tier.insert(entry("newest", 10, 200));

        assert!(!tier.contains("old"));
        assert!(tier.contains("new"));
        assert!(tier.contains("newest"));
    }

    #[test]
    fn test_at_cap_does_not_evict() {
        let mut tier = MemoryTier::new(100, 0.8);
        assert_eq!(tier.insert(entry("a", 100, 0)), 0);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let mut tier = MemoryTier::new(1_000, 0.8);
        tier.insert(entry("a", 10, 0));

        assert!(tier.get("a", at(61), Duration::from_secs(60)).is_none());
        assert!(!tier.contains("a"));
        assert_eq!(tier.total_bytes(), 0);
    }

    #[test]
    fn test_purge_expired() {
        let mut tier = MemoryTier::new(1_000, 0.8);
        tier.insert(entry("old", 10, 0));
        tier.insert(entry("fresh", 10, 100));

        assert_eq!(tier.purge_expired(at(120), Duration::from_secs(60)), 1);
        assert!(tier.contains("fresh"));
        assert_eq!(tier.total_bytes(), 10);
    }
}
