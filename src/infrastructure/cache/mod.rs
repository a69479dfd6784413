//! Byte cache: a bounded memory tier backed by a persistent tier.

pub mod byte_cache;
pub mod memory_tier;
pub mod persistent_tier;

pub use byte_cache::{ByteCache, ByteCacheConfig, CacheStats};
pub use memory_tier::MemoryTier;
pub use persistent_tier::PersistentTier;
