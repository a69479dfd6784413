//! Infrastructure layer with cache tiers and adapters for external services.

/// Byte cache tiers.
pub mod cache;
/// Application configuration.
pub mod config;
/// HTTP resource fetching.
pub mod http_fetcher;
/// Video frame extraction and encoding.
pub mod media;
/// Object URL registry.
pub mod object_urls;
/// Key/value store adapters.
pub mod storage;

pub use cache::{ByteCache, ByteCacheConfig, CacheStats};
pub use config::{AppConfig, CliArgs, Command, ConfigManager, LogLevel, StorageBackend};
pub use http_fetcher::HttpFetcher;
pub use media::FfmpegFrameExtractor;
pub use object_urls::ObjectUrlRegistry;
pub use storage::{FileStore, MemoryStore};
