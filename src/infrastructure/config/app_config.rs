//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::args::CliArgs;

pub(crate) const APP_NAME: &str = "contest-media";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Backend of the persistent caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per entry under the cache directory.
    #[default]
    File,
    /// Process memory; nothing survives a restart.
    Memory,
}

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Byte cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Request coalescing configuration.
    #[serde(default)]
    pub coalescer: CoalescerConfig,

    /// Video thumbnail configuration.
    #[serde(default)]
    pub thumbnail: ThumbnailSettings,

    /// HTTP client configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Byte cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory tier cap in bytes.
    #[serde(default = "default_memory_cap_bytes")]
    pub memory_cap_bytes: usize,

    /// Fraction of the cap eviction stops at.
    #[serde(default = "default_low_water_ratio")]
    pub low_water_ratio: f64,

    /// Entry lifetime in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Payloads at or above this size are not persisted.
    #[serde(default = "default_persist_max_entry_bytes")]
    pub persist_max_entry_bytes: usize,

    /// Directory of the persistent caches. Defaults to the platform cache
    /// directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Persistent storage backend.
    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_cap_bytes: default_memory_cap_bytes(),
            low_water_ratio: default_low_water_ratio(),
            max_age_secs: default_max_age_secs(),
            persist_max_entry_bytes: default_persist_max_entry_bytes(),
            cache_dir: None,
            backend: StorageBackend::default(),
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Automatic retries after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Request coalescing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerConfig {
    /// Seconds a failed fetch is remembered before a new load refetches.
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            failure_ttl_secs: default_failure_ttl_secs(),
        }
    }
}

/// Video thumbnail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailSettings {
    /// Invalidation tag embedded in every thumbnail key.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Raster width.
    #[serde(default = "default_thumbnail_width")]
    pub width: u32,

    /// Raster height.
    #[serde(default = "default_thumbnail_height")]
    pub height: u32,

    /// Frames with mean luma below this are skipped while candidates remain.
    #[serde(default = "default_brightness_threshold")]
    pub brightness_threshold: f64,

    /// Candidate frame offsets in milliseconds, tried in order.
    #[serde(default = "default_offsets_ms")]
    pub offsets_ms: Vec<u64>,

    /// JPEG quality, 0.0-1.0.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: f32,

    /// Thumbnail lifetime in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// `ffmpeg` binary.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    /// `ffprobe` binary.
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            cache_version: default_cache_version(),
            width: default_thumbnail_width(),
            height: default_thumbnail_height(),
            brightness_threshold: default_brightness_threshold(),
            offsets_ms: default_offsets_ms(),
            jpeg_quality: default_jpeg_quality(),
            max_age_secs: default_max_age_secs(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_memory_cap_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_low_water_ratio() -> f64 {
    0.8
}

fn default_max_age_secs() -> u64 {
    24 * 60 * 60
}

fn default_persist_max_entry_bytes() -> usize {
    1024 * 1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_failure_ttl_secs() -> u64 {
    5 * 60
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_thumbnail_width() -> u32 {
    320
}

fn default_thumbnail_height() -> u32 {
    180
}

fn default_brightness_threshold() -> f64 {
    50.0
}

fn default_offsets_ms() -> Vec<u64> {
    vec![500, 1000, 2000, 5000]
}

fn default_jpeg_quality() -> f32 {
    0.9
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.cache_dir = Some(cache_dir.clone());
        }
        if let Some(backend) = args.backend {
            self.cache.backend = backend;
        }
        if let Some(max_retries) = args.max_retries {
            self.retry.max_retries = max_retries;
        }
        if let Some(delay_ms) = args.retry_delay_ms {
            self.retry.delay_ms = delay_ms;
        }
        if let Some(version) = &args.thumbnail_version {
            self.thumbnail.cache_version = version.clone();
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("contest-media.log"))
    }

    /// Returns default cache directory.
    #[must_use]
    pub fn default_cache_dir() -> PathBuf {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
            || std::env::temp_dir().join(APP_NAME).join("cache"),
            |dirs| dirs.cache_dir().to_path_buf(),
        )
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns effective cache directory.
    #[must_use]
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache
            .cache_dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }
}
