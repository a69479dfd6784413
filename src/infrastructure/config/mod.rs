//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{
    AppConfig, CacheConfig, CoalescerConfig, HttpConfig, LogLevel, RetryConfig,
    StorageBackend, ThumbnailSettings,
};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, ConfigManager};
