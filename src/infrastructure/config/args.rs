//! Command-line arguments.

use super::app_config::{LogLevel, StorageBackend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments. Options given here override the config file.
#[derive(Debug, Parser)]
#[command(
    name = "contest-media",
    version,
    about = "Image and video thumbnail cache for the contest manager",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Directory of the persistent caches.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Persistent storage backend.
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Automatic retries after a failed load.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Delay between retries in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Thumbnail cache version tag.
    #[arg(long)]
    pub thumbnail_version: Option<String>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Cache operations exposed on the command line.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve image URLs through the cache.
    Resolve {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Extract (or look up) the thumbnail of a video.
    Thumbnail {
        /// Video URL.
        url: String,

        /// Drop the cached thumbnail before extracting.
        #[arg(long)]
        refetch: bool,

        /// Reference to show if extraction fails.
        #[arg(long, value_name = "REF")]
        fallback: Option<String>,

        /// Write the JPEG to this file.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show cache occupancy.
    Stats,

    /// Empty the image cache.
    Clear {
        /// Also drop cached video thumbnails.
        #[arg(long)]
        thumbnails: bool,
    },

    /// Remove expired entries.
    Purge,
}
