//! Configuration file discovery and loading.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Failures reading or writing the configuration file.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ConfigError {
    #[error("no platform config directory available")]
    ConfigDirNotFound,
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write default config: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Finds the configuration file, writing one with defaults on first run.
#[derive(Debug)]
pub struct ConfigManager {
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the platform config directory, or the directory of
    /// `path_override` when the platform has none.
    ///
    /// # Errors
    /// Returns error if neither directory is available.
    pub fn discover(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        Self::locate(AppConfig::default_config_dir(), path_override)
    }

    fn locate(
        platform_dir: Option<PathBuf>,
        path_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        platform_dir
            .or_else(|| {
                path_override
                    .and_then(Path::parent)
                    .map(Path::to_path_buf)
            })
            .map(Self::with_dir)
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Uses `config_dir` instead of the platform directory.
    #[must_use]
    pub const fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// Returns the configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Reads the configuration from `path_override` or the default location.
    ///
    /// A missing file is created with defaults. A file that does not parse
    /// is left alone and defaults are used.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or the defaults cannot be
    /// written.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let path = path_override.map_or_else(
            || self.config_dir.join(CONFIG_FILE_NAME),
            Path::to_path_buf,
        );

        if !path.exists() {
            let config = AppConfig::default();
            write_atomically(&path, &toml::to_string_pretty(&config)?)?;
            info!(path = %path.display(), "Wrote default configuration");
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        toml::from_str::<AppConfig>(&content).map_or_else(
            |e| {
                warn!(path = %path.display(), error = %e, "Malformed configuration, using defaults");
                Ok(AppConfig::default())
            },
            |config| {
                debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            },
        )
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<(), ConfigError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(content.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
