//! Configuration handling.
//!
//! Settings live in a YAML file under the user's config directory
//! (`ontrack/config.yaml`). Everything is optional; a missing file means
//! all defaults, and the database lands in the user's data directory.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name within the config directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Application directory name under the platform config/data dirs.
pub const APP_DIR: &str = "ontrack";

/// User-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Explicit database path. None means the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Telegram bot token for overdue escalations. None disables Telegram
    /// delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    /// How many upcoming tasks dashboards show.
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_limit: u32,
}

const fn default_upcoming_limit() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self { db_path: None, telegram_bot_token: None, upcoming_limit: default_upcoming_limit() }
    }
}

impl Config {
    /// Load config from the default location, returning None if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Option<Self>> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load config from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(Some(config))
    }

    /// Save config to a specific file path, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// The default config file path for this platform, if one exists.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Resolve the database path: the configured one, else the platform
    /// data directory, else the current directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        if let Some(ref path) = self.db_path {
            return path.clone();
        }
        dirs::data_dir()
            .map_or_else(|| PathBuf::from("ontrack.db"), |dir| dir.join(APP_DIR).join("ontrack.db"))
    }
}
