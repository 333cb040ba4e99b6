//! Supervisor settings management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the user config directory
pub const APP_DIR_NAME: &str = "startupctl";

/// Settings file name inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Global settings, read from `settings.json` in the data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between reconciliation ticks
    pub tick_interval_secs: u64,
    /// Custom data directory
    pub data_directory: Option<PathBuf>,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
            data_directory: None,
            debug_logging: false,
        }
    }
}

impl Settings {
    /// Default data directory: `<user config dir>/startupctl`
    pub fn default_data_directory() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    /// Read settings from `data_dir`. A missing file gives the defaults;
    /// an unreadable or malformed one is an error.
    pub fn read(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.validate();
        Ok(settings)
    }

    /// Get the data directory, using default if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory
            .clone()
            .unwrap_or_else(Self::default_data_directory)
    }

    /// Get the app configs directory
    pub fn get_apps_directory(&self) -> PathBuf {
        self.get_data_directory().join("apps")
    }

    /// Get the shared log file
    pub fn get_log_file(&self) -> PathBuf {
        self.get_data_directory().join("log.txt")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.tick_interval_secs = self.tick_interval_secs.max(1);
    }
}
