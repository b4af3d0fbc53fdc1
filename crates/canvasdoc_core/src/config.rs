//! Configuration for the store registry.
//!
//! [`Config`] holds the persistence and conflict-check settings. It is
//! persisted as TOML (typically at `~/.config/canvasdoc/config.toml` on Unix
//! systems); missing keys fall back to their defaults.
//!
//! # Example
//!
//! ```ignore
//! use canvasdoc_core::config::Config;
//!
//! let config = Config::from_toml_str("save_delay_ms = 250")?;
//! assert_eq!(config.save_delay(), std::time::Duration::from_millis(250));
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CanvasDocError, Result};

fn default_save_delay_ms() -> u64 {
    500
}

fn default_max_save_wait_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// User-configurable settings of the store registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Quiet period after the last change before the document is saved.
    /// `0` saves on every change.
    #[serde(default = "default_save_delay_ms")]
    pub save_delay_ms: u64,

    /// Upper bound on how long a save can be postponed by a continuous
    /// stream of changes.
    #[serde(default = "default_max_save_wait_ms")]
    pub max_save_wait_ms: u64,

    /// Save immediately on the first change after an idle period.
    #[serde(default = "default_true")]
    pub leading_save: bool,

    /// Look for stale state left by the previous storage scheme when a
    /// document is first opened.
    #[serde(default = "default_true")]
    pub check_legacy_state: bool,

    /// Version stamped into newly created documents.
    #[serde(default = "default_app_version")]
    pub app_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            save_delay_ms: default_save_delay_ms(),
            max_save_wait_ms: default_max_save_wait_ms(),
            leading_save: true,
            check_legacy_state: true,
            app_version: default_app_version(),
        }
    }
}

impl Config {
    /// Debounce window for saves.
    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    /// Maximum coalescing window for saves. Never shorter than the delay.
    pub fn max_save_wait(&self) -> Duration {
        Duration::from_millis(self.max_save_wait_ms.max(self.save_delay_ms))
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Render the config as TOML text.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Default location of the config file.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("canvasdoc").join("config.toml"))
            .ok_or(CanvasDocError::NoConfigDir)
    }

    /// Load a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(CanvasDocError::FileRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write the config file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
