//! Cache configuration (~/.config/Nethercore/gameinfo.toml)
//!
//! Optional; every field has a default and a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::ConfigError;

/// Game info cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of loader threads (default: 1, minimum: 1)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Worker thread name prefix (default: "gameinfo")
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Upload textures for bytes loaded without a draw context when a later
    /// `get_info` call supplies one (default: true)
    #[serde(default = "default_true")]
    pub upload_textures_on_poll: bool,
}

fn default_worker_threads() -> usize {
    1
}
fn default_thread_name() -> String {
    "gameinfo".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
            upload_textures_on_poll: default_true(),
        }
    }
}

impl CacheConfig {
    /// Worker count with the minimum applied.
    pub fn effective_workers(&self) -> usize {
        self.worker_threads.max(1)
    }
}

/// Returns the path of `gameinfo.toml` in the platform config directory.
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.nethercore", "", "Nethercore")
        .map(|dirs| dirs.config_dir().join("gameinfo.toml"))
}

/// Returns the platform data directory holding saves, install data and
/// per-game configs.
///
/// Returns `None` if the home directory cannot be determined.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.nethercore", "", "Nethercore")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
///
/// Returns defaults if the file doesn't exist or cannot be parsed.
pub fn load() -> CacheConfig {
    let Some(path) = config_path() else {
        return CacheConfig::default();
    };
    if !path.exists() {
        return CacheConfig::default();
    }
    load_from(&path).unwrap_or_else(|e| {
        warn!("{}; using defaults", e);
        CacheConfig::default()
    })
}

/// Loads the configuration from a specific file.
pub fn load_from(path: &Path) -> Result<CacheConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves the configuration, creating parent directories as needed.
pub fn save_to(path: &Path, config: &CacheConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(write_err)?;
    }
    std::fs::write(path, content).map_err(write_err)
}
