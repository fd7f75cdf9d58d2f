//! Error types for collaborator and configuration failures
//!
//! None of these reach callers of the cache: the record and worker code
//! log them and degrade to defaults.

use std::path::PathBuf;

use thiserror::Error;

/// Error from a filesystem collaborator.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path does not exist
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Underlying I/O failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Path exists but isn't something this filesystem can open
    #[error("unsupported game path: {}", .0.display())]
    Unsupported(PathBuf),
    /// Deletion refused or failed
    #[error("failed to delete {}", .0.display())]
    DeleteFailed(PathBuf),
}

impl FsError {
    /// Map an `io::Error` for `path`, folding `NotFound` into its own variant.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }
}

/// Error loading or saving `gameinfo.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
