//! Collaborators for games installed as plain directories
//!
//! Layout:
//! - A game is a directory holding `manifest.json` and, optionally,
//!   `icon.png`, `background.png`, `background2.png` and `sound.wav`.
//! - Save data lives in `<saves_root>/<ID>*` directories, install data in
//!   `<install_root>/<ID>*`.
//! - Per-game config overrides are `<config_root>/<ID>.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::backend::{GameFile, GameFileSystem, MetadataParser};
use crate::error::FsError;
use crate::types::{FileType, GameAsset, GameMetadata, ParsedGame, keys};

/// File name of each asset inside a game directory.
fn asset_file_name(asset: GameAsset) -> &'static str {
    match asset {
        GameAsset::Metadata => "manifest.json",
        GameAsset::Icon => "icon.png",
        GameAsset::Background => "background.png",
        GameAsset::SecondaryBackground => "background2.png",
        GameAsset::Sound => "sound.wav",
    }
}

/// Game manifest stored in `manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalManifest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub disc_total: Option<i64>,
    #[serde(default)]
    pub disc_number: Option<i64>,
    /// Marks a save data directory rather than a game
    #[serde(default)]
    pub save_data: bool,
}

impl LocalManifest {
    fn into_metadata(self) -> GameMetadata {
        let mut metadata = GameMetadata::new();
        metadata.set_text(keys::DISC_ID, self.id);
        metadata.set_text(keys::TITLE, self.title);
        if !self.version.is_empty() {
            metadata.set_text(keys::DISC_VERSION, self.version);
        }
        if let Some(region) = self.region {
            metadata.set_text(keys::REGION, region);
        }
        if let Some(total) = self.disc_total {
            metadata.set_int(keys::DISC_TOTAL, total);
        }
        if let Some(number) = self.disc_number {
            metadata.set_int(keys::DISC_NUMBER, number);
        }
        metadata
    }
}

// ============================================================================
// Filesystem
// ============================================================================

/// An opened game directory.
#[derive(Debug)]
pub struct DirectoryGame {
    root: PathBuf,
}

impl DirectoryGame {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl GameFile for DirectoryGame {
    fn read_asset(&mut self, asset: GameAsset) -> Result<Option<Vec<u8>>, FsError> {
        let path = self.root.join(asset_file_name(asset));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsError::io(path, e)),
        }
    }
}

/// Directory-based [`GameFileSystem`].
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    saves_root: PathBuf,
    install_root: PathBuf,
    config_root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(
        saves_root: impl Into<PathBuf>,
        install_root: impl Into<PathBuf>,
        config_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            saves_root: saves_root.into(),
            install_root: install_root.into(),
            config_root: config_root.into(),
        }
    }

    /// Use the `saves`, `install` and `configs` subdirectories of `data_dir`.
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::new(
            data_dir.join("saves"),
            data_dir.join("install"),
            data_dir.join("configs"),
        )
    }

    pub fn saves_root(&self) -> &Path {
        &self.saves_root
    }

    /// Directories directly under `root` whose name starts with `game_id`.
    fn dirs_for_id(root: &Path, game_id: &str) -> Vec<PathBuf> {
        if game_id.is_empty() {
            return Vec::new();
        }
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(game_id))
            .map(|entry| entry.path())
            .collect();
        dirs.sort();
        dirs
    }
}

impl GameFileSystem for LocalFileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn GameFile>, FsError> {
        let meta = std::fs::metadata(path).map_err(|e| FsError::io(path, e))?;
        if !meta.is_dir() {
            return Err(FsError::Unsupported(path.to_path_buf()));
        }
        Ok(Box::new(DirectoryGame {
            root: path.to_path_buf(),
        }))
    }

    fn save_data_dirs(&self, game_id: &str) -> Vec<PathBuf> {
        Self::dirs_for_id(&self.saves_root, game_id)
    }

    fn install_data_dirs(&self, game_id: &str) -> Vec<PathBuf> {
        Self::dirs_for_id(&self.install_root, game_id)
    }

    fn delete(&self, path: &Path) -> Result<(), FsError> {
        let meta = std::fs::symlink_metadata(path).map_err(|e| FsError::io(path, e))?;
        let result = if meta.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        result.map_err(|e| {
            warn!("Removing {} failed: {}", path.display(), e);
            FsError::DeleteFailed(path.to_path_buf())
        })?;
        debug!("Removed {}", path.display());
        Ok(())
    }

    fn compute_size(&self, path: &Path) -> u64 {
        WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    fn has_game_config(&self, game_id: &str) -> bool {
        !game_id.is_empty() && self.config_root.join(format!("{game_id}.toml")).is_file()
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Reads `manifest.json` into a metadata block.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestParser;

impl ManifestParser {
    fn read_manifest(file: &mut dyn GameFile) -> Result<LocalManifest> {
        let bytes = file
            .read_asset(GameAsset::Metadata)?
            .context("missing manifest.json")?;
        serde_json::from_slice(&bytes).context("invalid manifest.json")
    }
}

impl MetadataParser for ManifestParser {
    fn identify(&self, _path: &Path, file: &mut dyn GameFile) -> FileType {
        match Self::read_manifest(file) {
            Ok(manifest) if manifest.save_data => FileType::SaveData,
            Ok(_) => FileType::Directory,
            // A directory with a manifest we can't read is still a game
            // directory; parse reports the error.
            Err(_) => match file.read_asset(GameAsset::Metadata) {
                Ok(Some(_)) => FileType::Directory,
                _ => FileType::Unknown,
            },
        }
    }

    fn parse(&self, file: &mut dyn GameFile) -> Result<ParsedGame> {
        let manifest = Self::read_manifest(file)?;
        Ok(ParsedGame {
            metadata: manifest.into_metadata(),
        })
    }
}
