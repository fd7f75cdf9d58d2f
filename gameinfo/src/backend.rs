//! Collaborator abstractions
//!
//! The cache never touches the disk, the package format or the GPU
//! directly. It goes through these traits so the library UI can plug in
//! the real implementations and tests can plug in counting doubles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::error::FsError;
use crate::types::{FileType, GameAsset, ParsedGame, TextureHandle};

/// An opened game package or save directory.
///
/// Held by the record between load passes and disposed when the record
/// is deleted or destroyed.
pub trait GameFile: Send {
    /// Read one asset out of the package.
    ///
    /// Returns `Ok(None)` when the package simply doesn't contain it.
    fn read_asset(&mut self, asset: GameAsset) -> Result<Option<Vec<u8>>, FsError>;
}

/// Filesystem operations needed by records.
pub trait GameFileSystem: Send + Sync {
    /// Open a game or save data path.
    fn open(&self, path: &Path) -> Result<Box<dyn GameFile>, FsError>;

    /// Save data directories belonging to a game ID.
    fn save_data_dirs(&self, game_id: &str) -> Vec<PathBuf>;

    /// Install data directories belonging to a game ID.
    fn install_data_dirs(&self, _game_id: &str) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Delete a file or directory tree.
    fn delete(&self, path: &Path) -> Result<(), FsError>;

    /// Total size in bytes of a file, or of every file under a directory.
    fn compute_size(&self, path: &Path) -> u64;

    /// Whether a per-game config override exists.
    fn has_game_config(&self, _game_id: &str) -> bool {
        false
    }
}

/// Package format parser.
pub trait MetadataParser: Send + Sync {
    /// Work out what kind of file an opened path is.
    fn identify(&self, path: &Path, file: &mut dyn GameFile) -> FileType;

    /// Parse the embedded metadata block.
    fn parse(&self, file: &mut dyn GameFile) -> Result<ParsedGame>;
}

/// Consumer of encoded image bytes, usually the UI renderer.
///
/// Must be callable from worker threads.
pub trait TextureSink: Send + Sync {
    /// Decode and upload an encoded image, returning a handle for display.
    fn upload(&self, encoded: &[u8]) -> Result<TextureHandle>;

    /// Give a handle back. Called exactly once per successful upload.
    fn release(&self, handle: TextureHandle);
}

/// Rendering context passed to `get_info`. `None` means "load bytes only".
pub type DrawContext = Arc<dyn TextureSink>;

/// The non-rendering collaborators every record needs.
#[derive(Clone)]
pub struct Backend {
    pub fs: Arc<dyn GameFileSystem>,
    pub parser: Arc<dyn MetadataParser>,
}

impl Backend {
    pub fn new(fs: Arc<dyn GameFileSystem>, parser: Arc<dyn MetadataParser>) -> Self {
        Self { fs, parser }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
