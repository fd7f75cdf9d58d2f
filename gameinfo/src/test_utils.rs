//! Shared test doubles for the collaborator traits

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::{Context, Result, bail};
use hashbrown::{HashMap, HashSet};

use crate::backend::{Backend, GameFile, GameFileSystem, MetadataParser, TextureSink};
use crate::error::FsError;
use crate::types::{FileType, GameAsset, GameMetadata, ParsedGame, TextureHandle};

// ============================================================================
// Gate
// ============================================================================

/// A one-shot latch: `wait` blocks until `open` is called.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cvar.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cvar.wait(open).unwrap();
        }
    }
}

/// Poll `condition` for up to a second.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    panic!("condition not reached in time");
}

// ============================================================================
// In-memory filesystem
// ============================================================================

/// Contents of one fake game package.
#[derive(Debug, Clone, Default)]
pub struct MemoryGame {
    /// Raw metadata bytes, `KEY=VALUE` per line
    pub metadata: Option<Vec<u8>>,
    pub assets: HashMap<GameAsset, Vec<u8>>,
}

impl MemoryGame {
    /// A game with metadata and an icon.
    pub fn new(id: &str, title: &str) -> Self {
        let mut game = Self {
            metadata: Some(format!("DISC_ID={id}\nTITLE={title}\nDISC_VERSION=1.00\n").into_bytes()),
            ..Self::default()
        };
        game.assets.insert(GameAsset::Icon, b"icon-png".to_vec());
        game
    }

    pub fn with_asset(mut self, asset: GameAsset, bytes: &[u8]) -> Self {
        self.assets.insert(asset, bytes.to_vec());
        self
    }

    /// Icon, both backgrounds and sound.
    pub fn full(id: &str, title: &str) -> Self {
        Self::new(id, title)
            .with_asset(GameAsset::Background, b"pic0-png")
            .with_asset(GameAsset::SecondaryBackground, b"pic1-png")
            .with_asset(GameAsset::Sound, b"snd0-at3")
    }

    pub fn corrupt() -> Self {
        Self {
            metadata: Some(b"\xff\xfe not metadata".to_vec()),
            ..Self::default()
        }
    }
}

struct MemoryFile {
    game: MemoryGame,
}

impl GameFile for MemoryFile {
    fn read_asset(&mut self, asset: GameAsset) -> Result<Option<Vec<u8>>, FsError> {
        Ok(match asset {
            GameAsset::Metadata => self.game.metadata.clone(),
            other => self.game.assets.get(&other).cloned(),
        })
    }
}

/// Filesystem double with configurable contents and failure switches.
#[derive(Default)]
pub struct MemoryFileSystem {
    games: Mutex<HashMap<PathBuf, MemoryGame>>,
    sizes: Mutex<HashMap<PathBuf, u64>>,
    save_dirs: Mutex<HashMap<String, Vec<PathBuf>>>,
    install_dirs: Mutex<HashMap<String, Vec<PathBuf>>>,
    configs: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<PathBuf>>,
    fail_all_deletes: AtomicBool,
    deleted: Mutex<Vec<PathBuf>>,
    open_count: AtomicUsize,
    size_count: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_game(&self, path: impl Into<PathBuf>, game: MemoryGame) {
        self.games.lock().unwrap().insert(path.into(), game);
    }

    pub fn set_size(&self, path: impl Into<PathBuf>, size: u64) {
        self.sizes.lock().unwrap().insert(path.into(), size);
    }

    pub fn add_save_dir(&self, id: &str, dir: impl Into<PathBuf>, size: u64) {
        let dir = dir.into();
        self.set_size(dir.clone(), size);
        self.save_dirs
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(dir);
    }

    pub fn add_install_dir(&self, id: &str, dir: impl Into<PathBuf>, size: u64) {
        let dir = dir.into();
        self.set_size(dir.clone(), size);
        self.install_dirs
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(dir);
    }

    pub fn add_config(&self, id: &str) {
        self.configs.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_all_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, path: impl Into<PathBuf>) {
        self.failing_deletes.lock().unwrap().insert(path.into());
    }

    pub fn deleted(&self) -> Vec<PathBuf> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn size_count(&self) -> usize {
        self.size_count.load(Ordering::SeqCst)
    }
}

impl GameFileSystem for MemoryFileSystem {
    fn open(&self, path: &Path) -> Result<Box<dyn GameFile>, FsError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        let game = self
            .games
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))?;
        Ok(Box::new(MemoryFile { game }))
    }

    fn save_data_dirs(&self, game_id: &str) -> Vec<PathBuf> {
        self.save_dirs
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
            .unwrap_or_default()
    }

    fn install_data_dirs(&self, game_id: &str) -> Vec<PathBuf> {
        self.install_dirs
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
            .unwrap_or_default()
    }

    fn delete(&self, path: &Path) -> Result<(), FsError> {
        if self.fail_all_deletes.load(Ordering::SeqCst)
            || self.failing_deletes.lock().unwrap().contains(path)
        {
            return Err(FsError::DeleteFailed(path.to_path_buf()));
        }
        self.games.lock().unwrap().remove(path);
        self.deleted.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn compute_size(&self, path: &Path) -> u64 {
        self.size_count.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn has_game_config(&self, game_id: &str) -> bool {
        self.configs.lock().unwrap().contains(game_id)
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parses `KEY=VALUE` metadata and counts invocations.
///
/// Identifies by extension: `iso`/`pkg` are packages, `sav` is save data,
/// no extension is a directory.
#[derive(Default)]
pub struct CountingParser {
    parse_count: AtomicUsize,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl CountingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every parse block until `gate` opens.
    pub fn hold_with(&self, gate: Arc<Gate>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn parse_count(&self) -> usize {
        self.parse_count.load(Ordering::SeqCst)
    }
}

impl MetadataParser for CountingParser {
    fn identify(&self, path: &Path, _file: &mut dyn GameFile) -> FileType {
        match path.extension().and_then(|e| e.to_str()) {
            Some("iso") | Some("pkg") => FileType::Package,
            Some("sav") => FileType::SaveData,
            None => FileType::Directory,
            Some(_) => FileType::Unknown,
        }
    }

    fn parse(&self, file: &mut dyn GameFile) -> Result<ParsedGame> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait();
        }
        self.parse_count.fetch_add(1, Ordering::SeqCst);

        let bytes = file
            .read_asset(GameAsset::Metadata)?
            .context("package has no metadata")?;
        let text = String::from_utf8(bytes).context("metadata is not UTF-8")?;

        let mut metadata = GameMetadata::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                bail!("malformed metadata line: {line}");
            };
            metadata.set_text(key.trim(), value.trim());
        }
        Ok(ParsedGame { metadata })
    }
}

// ============================================================================
// Texture sink
// ============================================================================

/// Hands out sequential handles and counts uploads and releases.
#[derive(Default)]
pub struct CountingTextureSink {
    next: AtomicU64,
    uploads: AtomicUsize,
    releases: AtomicUsize,
    fail: AtomicBool,
    live: Mutex<HashSet<TextureHandle>>,
}

impl CountingTextureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }
}

impl TextureSink for CountingTextureSink {
    fn upload(&self, encoded: &[u8]) -> Result<TextureHandle> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("decode failed");
        }
        if encoded.is_empty() {
            bail!("empty image");
        }
        let handle = TextureHandle(self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().insert(handle);
        Ok(handle)
    }

    fn release(&self, handle: TextureHandle) {
        assert!(
            self.live.lock().unwrap().remove(&handle),
            "released unknown or already released texture {handle:?}"
        );
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// Doubles wired into a `Backend`.
pub struct TestBackend {
    pub fs: Arc<MemoryFileSystem>,
    pub parser: Arc<CountingParser>,
    pub sink: Arc<CountingTextureSink>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self {
            fs: Arc::new(MemoryFileSystem::new()),
            parser: Arc::new(CountingParser::new()),
            sink: Arc::new(CountingTextureSink::new()),
        }
    }

    pub fn backend(&self) -> Backend {
        Backend::new(self.fs.clone(), self.parser.clone())
    }

    pub fn draw(&self) -> crate::backend::DrawContext {
        self.sink.clone()
    }
}
