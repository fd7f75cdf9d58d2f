//! Game records
//!
//! A [`GameInfo`] describes one game or save data path. It is created empty
//! by the cache and filled in by worker threads while the UI keeps drawing.
//!
//! Two kinds of state live here:
//! - Everything in [`GameInfoState`], guarded by the record's own mutex.
//!   Take it with [`GameInfo::lock`] for consistent multi-field reads.
//! - Status, loaded flags and timestamps, which are atomics so the UI can
//!   poll progress every frame without contending with workers.

mod slot;


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, TryLockError};

use tracing::{debug, trace, warn};

use crate::backend::{Backend, DrawContext, GameFile};
use crate::clock::{AtomicSeconds, Clock};
use crate::types::{FileType, GameMetadata, GameRegion, SlotKind, TextureHandle, keys};
use crate::want::WantFlags;

pub use slot::{ManagedTexture, ResourceSlot, SlotState};
pub(crate) use slot::SlotOutcome;

/// Stable identity of a record, used as the work queue key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(pub u64);

const STATUS_IDLE: u8 = 0;
const STATUS_PENDING: u8 = 1;
const STATUS_WORKING: u8 = 2;

/// Lock-guarded fields of a record.
///
/// Identity fields are public for reading under the lock. The title,
/// slots and sizes go through accessors since workers rewrite them.
#[derive(Default)]
pub struct GameInfoState {
    pub id: String,
    pub id_version: String,
    pub disc_total: i32,
    pub disc_number: i32,
    pub region: GameRegion,
    pub file_type: FileType,
    pub metadata: GameMetadata,
    pub metadata_loaded: bool,
    pub has_config: bool,

    title: String,
    slots: [ResourceSlot; 4],

    game_size: Option<u64>,
    save_data_size: Option<u64>,
    install_data_size: Option<u64>,

    file: Option<Box<dyn GameFile>>,

    /// Want flags whose loads have settled
    serviced: WantFlags,
    /// Want flags covered by a queued or running pass
    in_progress: WantFlags,
}

impl GameInfoState {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn slot(&self, kind: SlotKind) -> &ResourceSlot {
        &self.slots[kind.index()]
    }

    pub fn texture(&self, kind: SlotKind) -> Option<TextureHandle> {
        self.slot(kind).texture()
    }

    /// Game size in bytes, 0 until computed.
    pub fn game_size(&self) -> u64 {
        self.game_size.unwrap_or(0)
    }

    /// Save data size in bytes, 0 until computed.
    pub fn save_data_size(&self) -> u64 {
        self.save_data_size.unwrap_or(0)
    }

    /// Install data size in bytes, 0 until computed.
    pub fn install_data_size(&self) -> u64 {
        self.install_data_size.unwrap_or(0)
    }

    pub fn serviced(&self) -> WantFlags {
        self.serviced
    }

    /// Want flags whose slots are all `Ready` or `Missing`.
    fn settled_slot_flags(&self) -> WantFlags {
        let settled = |kind: SlotKind| self.slot(kind).state().is_settled();
        let mut flags = WantFlags::empty();
        if settled(SlotKind::Icon) {
            flags |= WantFlags::INFO;
        }
        if settled(SlotKind::Background) && settled(SlotKind::SecondaryBackground) {
            flags |= WantFlags::BACKGROUND;
        }
        if settled(SlotKind::Sound) {
            flags |= WantFlags::SOUND;
        }
        flags
    }

    fn slot_mut(&mut self, kind: SlotKind) -> &mut ResourceSlot {
        &mut self.slots[kind.index()]
    }

    /// Derive identity fields from the metadata block.
    fn apply_metadata(&mut self) {
        if let Some(id) = self.metadata.text(keys::DISC_ID) {
            self.id = id.to_string();
        }
        if let Some(version) = self.metadata.text(keys::DISC_VERSION) {
            self.id_version = version.to_string();
        }
        self.disc_total = self
            .metadata
            .int(keys::DISC_TOTAL)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(1);
        self.disc_number = self
            .metadata
            .int(keys::DISC_NUMBER)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(1);
        self.region = self
            .metadata
            .text(keys::REGION)
            .and_then(GameRegion::from_name)
            .unwrap_or_else(|| GameRegion::from_game_id(&self.id));
        if let Some(title) = self.metadata.text(keys::TITLE)
            && !title.is_empty()
        {
            self.title = title.to_string();
        }
    }
}

/// Information about one installed game or piece of save data.
///
/// Owned by [`GameInfoCache`](crate::GameInfoCache); callers get an `Arc`
/// that stays usable after a purge or clear, but is no longer updated.
pub struct GameInfo {
    key: RecordKey,
    path: PathBuf,
    backend: Backend,
    clock: Clock,

    state: Mutex<GameInfoState>,

    status: AtomicU8,
    loaded: [AtomicBool; 4],
    loaded_at: [AtomicSeconds; 4],
    last_accessed: AtomicSeconds,
}

impl GameInfo {
    pub(crate) fn new(key: RecordKey, path: PathBuf, backend: Backend, clock: Clock) -> Self {
        let state = GameInfoState {
            title: title_from_path(&path),
            ..GameInfoState::default()
        };
        Self {
            key,
            path,
            backend,
            clock,
            state: Mutex::new(state),
            status: AtomicU8::new(STATUS_IDLE),
            loaded: Default::default(),
            loaded_at: Default::default(),
            last_accessed: AtomicSeconds::default(),
        }
    }

    pub fn key(&self) -> RecordKey {
        self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hold this when reading several fields that must agree.
    ///
    /// Not needed for the atomic accessors, nor for passing the record
    /// around.
    pub fn lock(&self) -> MutexGuard<'_, GameInfoState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("GameInfo mutex poisoned for {}; continuing", self.path.display());
            e.into_inner()
        })
    }

    pub fn get_title(&self) -> String {
        self.lock().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.lock().title = title.into();
    }

    /// Queued, no worker has picked it up yet.
    pub fn is_pending(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_PENDING
    }

    /// A worker is loading it right now.
    pub fn is_working(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_WORKING
    }

    /// Whether a slot's bytes (and texture, when one was requested) are ready.
    pub fn is_loaded(&self, kind: SlotKind) -> bool {
        self.loaded[kind.index()].load(Ordering::Acquire)
    }

    pub fn icon_loaded(&self) -> bool {
        self.is_loaded(SlotKind::Icon)
    }

    pub fn background_loaded(&self) -> bool {
        self.is_loaded(SlotKind::Background)
    }

    pub fn secondary_background_loaded(&self) -> bool {
        self.is_loaded(SlotKind::SecondaryBackground)
    }

    pub fn sound_loaded(&self) -> bool {
        self.is_loaded(SlotKind::Sound)
    }

    /// When the slot last became ready, in seconds since the cache started.
    ///
    /// Useful for fading images in. Zero if never loaded.
    pub fn loaded_at(&self, kind: SlotKind) -> f64 {
        self.loaded_at[kind.index()].load()
    }

    pub fn last_accessed_time(&self) -> f64 {
        self.last_accessed.load()
    }

    pub(crate) fn touch(&self) {
        self.last_accessed.store(self.clock.now());
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Identify the path and parse its metadata.
    ///
    /// Returns `false` if the path can't be opened or parsed; the record
    /// then keeps its defaults and path-derived title.
    pub fn load_from_path(&self) -> bool {
        let parser = self.backend.parser.clone();
        let result = self.with_file(|file| {
            let file_type = parser.identify(&self.path, file);
            let parsed = match file_type {
                FileType::Unknown => None,
                _ => parser
                    .parse(file)
                    .inspect_err(|e| {
                        warn!("Failed to parse metadata for {}: {:#}", self.path.display(), e)
                    })
                    .ok(),
            };
            (file_type, parsed)
        });

        let Some((file_type, parsed)) = result else {
            return false;
        };

        let has_config = parsed
            .as_ref()
            .and_then(|p| p.metadata.text(keys::DISC_ID))
            .is_some_and(|id| self.backend.fs.has_game_config(id));

        let mut state = self.lock();
        state.file_type = file_type;
        let Some(parsed) = parsed else {
            debug!("No metadata for {} ({:?})", self.path.display(), file_type);
            return false;
        };
        state.metadata = parsed.metadata;
        state.apply_metadata();
        state.has_config = has_config;
        state.metadata_loaded = true;
        trace!("Loaded metadata for {}: id={}", self.path.display(), state.id);
        true
    }

    /// Re-derive identity fields and title from the metadata block.
    pub fn parse_metadata(&self) {
        self.lock().apply_metadata();
    }

    /// Run `f` against the opened file without holding the record lock.
    ///
    /// Reuses the record's file handle if it has one, otherwise opens the
    /// path. The handle is kept for later passes. `None` if the path can't
    /// be opened.
    pub(crate) fn with_file<R>(&self, f: impl FnOnce(&mut dyn GameFile) -> R) -> Option<R> {
        let held = self.lock().file.take();
        let mut file = match held {
            Some(file) => file,
            None => match self.backend.fs.open(&self.path) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Failed to open {}: {}", self.path.display(), e);
                    return None;
                }
            },
        };

        let result = f(file.as_mut());

        let mut state = self.lock();
        if state.file.is_none() {
            state.file = Some(file);
        }
        Some(result)
    }

    pub fn has_file_loader(&self) -> bool {
        self.lock().file.is_some()
    }

    /// Close the held file handle, if any.
    pub fn dispose_file_loader(&self) {
        self.lock().file = None;
    }

    // ------------------------------------------------------------------
    // Sizes
    // ------------------------------------------------------------------

    /// Size of the game itself. Computed on first call, then cached.
    pub fn get_game_size_in_bytes(&self) -> u64 {
        if let Some(size) = self.lock().game_size {
            return size;
        }
        let size = self.backend.fs.compute_size(&self.path);
        *self.lock().game_size.get_or_insert(size)
    }

    /// Combined size of all save data directories. Cached after first call.
    ///
    /// Returns 0 without caching while the game ID is still unknown.
    pub fn get_save_data_size_in_bytes(&self) -> u64 {
        let id = {
            let state = self.lock();
            if let Some(size) = state.save_data_size {
                return size;
            }
            state.id.clone()
        };
        if id.is_empty() {
            return 0;
        }
        let size = self
            .backend
            .fs
            .save_data_dirs(&id)
            .iter()
            .map(|dir| self.backend.fs.compute_size(dir))
            .sum();
        *self.lock().save_data_size.get_or_insert(size)
    }

    /// Combined size of all install data directories. Cached after first call.
    ///
    /// Returns 0 without caching while the game ID is still unknown.
    pub fn get_install_data_size_in_bytes(&self) -> u64 {
        let id = {
            let state = self.lock();
            if let Some(size) = state.install_data_size {
                return size;
            }
            state.id.clone()
        };
        if id.is_empty() {
            return 0;
        }
        let size = self
            .backend
            .fs
            .install_data_dirs(&id)
            .iter()
            .map(|dir| self.backend.fs.compute_size(dir))
            .sum();
        *self.lock().install_data_size.get_or_insert(size)
    }

    pub fn get_save_data_directories(&self) -> Vec<PathBuf> {
        let id = self.lock().id.clone();
        if id.is_empty() {
            return Vec::new();
        }
        self.backend.fs.save_data_dirs(&id)
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Delete the game from disk. Be sure before calling this.
    ///
    /// The caller removes the record from the cache afterwards. On failure
    /// the record is left as it was.
    pub fn delete(&self) -> bool {
        let file = self.lock().file.take();
        match self.backend.fs.delete(&self.path) {
            Ok(()) => {
                debug!("Deleted {}", self.path.display());
                drop(file);
                true
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", self.path.display(), e);
                let mut state = self.lock();
                if state.file.is_none() {
                    state.file = file;
                }
                false
            }
        }
    }

    /// Delete every save data directory of this game.
    ///
    /// Keeps going after a failure; returns `false` if any deletion failed.
    pub fn delete_all_save_data(&self) -> bool {
        let dirs = self.get_save_data_directories();
        let mut all_ok = true;
        for dir in &dirs {
            if let Err(e) = self.backend.fs.delete(dir) {
                warn!("Failed to delete save data {}: {}", dir.display(), e);
                all_ok = false;
            }
        }
        if !dirs.is_empty() {
            self.lock().save_data_size = None;
        }
        all_ok
    }

    // ------------------------------------------------------------------
    // Work bookkeeping (called by the cache and workers)
    // ------------------------------------------------------------------

    /// Reserve the part of `want` that no pass has settled or claimed yet.
    ///
    /// Returns the reserved flags; the caller must queue a pass for them.
    pub(crate) fn claim_work(&self, want: WantFlags) -> WantFlags {
        let mut state = self.lock();
        let need = want - state.serviced - state.in_progress;
        if need.is_empty() {
            return need;
        }
        state.in_progress |= need;
        // A running pass keeps the record Working; it flips to Pending
        // when it finishes and sees the follow-up.
        let _ = self.status.compare_exchange(
            STATUS_IDLE,
            STATUS_PENDING,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        need
    }

    pub(crate) fn begin_work(&self) {
        let _state = self.lock();
        self.status.store(STATUS_WORKING, Ordering::Release);
    }

    /// Close a pass over `want`, marking `settled` flags as serviced.
    ///
    /// Slot-backed flags only count if their slots are still settled; a
    /// flush that landed mid-pass leaves them unserviced.
    pub(crate) fn finish_work(&self, want: WantFlags, settled: WantFlags) {
        let mut state = self.lock();
        state.in_progress -= want;
        let still_settled = state.settled_slot_flags() | WantFlags::SIZE;
        state.serviced |= settled & want & still_settled;
        self.update_idle_status(&state);
    }

    /// Forget a pass that was discarded before it ran.
    pub(crate) fn abandon(&self, want: WantFlags) {
        let mut state = self.lock();
        state.in_progress -= want;
        self.update_idle_status(&state);
    }

    fn update_idle_status(&self, state: &GameInfoState) {
        let next = if state.in_progress.is_empty() {
            STATUS_IDLE
        } else {
            STATUS_PENDING
        };
        self.status.store(next, Ordering::Release);
    }

    /// Move a slot to `Loading`. Returns `false` if it is already settled.
    pub(crate) fn begin_slot_load(&self, kind: SlotKind) -> bool {
        let mut state = self.lock();
        let slot = state.slot_mut(kind);
        if slot.state.is_settled() {
            return false;
        }
        slot.state = SlotState::Loading;
        true
    }

    /// Store the result of a slot load. Returns whether the slot settled.
    ///
    /// If the slot was flushed while loading, the result is dropped and the
    /// slot stays `Empty`.
    pub(crate) fn finish_slot_load(&self, kind: SlotKind, outcome: SlotOutcome) -> bool {
        let mut state = self.lock();
        let slot = state.slot_mut(kind);
        if slot.state != SlotState::Loading {
            trace!("{:?} of {} flushed mid-load, discarding", kind, self.path.display());
            return false;
        }
        match outcome {
            SlotOutcome::Loaded { data, texture } => {
                slot.data = data;
                slot.texture = texture;
                slot.state = SlotState::Ready;
                self.loaded_at[kind.index()].store(self.clock.now());
                self.loaded[kind.index()].store(true, Ordering::Release);
                true
            }
            SlotOutcome::Missing => {
                slot.state = SlotState::Missing;
                true
            }
            SlotOutcome::Failed => {
                slot.reset();
                false
            }
        }
    }

    /// Upload textures for image slots that loaded without a draw context.
    ///
    /// Skipped if a worker holds the lock; the next poll tries again.
    pub(crate) fn upload_missing_textures(&self, draw: &DrawContext) {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        for kind in SlotKind::ALL.into_iter().filter(|k| k.is_image()) {
            let slot = state.slot_mut(kind);
            if slot.state != SlotState::Ready || slot.texture.is_some() || slot.data.is_empty() {
                continue;
            }
            slot.texture = crate::cache::setup_texture(draw, &slot.data);
        }
    }

    /// Evict background images and sound; icon and identity stay.
    pub(crate) fn flush_backgrounds(&self) {
        let mut state = self.lock();
        for kind in SlotKind::ALL.into_iter().filter(|k| k.is_flushable()) {
            self.loaded[kind.index()].store(false, Ordering::Release);
            state.slot_mut(kind).reset();
        }
        state.serviced -= WantFlags::FLUSHABLE;
    }

    /// Drop every slot and the file handle, returning all textures.
    pub(crate) fn release_resources(&self) {
        let mut state = self.lock();
        for kind in SlotKind::ALL {
            self.loaded[kind.index()].store(false, Ordering::Release);
            state.slot_mut(kind).reset();
        }
        state.serviced -= WantFlags::INFO | WantFlags::FLUSHABLE;
        state.file = None;
    }
}

impl std::fmt::Debug for GameInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameInfo")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("pending", &self.is_pending())
            .field("working", &self.is_working())
            .finish_non_exhaustive()
    }
}

/// Display title used until metadata is parsed.
fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
