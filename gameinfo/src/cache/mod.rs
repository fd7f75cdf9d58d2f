//! Game info cache
//!
//! Maps game paths to [`GameInfo`] records and feeds load passes to a
//! [`PriorityWorkQueue`]. Everything here returns immediately except
//! [`GameInfoCache::wait_until_done`] and [`GameInfoCache::clear`].
//!
//! Call [`GameInfoCache::get_info`] every redraw: the first call creates an
//! empty record and queues a pass, later calls return the same record as it
//! fills in. Most recently requested paths load first.


use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, DrawContext};
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::queue::{PriorityWorkQueue, Submitted};
use crate::record::{GameInfo, ManagedTexture, RecordKey};
use crate::types::FileType;
use crate::want::WantFlags;
use crate::work::WorkItem;

/// Queue type used by the cache.
pub type GameInfoQueue = PriorityWorkQueue<RecordKey, WorkItem>;

/// Asynchronous cache of game metadata, images and sizes.
///
/// Construct one at startup and hand references to the UI; there is no
/// global instance.
pub struct GameInfoCache {
    backend: Backend,
    config: CacheConfig,
    clock: Clock,
    infos: Mutex<HashMap<PathBuf, Arc<GameInfo>>>,
    queue: GameInfoQueue,
    next_key: AtomicU64,
    /// Monotonic request counter; doubles as queue priority
    request_seq: AtomicU64,
}

impl GameInfoCache {
    /// Create the cache and start its worker threads.
    pub fn new(backend: Backend, config: CacheConfig) -> std::io::Result<Self> {
        let queue = PriorityWorkQueue::new(config.thread_name.clone(), config.effective_workers())?;
        info!(
            "Game info cache started with {} worker(s)",
            queue.worker_count()
        );
        Ok(Self {
            backend,
            config,
            clock: Clock::new(),
            infos: Mutex::new(HashMap::new()),
            queue,
            next_key: AtomicU64::new(0),
            request_seq: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn work_queue(&self) -> &GameInfoQueue {
        &self.queue
    }

    fn lock_infos(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<GameInfo>>> {
        self.infos.lock().unwrap_or_else(|e| {
            warn!("Game info map mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Snapshot of all records, taken without holding any record lock.
    fn records(&self) -> Vec<Arc<GameInfo>> {
        self.lock_infos().values().cloned().collect()
    }

    /// Get the record for `path`, queueing whatever `want` still needs.
    ///
    /// Any field may still be at its default the first time (and for a
    /// while after). Keep calling this, redrawing often, and check the
    /// loaded flags. Pass a draw context to get textures made for images;
    /// without one only the encoded bytes are loaded.
    pub fn get_info(
        &self,
        draw: Option<&DrawContext>,
        path: impl AsRef<Path>,
        want: WantFlags,
    ) -> Arc<GameInfo> {
        let path = path.as_ref();
        let info = {
            let mut infos = self.lock_infos();
            match infos.get(path) {
                Some(info) => info.clone(),
                None => {
                    let key = RecordKey(self.next_key.fetch_add(1, Ordering::Relaxed));
                    let info = Arc::new(GameInfo::new(
                        key,
                        path.to_path_buf(),
                        self.backend.clone(),
                        self.clock,
                    ));
                    infos.insert(path.to_path_buf(), info.clone());
                    info
                }
            }
        };
        info.touch();

        if let Some(draw) = draw
            && self.config.upload_textures_on_poll
        {
            info.upload_missing_textures(draw);
        }

        let need = info.claim_work(want.with_implied());
        let priority = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        if need.is_empty() {
            // Re-requested while queued: move it ahead of later requests
            if info.is_pending() {
                self.queue.bump(&info.key(), priority);
            }
            return info;
        }

        let item = WorkItem::new(info.clone(), need, draw.cloned());
        if self.queue.push(info.key(), item, priority) == Submitted::Rejected {
            debug!("Queue stopped; not loading {}", path.display());
        }
        info
    }

    /// Block until `info` has nothing queued and no worker on it.
    ///
    /// Runs a still-queued pass on the calling thread. Use sparingly, for
    /// example before deleting a game.
    pub fn wait_until_done(&self, info: &GameInfo) {
        self.queue.wait_for(&info.key());
    }

    /// Drop background images, secondary backgrounds and sounds everywhere.
    ///
    /// Icons, identity and sizes are kept. A later `get_info` asking for
    /// them loads them again.
    pub fn flush_bgs(&self) {
        let records = self.records();
        for info in &records {
            info.flush_backgrounds();
        }
        debug!("Flushed backgrounds of {} records", records.len());
    }

    /// Remove every record of the given file type.
    ///
    /// Requesting one of those paths again creates a fresh record.
    pub fn purge_type(&self, file_type: FileType) {
        let matching: Vec<_> = self
            .records()
            .into_iter()
            .filter(|info| info.lock().file_type == file_type)
            .collect();
        if matching.is_empty() {
            return;
        }

        let removed: Vec<_> = {
            let mut infos = self.lock_infos();
            matching
                .into_iter()
                .filter(|info| {
                    infos
                        .get(info.path())
                        .is_some_and(|current| Arc::ptr_eq(current, info))
                        && infos.remove(info.path()).is_some()
                })
                .collect()
        };

        for info in &removed {
            self.queue.cancel(&info.key());
            info.release_resources();
        }
        debug!("Purged {} records of type {:?}", removed.len(), file_type);
    }

    /// Destroy every record and restart the workers.
    ///
    /// Unstarted passes are discarded and running ones finish first. Must
    /// not be called from a worker thread.
    pub fn clear(&self) {
        self.queue.shutdown();

        let removed: Vec<_> = self.lock_infos().drain().map(|(_, info)| info).collect();
        for info in &removed {
            info.release_resources();
        }
        if !removed.is_empty() {
            debug!("Cleared {} records", removed.len());
        }

        if let Err(e) = self.queue.restart() {
            error!("Failed to restart game info workers: {}", e);
        }
    }

    /// Stop the workers for good. Called on drop.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    pub fn len(&self) -> usize {
        self.lock_infos().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.lock_infos().contains_key(path.as_ref())
    }
}

impl Drop for GameInfoCache {
    fn drop(&mut self) {
        self.shutdown();
        for info in self.records() {
            info.release_resources();
        }
    }
}

/// Turn encoded image bytes into a texture owned by the record.
///
/// `None` if the sink can't decode or upload them; the slot then stays
/// unloaded.
pub(crate) fn setup_texture(draw: &DrawContext, encoded: &[u8]) -> Option<ManagedTexture> {
    match draw.upload(encoded) {
        Ok(handle) => Some(ManagedTexture::new(handle, draw.clone())),
        Err(e) => {
            warn!("Texture upload failed: {:#}", e);
            None
        }
    }
}
