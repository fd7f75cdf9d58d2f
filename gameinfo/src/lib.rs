//! Nethercore game info cache
//!
//! Asynchronous cache of per-game metadata, thumbnails, background images,
//! preview sounds and disk sizes for the game library UI.
//!
//! The UI calls [`GameInfoCache::get_info`] every frame. It never blocks:
//! the first call returns an empty [`GameInfo`] and queues a load pass,
//! later calls return the same record as background workers fill it in.
//! Per-slot loaded flags and timestamps tell the UI what it can draw.
//!
//! Disk access, package parsing and texture upload go through the traits in
//! [`backend`]. The [`local`] module implements them for games installed as
//! plain directories.

pub mod backend;
pub mod cache;
mod clock;
pub mod config;
pub mod error;
pub mod local;
pub mod queue;
pub mod record;
pub mod types;
pub mod want;
pub mod work;

#[cfg(test)]
mod test_utils;

pub use backend::{Backend, DrawContext, GameFile, GameFileSystem, MetadataParser, TextureSink};
pub use cache::{GameInfoCache, GameInfoQueue};
pub use config::CacheConfig;
pub use error::{ConfigError, FsError};
pub use local::{LocalFileSystem, ManifestParser};
pub use queue::{Job, PriorityWorkQueue, Submitted};
pub use record::{GameInfo, GameInfoState, ManagedTexture, RecordKey, ResourceSlot, SlotState};
pub use types::{
    FileType, GameAsset, GameMetadata, GameRegion, MetadataValue, ParsedGame, SlotKind,
    TextureHandle,
};
pub use want::WantFlags;
pub use work::WorkItem;
