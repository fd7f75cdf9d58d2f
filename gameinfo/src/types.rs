//! Shared value types for game records

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Region a game was released for.
///
/// Guessed from the game ID when the package doesn't say, so not
/// necessarily accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameRegion {
    Japan,
    Usa,
    Europe,
    HongKong,
    Asia,
    Other,
    #[default]
    Unknown,
}

impl GameRegion {
    /// Guess the region from a game ID such as `ULUS10041`.
    ///
    /// The third character carries the region code. IDs shorter than
    /// three characters give `Unknown`.
    pub fn from_game_id(id: &str) -> Self {
        match id.as_bytes().get(2) {
            Some(b'J') => Self::Japan,
            Some(b'U') => Self::Usa,
            Some(b'E') => Self::Europe,
            Some(b'H') => Self::HongKong,
            Some(b'A') | Some(b'K') => Self::Asia,
            Some(_) => Self::Other,
            None => Self::Unknown,
        }
    }

    /// Parse a region name as written in package metadata.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "japan" | "jp" => Some(Self::Japan),
            "usa" | "us" => Some(Self::Usa),
            "europe" | "eu" => Some(Self::Europe),
            "hongkong" | "hong_kong" | "hk" => Some(Self::HongKong),
            "asia" => Some(Self::Asia),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// What kind of thing a record's path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    /// Not identified yet, or not recognized
    #[default]
    Unknown,
    /// Single-file game package
    Package,
    /// Unpacked game directory
    Directory,
    /// A save data directory
    SaveData,
}

/// One value in a game's metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Text(String),
    Int(i64),
}

/// Parsed key/value metadata embedded in a game package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameMetadata {
    values: HashMap<String, MetadataValue>,
}

impl GameMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), MetadataValue::Text(value.into()));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.values.insert(key.into(), MetadataValue::Int(value));
    }

    /// Text value for `key`, if present and textual.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            MetadataValue::Text(s) => Some(s),
            MetadataValue::Int(_) => None,
        }
    }

    /// Integer value for `key`. Numeric text is accepted too.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            MetadataValue::Int(v) => Some(*v),
            MetadataValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Well-known metadata keys.
pub mod keys {
    pub const TITLE: &str = "TITLE";
    pub const DISC_ID: &str = "DISC_ID";
    pub const DISC_VERSION: &str = "DISC_VERSION";
    pub const DISC_TOTAL: &str = "DISC_TOTAL";
    pub const DISC_NUMBER: &str = "DISC_NUMBER";
    pub const REGION: &str = "REGION";
}

/// Output of a metadata parser: the metadata block of one package.
///
/// Identity fields are derived from the block by the record, see
/// [`GameInfo::parse_metadata`](crate::GameInfo::parse_metadata).
#[derive(Debug, Clone, Default)]
pub struct ParsedGame {
    pub metadata: GameMetadata,
}

/// Assets a game file can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameAsset {
    Metadata,
    Icon,
    Background,
    SecondaryBackground,
    Sound,
}

/// A lazily loaded, independently evictable piece of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Icon,
    Background,
    SecondaryBackground,
    Sound,
}

impl SlotKind {
    pub const ALL: [SlotKind; 4] = [
        SlotKind::Icon,
        SlotKind::Background,
        SlotKind::SecondaryBackground,
        SlotKind::Sound,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            SlotKind::Icon => 0,
            SlotKind::Background => 1,
            SlotKind::SecondaryBackground => 2,
            SlotKind::Sound => 3,
        }
    }

    pub fn asset(self) -> GameAsset {
        match self {
            SlotKind::Icon => GameAsset::Icon,
            SlotKind::Background => GameAsset::Background,
            SlotKind::SecondaryBackground => GameAsset::SecondaryBackground,
            SlotKind::Sound => GameAsset::Sound,
        }
    }

    /// Whether the slot holds an image that gets a texture handle.
    pub fn is_image(self) -> bool {
        !matches!(self, SlotKind::Sound)
    }

    /// Flushed by `flush_bgs`. The icon never is.
    pub fn is_flushable(self) -> bool {
        !matches!(self, SlotKind::Icon)
    }
}

/// Opaque handle returned by a texture sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);
