//! Lazily loaded sub-resource slots

use tracing::trace;

use crate::backend::DrawContext;
use crate::types::TextureHandle;

/// Lifecycle of one sub-resource slot.
///
/// `Empty -> Loading -> Ready | Missing`, and back to `Empty` on flush or
/// on a failed load. Every transition happens under the record lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Empty,
    Loading,
    Ready,
    /// The package has no such asset
    Missing,
}

impl SlotState {
    /// Whether a load pass has nothing left to do for this slot.
    pub fn is_settled(self) -> bool {
        matches!(self, SlotState::Ready | SlotState::Missing)
    }
}

/// A texture handle that goes back to its sink when dropped.
pub struct ManagedTexture {
    handle: TextureHandle,
    sink: DrawContext,
}

impl ManagedTexture {
    pub(crate) fn new(handle: TextureHandle, sink: DrawContext) -> Self {
        Self { handle, sink }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }
}

impl Drop for ManagedTexture {
    fn drop(&mut self) {
        trace!("Releasing texture {:?}", self.handle);
        self.sink.release(self.handle);
    }
}

impl std::fmt::Debug for ManagedTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ManagedTexture").field(&self.handle).finish()
    }
}

/// Encoded bytes plus the texture made from them.
#[derive(Debug, Default)]
pub struct ResourceSlot {
    pub(crate) state: SlotState,
    pub(crate) data: Vec<u8>,
    pub(crate) texture: Option<ManagedTexture>,
}

/// How a slot load ended.
pub(crate) enum SlotOutcome {
    Loaded {
        data: Vec<u8>,
        texture: Option<ManagedTexture>,
    },
    Missing,
    Failed,
}

impl ResourceSlot {
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Encoded bytes. Empty unless the slot is `Ready`.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture.as_ref().map(ManagedTexture::handle)
    }

    /// Drop data and texture and go back to `Empty`.
    pub(crate) fn reset(&mut self) {
        self.state = SlotState::Empty;
        self.data = Vec::new();
        self.texture = None;
    }
}
