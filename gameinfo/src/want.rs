//! Want masks for game info requests

bitflags::bitflags! {
    /// Which optional, expensive sub-resources a caller currently needs.
    ///
    /// Identity fields and the icon are always loaded, whatever the mask.
    /// Only set `BACKGROUND` or `SOUND` when they will actually be shown or
    /// played, they are big and may be flushed again later.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WantFlags: u8 {
        /// Background images (primary and secondary)
        const BACKGROUND = 0x01;
        /// Game, save data and install data sizes (directory walks)
        const SIZE = 0x02;
        /// Background sound
        const SOUND = 0x04;
        /// Identity fields, metadata block and icon. Implied by every request.
        const INFO = 0x80;
    }
}

impl WantFlags {
    /// Flags dropped by a background flush.
    pub const FLUSHABLE: WantFlags = WantFlags::BACKGROUND.union(WantFlags::SOUND);

    /// The mask a request actually needs serviced.
    pub fn with_implied(self) -> WantFlags {
        self | WantFlags::INFO
    }
}
