//! Load passes executed by queue workers

use std::sync::Arc;

use tracing::{trace, warn};

use crate::backend::DrawContext;
use crate::cache::setup_texture;
use crate::queue::Job;
use crate::record::{GameInfo, SlotOutcome};
use crate::types::SlotKind;
use crate::want::WantFlags;

/// One queued load pass over a record.
pub struct WorkItem {
    info: Arc<GameInfo>,
    want: WantFlags,
    draw: Option<DrawContext>,
}

impl WorkItem {
    pub(crate) fn new(info: Arc<GameInfo>, want: WantFlags, draw: Option<DrawContext>) -> Self {
        Self { info, want, draw }
    }

    pub fn info(&self) -> &Arc<GameInfo> {
        &self.info
    }

    pub fn want(&self) -> WantFlags {
        self.want
    }
}

impl Job for WorkItem {
    fn run(self) {
        execute(&self.info, self.want, self.draw.as_ref());
    }

    fn merge(&mut self, other: Self) {
        self.want |= other.want;
        if self.draw.is_none() {
            self.draw = other.draw;
        }
    }

    fn discard(self) {
        trace!("Discarding pass {:?} for {}", self.want, self.info.path().display());
        self.info.abandon(self.want);
    }
}

/// Perform every load in `want` that hasn't settled yet.
///
/// Metadata always comes first so later steps can rely on the game ID.
fn execute(info: &GameInfo, want: WantFlags, draw: Option<&DrawContext>) {
    info.begin_work();
    trace!("Pass {:?} started for {}", want, info.path().display());

    let mut settled = WantFlags::empty();

    if want.contains(WantFlags::INFO) {
        let metadata_loaded = info.lock().metadata_loaded;
        if !metadata_loaded {
            info.load_from_path();
        }
        if load_slot(info, SlotKind::Icon, draw) {
            settled |= WantFlags::INFO;
        }
    }

    if want.contains(WantFlags::BACKGROUND) {
        let primary = load_slot(info, SlotKind::Background, draw);
        let secondary = load_slot(info, SlotKind::SecondaryBackground, draw);
        if primary && secondary {
            settled |= WantFlags::BACKGROUND;
        }
    }

    if want.contains(WantFlags::SOUND) && load_slot(info, SlotKind::Sound, draw) {
        settled |= WantFlags::SOUND;
    }

    if want.contains(WantFlags::SIZE) {
        info.get_game_size_in_bytes();
        info.get_save_data_size_in_bytes();
        info.get_install_data_size_in_bytes();
        settled |= WantFlags::SIZE;
    }

    trace!(
        "Pass {:?} finished for {} (settled {:?})",
        want,
        info.path().display(),
        settled
    );
    info.finish_work(want, settled);
}

/// Load one slot. Returns whether it settled (Ready or Missing).
fn load_slot(info: &GameInfo, kind: SlotKind, draw: Option<&DrawContext>) -> bool {
    if !info.begin_slot_load(kind) {
        return true;
    }

    let read = info.with_file(|file| file.read_asset(kind.asset()));
    let outcome = match read {
        Some(Ok(Some(data))) if !data.is_empty() => {
            match draw.filter(|_| kind.is_image()) {
                Some(draw) => match setup_texture(draw, &data) {
                    Some(texture) => SlotOutcome::Loaded {
                        data,
                        texture: Some(texture),
                    },
                    None => SlotOutcome::Failed,
                },
                None => SlotOutcome::Loaded {
                    data,
                    texture: None,
                },
            }
        }
        Some(Ok(_)) => SlotOutcome::Missing,
        Some(Err(e)) => {
            warn!("Failed to read {:?} from {}: {}", kind, info.path().display(), e);
            SlotOutcome::Failed
        }
        None => SlotOutcome::Failed,
    };

    info.finish_slot_load(kind, outcome)
}
