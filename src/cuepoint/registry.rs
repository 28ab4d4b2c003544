use bevy::prelude::*;
use educe::Educe;
use tinyvec::TinyVec;

use super::{drift::DriftTracker, *};
use crate::clock::{broadcast_clock, ClockTick};
use crate::utils::*;

pub const SHORT_LIST: usize = 4;

/// Deferred registry mutations. Callbacks run while the window list is being
/// iterated, so adds and removes queue here and apply once the pass ends.
#[derive(Default)]
pub struct CuepointActions {
    next_id: u64,
    additions: Vec<(CuepointId, Cuepoint)>,
    removals: TinyVec<[CuepointId; SHORT_LIST]>,
}

impl CuepointActions {
    /// Queue a window for registration. It is first evaluated on the next
    /// tick, not within the pass that queued it.
    pub fn add(&mut self, cuepoint: Cuepoint) -> CuepointId {
        let id = self.reserve_id();
        self.additions.push((id, cuepoint));
        id
    }

    pub fn remove(&mut self, id: CuepointId) {
        self.removals.push(id);
    }

    fn reserve_id(&mut self) -> CuepointId {
        let id = CuepointId::from(self.next_id);
        self.next_id += 1;
        id
    }

    fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Owns every registered window and the shared drift tracker. Evaluation is
/// driven by clock ticks; windows are visited in registration order and all
/// see the same sample and the same error snapshot within one pass.
#[derive(Resource, Educe)]
#[educe(Default)]
pub struct CuepointRegistry {
    windows: Vec<(CuepointId, Cuepoint)>,
    actions: CuepointActions,
    drift: DriftTracker,
    tracking: bool,
    #[educe(Default(expression = "p32(0.)"))]
    latest: P32,
}

impl CuepointRegistry {
    /// Registers a window and immediately evaluates it against the last seen
    /// clock sample, so a span that already contains "now" fires `on_start`
    /// and `on_update` before this returns.
    pub fn add(&mut self, cuepoint: Cuepoint) -> CuepointId {
        let id = self.actions.reserve_id();

        if cuepoint.consider_error && !self.tracking {
            self.tracking = true;
            self.drift.reset(self.latest);
        }

        let max_error = self.margin_for(&cuepoint);
        self.windows.push((id, cuepoint));
        if let Some((_, cuepoint)) = self.windows.last_mut() {
            cuepoint.evaluate(self.latest, false, max_error, &mut self.actions);
        }
        self.flush();
        id
    }

    /// Invokes `on_destroy` and drops the window. Removing an id twice is a
    /// no-op; `on_destroy` never fires a second time.
    pub fn remove(&mut self, id: CuepointId) {
        let Some(index) = self.windows.iter().position(|(entry, _)| *entry == id) else {
            return;
        };
        let (_, mut cuepoint) = self.windows.remove(index);
        cuepoint.destroy();
        self.refresh_tracking();
    }

    /// Drops every window at once. Unlike `remove` this skips `on_destroy`.
    pub fn clear(&mut self) {
        self.windows.clear();
        self.tracking = false;
    }

    #[rustfmt::skip]
    pub fn tick(&mut self, tick: &ClockTick) {
        // Intermediate scrub positions never evaluate; the registry sits idle
        // until the completion tick lands.
        if tick.seeking {
            return;
        }

        self.latest = tick.pos;
        if self.tracking {
            match tick.seeked {
                true => self.drift.reset(tick.pos),
                false => self.drift.record(tick.pos),
            }
        }

        let mut stopped_once: TinyVec<[CuepointId; SHORT_LIST]> = TinyVec::new();
        let shared = self.drift.max_error();

        for (id, cuepoint) in self.windows.iter_mut() {
            let margin = if cuepoint.consider_error { shared } else { p32(0.) };
            let standing = cuepoint.evaluate(tick.pos, tick.seeked, margin, &mut self.actions);
            if cuepoint.once && standing == Standing::Stopped {
                stopped_once.push(*id);
            }
        }

        stopped_once.into_iter().for_each(|id| self.actions.remove(id));
        self.flush();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn is_running(&self, id: CuepointId) -> bool {
        self.windows
            .iter()
            .any(|(entry, cuepoint)| *entry == id && cuepoint.is_running())
    }

    pub fn max_error(&self) -> P32 {
        self.drift.max_error()
    }

    fn margin_for(&self, cuepoint: &Cuepoint) -> P32 {
        if cuepoint.consider_error {
            self.drift.max_error()
        } else {
            p32(0.)
        }
    }

    // `on_destroy` takes no actions handle, so one drain settles everything.
    fn flush(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let removals = std::mem::take(&mut self.actions.removals);
        let additions = std::mem::take(&mut self.actions.additions);
        // Additions land first so a removal queued in the same pass can
        // cancel a window that was also queued in that pass.
        self.windows.extend(additions);
        removals.into_iter().for_each(|id| self.remove(id));
        self.refresh_tracking();
    }

    fn refresh_tracking(&mut self) {
        let tracking = self.windows.iter().any(|(_, cuepoint)| cuepoint.consider_error);
        if tracking && !self.tracking {
            self.drift.reset(self.latest);
        }
        self.tracking = tracking;
    }
}

pub fn evaluate_cuepoints(
    mut ticks: EventReader<ClockTick>,
    mut registry: ResMut<CuepointRegistry>,
) {
    ticks.iter().for_each(|tick| registry.tick(tick));
}

/// Requires [`ClockPlugin`](crate::clock::ClockPlugin) for the tick events.
pub struct CuepointPlugin;

impl Plugin for CuepointPlugin {
    fn build(&self, game: &mut App) {
        game.init_resource::<CuepointRegistry>()
            .add_system(evaluate_cuepoints.after(broadcast_clock));
    }
}
