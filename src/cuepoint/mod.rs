pub mod drift;
pub mod registry;

use std::panic::{catch_unwind, AssertUnwindSafe};

use bevy::prelude::*;
use derive_more::From;

use crate::utils::*;

pub use registry::{CuepointActions, CuepointPlugin, CuepointRegistry};

pub type Callback = Box<dyn FnMut(P32, &mut CuepointActions) + Send + Sync>;
pub type DestroyCallback = Box<dyn FnMut() + Send + Sync>;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, From)]
pub struct CuepointId(u64);

/// Half-open interval `[start, end)`. `None` on either side means unbounded.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct TimeSpan {
    pub start: Option<P32>,
    pub end: Option<P32>,
}

impl TimeSpan {
    pub fn new(start: impl Into<Option<P32>>, end: impl Into<Option<P32>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, t: P32) -> bool {
        self.start.map_or(true, |start| start <= t) && self.end.map_or(true, |end| t < end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Standing {
    Idle,
    Running,
    Stopped,
}

/// One registered time window with its lifecycle callbacks. `running` tracks
/// whether the last evaluated clock sample fell inside the span and the
/// window has not since exited by time progression or by a backward seek.
#[derive(Default)]
pub struct Cuepoint {
    pub span: TimeSpan,
    pub consider_error: bool,
    pub once: bool,
    running: bool,
    on_start: Option<Callback>,
    on_update: Option<Callback>,
    on_stop: Option<Callback>,
    on_seekout: Option<Callback>,
    on_destroy: Option<DestroyCallback>,
}

impl Cuepoint {
    pub fn spanning(span: TimeSpan) -> Self {
        Self {
            span,
            ..Self::default()
        }
    }

    /// Opt into the shared drift margin when checking the end boundary.
    pub fn considering_error(mut self) -> Self {
        self.consider_error = true;
        self
    }

    /// Remove the window from its registry as soon as it stops.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn on_start(
        mut self,
        callback: impl FnMut(P32, &mut CuepointActions) + Send + Sync + 'static,
    ) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    pub fn on_update(
        mut self,
        callback: impl FnMut(P32, &mut CuepointActions) + Send + Sync + 'static,
    ) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }

    pub fn on_stop(
        mut self,
        callback: impl FnMut(P32, &mut CuepointActions) + Send + Sync + 'static,
    ) -> Self {
        self.on_stop = Some(Box::new(callback));
        self
    }

    pub fn on_seekout(
        mut self,
        callback: impl FnMut(P32, &mut CuepointActions) + Send + Sync + 'static,
    ) -> Self {
        self.on_seekout = Some(Box::new(callback));
        self
    }

    pub fn on_destroy(mut self, callback: impl FnMut() + Send + Sync + 'static) -> Self {
        self.on_destroy = Some(Box::new(callback));
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    #[rustfmt::skip]
    pub(crate) fn evaluate(
        &mut self,
        t: P32,
        seeked: bool,
        max_error: P32,
        actions: &mut CuepointActions,
    ) -> Standing {
        if !self.running {
            if !self.span.contains(t) {
                return Standing::Idle;
            }
            // Entry fires the same way on natural progression and on seeks.
            self.running = true;
            invoke(&mut self.on_start, "on_start", t, actions);
            invoke(&mut self.on_update, "on_update", t, actions);
            return Standing::Running;
        }

        invoke(&mut self.on_update, "on_update", t, actions);

        // Only the lower bound exits through the seek path. A forward seek
        // past the end lands in the time-progression branch below.
        if seeked && self.span.start.map_or(false, |start| t < start) {
            self.running = false;
            invoke(&mut self.on_seekout, "on_seekout", t, actions);
            invoke(&mut self.on_stop, "on_stop", t, actions);
            return Standing::Stopped;
        }

        // The margin stops coarse sources early rather than letting them
        // sample straight past the end boundary.
        if self.span.end.map_or(false, |end| end <= t + max_error) {
            self.running = false;
            invoke(&mut self.on_stop, "on_stop", t, actions);
            return Standing::Stopped;
        }

        Standing::Running
    }

    pub(crate) fn destroy(&mut self) {
        let Some(callback) = self.on_destroy.as_mut() else { return };
        if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
            error!("cuepoint on_destroy callback panicked");
        }
    }
}

// The transition commits before the callback runs, so a panicking callback
// cannot leave `running` out of sync or starve sibling windows.
fn invoke(slot: &mut Option<Callback>, name: &str, t: P32, actions: &mut CuepointActions) {
    let Some(callback) = slot.as_mut() else { return };
    if catch_unwind(AssertUnwindSafe(|| callback(t, actions))).is_err() {
        error!("cuepoint {name} callback panicked");
    }
}
