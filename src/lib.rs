pub mod clock;
pub mod cuepoint;
pub mod utils;

use bevy::prelude::*;

pub use clock::{
    ClockPlugin, ClockTick, MediaClock, MediaError, MediaLoadEvent, RemoteBridge, RemoteCommand,
    RemoteReport,
};
pub use cuepoint::{
    Cuepoint, CuepointActions, CuepointId, CuepointPlugin, CuepointRegistry, TimeSpan,
};
pub use utils::{p32, P32};

pub struct CueEnginePlugin;

impl Plugin for CueEnginePlugin {
    fn build(&self, game: &mut App) {
        game.add_plugin(ClockPlugin).add_plugin(CuepointPlugin);
    }
}
