pub mod kira;
pub mod remote;

use bevy::prelude::*;
use derive_more::From;
use educe::Educe;
use tap::Pipe;

use crate::utils::*;

use kira::AudioApp;

pub use kira::{MediaChannel, MediaLoadEvent, MediaSession};
pub use remote::{RemoteBridge, RemoteCommand, RemoteReport};

/// One observed change of the media clock. `seeking` ticks carry scrub
/// positions and are never evaluated; a `seeked` tick is the completion pass
/// for a finished seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub pos: P32,
    pub seeking: bool,
    pub seeked: bool,
}

/// Load or decode failure surfaced by whichever backend owns the source.
/// Nothing retries automatically; the player layer decides what to show.
#[derive(Debug, Clone, PartialEq, Eq, From)]
pub struct MediaError(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transport {
    Play,
    Pause,
    SeekTo(P32),
}

/// The one shared time source. Backends write position and seek state into
/// it; `broadcast_clock` turns state changes into [`ClockTick`] events for
/// every subscriber. Constructed and owned per player instance, never a
/// process-wide global.
#[derive(Resource, Educe)]
#[educe(Default)]
pub struct MediaClock {
    #[educe(Default(expression = "p32(0.)"))]
    pos: P32,
    dur: Option<P32>,
    #[educe(Default(expression = "p32(1.)"))]
    rate: P32,
    playing: bool,
    seeking: bool,
    seek_target: Option<P32>,
    pending_seeked: bool,
    #[educe(Default(expression = "Some(p32(0.))"))]
    last_broadcast: Option<P32>,
    commands: Vec<Transport>,
}

impl MediaClock {
    pub fn pos(&self) -> P32 {
        self.pos
    }

    pub fn duration(&self) -> Option<P32> {
        self.dur
    }

    /// Observed media seconds per wall second; `0` while settled or while
    /// the reported position slips backward.
    pub fn rate(&self) -> P32 {
        self.rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking
    }

    pub fn play(&mut self) {
        self.commands.push(Transport::Play);
    }

    pub fn pause(&mut self) {
        self.commands.push(Transport::Pause);
    }

    pub fn seek_to(&mut self, target: P32) {
        self.commands.push(Transport::SeekTo(target));
    }

    /// Source change: forget the old source entirely before the new one's
    /// metadata lands. Queued transport commands die with the old source.
    pub fn detach(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn drain_commands(&mut self) -> Vec<Transport> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn report_pos(&mut self, pos: P32) {
        self.pos = pos;
    }

    pub(crate) fn set_duration(&mut self, dur: P32) {
        self.dur = Some(dur);
    }

    pub(crate) fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub(crate) fn begin_seek(&mut self, target: P32) {
        self.seeking = true;
        self.seek_target = Some(target);
    }

    pub(crate) fn finish_seek(&mut self, pos: P32) {
        self.pos = pos;
        self.seeking = false;
        self.seek_target = None;
        self.pending_seeked = true;
    }

    pub(crate) fn seek_target(&self) -> Option<P32> {
        self.seek_target
    }

    fn take_seeked(&mut self) -> bool {
        std::mem::take(&mut self.pending_seeked)
    }
}

/// Emission is change-driven: a paused, settled clock stays silent instead
/// of spamming identical ticks every frame.
#[rustfmt::skip]
pub fn broadcast_clock(
    time: Res<Time>,
    mut clock: ResMut<MediaClock>,
    mut ticks: EventWriter<ClockTick>,
) {
    let seeked = clock.take_seeked();
    let moved = clock.last_broadcast != Some(clock.pos);

    if clock.seeking {
        if moved {
            ticks.send(ClockTick { pos: clock.pos, seeking: true, seeked: false });
            clock.last_broadcast = Some(clock.pos);
        }
        return;
    }

    if !(seeked || moved) {
        clock.rate = p32(0.);
        return;
    }

    // Signed delta: backward poll jitter reads as a stall, not a spike.
    clock.rate = match clock.last_broadcast {
        Some(previous) if !seeked && 0. < time.delta_seconds() => {
            ((clock.pos.raw() - previous.raw()).max(0.) / time.delta_seconds()).pipe(p32)
        }
        _ => clock.rate,
    };

    ticks.send(ClockTick { pos: clock.pos, seeking: false, seeked });
    clock.last_broadcast = Some(clock.pos);
}

pub struct ClockPlugin;

impl Plugin for ClockPlugin {
    fn build(&self, game: &mut App) {
        game.add_plugin(kira::KiraPlugin)
            .add_audio_channel::<MediaChannel>()
            .init_resource::<MediaClock>()
            .init_resource::<MediaSession>()
            .add_event::<ClockTick>()
            .add_event::<MediaError>()
            .add_event::<MediaLoadEvent>()
            .add_event::<RemoteReport>()
            .add_event::<RemoteCommand>()
            .add_systems(
                (
                    kira::load_media,
                    kira::apply_transport,
                    kira::drive_clock,
                    remote::ingest_reports,
                    remote::relay_transport,
                    broadcast_clock,
                )
                    .chain(),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn harness() -> App {
        let mut game = App::new();
        // Bare Events resource: nothing ages ticks out between asserts.
        game.init_resource::<MediaClock>()
            .init_resource::<Time>()
            .init_resource::<Events<ClockTick>>()
            .add_system(broadcast_clock);
        game
    }

    fn advance(game: &mut App, by: Duration) {
        let now = Instant::now();
        game.world.resource_mut::<Time>().update_with_instant(now + by);
        game.update();
    }

    fn sent_ticks(game: &mut App) -> Vec<ClockTick> {
        let events = game.world.resource::<Events<ClockTick>>();
        events.get_reader().iter(events).copied().collect()
    }

    #[test]
    fn settled_clock_emits_nothing() {
        let mut game = harness();
        advance(&mut game, Duration::from_millis(16));
        advance(&mut game, Duration::from_millis(32));
        assert_eq!(Vec::<ClockTick>::new(), sent_ticks(&mut game));
        assert_eq!(p32(0.), game.world.resource::<MediaClock>().rate());
    }

    #[test]
    fn movement_emits_one_tick_per_change() {
        let mut game = harness();
        game.world.resource_mut::<MediaClock>().report_pos(p32(1.));
        advance(&mut game, Duration::from_millis(16));
        advance(&mut game, Duration::from_millis(32));

        let ticks = sent_ticks(&mut game);
        assert_eq!(1, ticks.len());
        assert_eq!(
            ClockTick { pos: p32(1.), seeking: false, seeked: false },
            ticks[0]
        );
    }

    #[test]
    fn seek_completion_is_flagged_once() {
        let mut game = harness();
        game.world.resource_mut::<MediaClock>().begin_seek(p32(30.));
        advance(&mut game, Duration::from_millis(16));
        game.world.resource_mut::<MediaClock>().finish_seek(p32(30.));
        advance(&mut game, Duration::from_millis(16));

        let ticks = sent_ticks(&mut game);
        assert!(ticks.iter().any(|tick| tick.seeked && tick.pos == p32(30.)));
        assert_eq!(1, ticks.iter().filter(|tick| tick.seeked).count());
    }

    #[test]
    fn scrub_positions_stay_marked_as_seeking() {
        let mut game = harness();
        {
            let mut clock = game.world.resource_mut::<MediaClock>();
            clock.begin_seek(p32(50.));
            clock.report_pos(p32(20.));
        }
        advance(&mut game, Duration::from_millis(16));

        let ticks = sent_ticks(&mut game);
        assert_eq!(1, ticks.len());
        assert!(ticks[0].seeking && !ticks[0].seeked);
    }

    #[test]
    fn detach_resets_everything() {
        let mut clock = MediaClock::default();
        clock.report_pos(p32(12.));
        clock.set_duration(p32(60.));
        clock.set_playing(true);
        clock.begin_seek(p32(40.));
        clock.play();

        clock.detach();
        assert_eq!(p32(0.), clock.pos());
        assert_eq!(None, clock.duration());
        assert!(!clock.is_playing());
        assert!(!clock.is_seeking());
        assert!(clock.drain_commands().is_empty());
    }

    #[test]
    fn rate_tracks_observed_progression() {
        let mut game = harness();
        game.world.resource_mut::<MediaClock>().report_pos(p32(1.));
        advance(&mut game, Duration::from_millis(16));

        game.world.resource_mut::<MediaClock>().report_pos(p32(1.25));
        let now = Instant::now();
        game.world
            .resource_mut::<Time>()
            .update_with_instant(now + Duration::from_millis(250));
        game.update();

        let rate = game.world.resource::<MediaClock>().rate().raw();
        assert!((rate - 1.).abs() < 0.1, "observed rate {rate}");
    }

    #[test]
    fn backward_jitter_reads_as_a_stall() {
        let mut game = harness();
        game.world.resource_mut::<MediaClock>().report_pos(p32(1.));
        advance(&mut game, Duration::from_millis(16));

        game.world.resource_mut::<MediaClock>().report_pos(p32(0.75));
        advance(&mut game, Duration::from_millis(16));

        assert_eq!(p32(0.), game.world.resource::<MediaClock>().rate());
    }
}
