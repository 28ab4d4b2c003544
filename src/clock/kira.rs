use bevy::{asset::FileAssetIo, prelude::*};
pub use bevy_kira_audio::prelude::{
    AudioInstance as KiraInstance, AudioPlugin as KiraPlugin, AudioSource as KiraSource, *,
};
use tap::{Pipe, Tap};

use super::{MediaClock, MediaError, Transport};
use crate::utils::*;

// How close the reported position must land to the target before a pending
// seek counts as finished. Kira settles within a frame; a stalled source
// simply never converges and the clock stays seeking.
const SEEK_SETTLE: f32 = 0.05;

#[derive(Resource, Default)]
pub struct MediaChannel;

/// Handle of the currently playing native source. A default handle means no
/// native source is attached and every system here is a no-op.
#[derive(Resource, Default, Debug)]
pub struct MediaSession {
    pub source_id: String,
    pub handle: Handle<KiraInstance>,
}

#[derive(Debug, Clone)]
pub struct MediaLoadEvent {
    pub source_id: String,
    pub start_from: P32,
}

#[rustfmt::skip]
pub fn load_media(
    media_channel: Res<AudioChannel<MediaChannel>>,
    mut load_events: EventReader<MediaLoadEvent>,
    mut kira_sources: ResMut<Assets<KiraSource>>,
    mut clock: ResMut<MediaClock>,
    mut errors: EventWriter<MediaError>,
    mut session: ResMut<MediaSession>,
) {
    let Some(MediaLoadEvent { source_id, start_from }) = load_events.iter().last() else {
        return
    };

    let Ok(source) = FileAssetIo::get_base_path()
        .tap_mut(|path| path.push("assets"))
        .tap_mut(|path| path.push("media"))
        .tap_mut(|path| path.push(source_id))
        .tap_mut(|path| path.push("media.ogg"))
        .pipe(|path| StaticSoundData::from_file(path, StaticSoundSettings::default()))
        .map(|sound| KiraSource { sound })
    else {
        error!("could not load media source {source_id}");
        errors.send(MediaError(format!("could not load media source {source_id}")));
        return;
    };

    media_channel.stop();
    clock.detach();
    clock.set_duration(source.sound.duration().as_secs_f32().pipe(p32));
    clock.report_pos(*start_from);
    clock.set_playing(true);

    *session = MediaSession {
        source_id: source_id.clone(),
        handle: media_channel
            .play(kira_sources.add(source))
            .start_from(start_from.raw() as f64)
            .handle(),
    };
}

pub fn apply_transport(
    session: Res<MediaSession>,
    mut instances: ResMut<Assets<KiraInstance>>,
    mut clock: ResMut<MediaClock>,
) {
    let Some(instance) = instances.get_mut(&session.handle) else {
        return;
    };

    for command in clock.drain_commands() {
        match command {
            Transport::Play => {
                instance.resume(AudioTween::default());
                clock.set_playing(true);
            }
            Transport::Pause => {
                instance.pause(AudioTween::default());
                clock.set_playing(false);
            }
            Transport::SeekTo(target) => {
                instance.seek_to(target.raw() as f64);
                clock.begin_seek(target);
            }
        }
    }
}

pub fn drive_clock(
    session: Res<MediaSession>,
    instances: Res<Assets<KiraInstance>>,
    mut clock: ResMut<MediaClock>,
) {
    let Some(pos) = instances
        .get(&session.handle)
        .and_then(|instance| instance.state().position())
        .map(|pos| p32(pos as f32))
    else {
        return;
    };

    match clock.seek_target() {
        Some(target) if abs_delta(pos, target).raw() <= SEEK_SETTLE => clock.finish_seek(pos),
        Some(_) => {}
        None => clock.report_pos(pos),
    }
}
