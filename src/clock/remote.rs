use bevy::prelude::*;
use itertools::Itertools;

use super::{MediaClock, MediaError, Transport};
use crate::utils::*;

/// Marker resource. Insert it to route the clock through an external embed
/// bridge (iframe player, stream sidecar) instead of a native source.
#[derive(Resource, Default)]
pub struct RemoteBridge;

/// Position report from the embed bridge, at whatever granularity the embed
/// offers. Coarse reports are exactly what the drift margin compensates for.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReport {
    pub pos: P32,
    pub duration: Option<P32>,
    pub seeking: bool,
    pub error: Option<String>,
}

impl RemoteReport {
    pub fn at(pos: P32) -> Self {
        Self {
            pos,
            duration: None,
            seeking: false,
            error: None,
        }
    }
}

/// Transport relayed outward for the bridge to execute on the embed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    SeekTo(P32),
}

#[rustfmt::skip]
pub fn ingest_reports(
    bridge: Option<Res<RemoteBridge>>,
    mut reports: EventReader<RemoteReport>,
    mut clock: ResMut<MediaClock>,
    mut errors: EventWriter<MediaError>,
) {
    if bridge.is_none() {
        return;
    }

    // Embeds repeat the same position between polls; identical neighbours
    // carry no new information.
    let fresh = reports
        .iter()
        .dedup_by(|a, b| a.pos == b.pos && a.seeking == b.seeking && a.error == b.error);

    for report in fresh {
        if let Some(message) = &report.error {
            error!("remote media source failed: {message}");
            errors.send(MediaError(message.clone()));
            continue;
        }

        if let Some(duration) = report.duration {
            clock.set_duration(duration);
        }

        match (clock.is_seeking(), report.seeking) {
            // Seek initiated on the embed side (user scrubbed its own UI).
            (false, true) => clock.begin_seek(report.pos),
            (true, false) => clock.finish_seek(report.pos),
            _ => clock.report_pos(report.pos),
        }
    }
}

pub fn relay_transport(
    bridge: Option<Res<RemoteBridge>>,
    mut clock: ResMut<MediaClock>,
    mut commands: EventWriter<RemoteCommand>,
) {
    if bridge.is_none() {
        return;
    }

    for command in clock.drain_commands() {
        commands.send(match command {
            Transport::Play => {
                clock.set_playing(true);
                RemoteCommand::Play
            }
            Transport::Pause => {
                clock.set_playing(false);
                RemoteCommand::Pause
            }
            Transport::SeekTo(target) => {
                clock.begin_seek(target);
                RemoteCommand::SeekTo(target)
            }
        });
    }
}
