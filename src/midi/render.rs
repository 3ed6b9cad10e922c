//! Rendering token sequences back into MIDI files.
//!
//! Events are laid end to end on a single piano track: each onset is the
//! previous onset plus the previous duration. A cluster pitch string
//! becomes a chord struck in pitch-string order. Delay is not applied.

use std::fs;
use std::path::Path;

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::MusicalEvent;

use super::pitch::name_to_key;

/// Preferred tick resolution of rendered files.
pub const RENDER_TICKS_PER_QUARTER: u16 = 480;

/// Largest resolution a metrical SMF header can carry.
const MAX_TICKS_PER_QUARTER: u64 = 0x7FFF;

/// Largest delta time a track event can carry.
const MAX_DELTA_TICKS: u64 = 0x0FFF_FFFF;

/// Tempo of rendered files in microseconds per quarter (120 BPM).
const RENDER_TEMPO: u32 = 500_000;

/// Acoustic grand piano.
const RENDER_PROGRAM: u8 = 0;

const RENDER_CHANNEL: u8 = 0;

/// Renders events to a MIDI file.
///
/// The file is written to a temporary sibling first and renamed into place.
pub fn render_events(events: &[MusicalEvent], path: &Path) -> Result<()> {
    let bytes = events_to_smf_bytes(events)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            PipelineError::render_failed(format!("cannot create {}: {}", parent.display(), e))
        })?;
    }

    let tmp = path.with_extension("mid.tmp");
    fs::write(&tmp, &bytes).map_err(|e| {
        PipelineError::render_failed(format!("cannot write {}: {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        PipelineError::render_failed(format!("cannot move file to {}: {}", path.display(), e))
    })?;

    debug!("Saved MIDI file with {} events to {}", events.len(), path.display());
    Ok(())
}

/// Renders events into in-memory Standard MIDI File bytes.
///
/// Durations are written exactly: the resolution is 480 ticks per quarter
/// when every duration lands on a tick, otherwise the least common multiple
/// of the duration denominators. Velocity 0 is written as 1, since a
/// zero-velocity note-on means note-off.
pub fn events_to_smf_bytes(events: &[MusicalEvent]) -> Result<Vec<u8>> {
    let ticks_per_quarter = render_resolution(events)?;
    let channel = u4::new(RENDER_CHANNEL);
    let mut track: Track<'static> = Vec::new();

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(b"Piano")),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(RENDER_TEMPO))),
    });
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(RENDER_PROGRAM),
            },
        },
    });

    for event in events {
        let keys = event
            .pitch_names()
            .map(|name| {
                name_to_key(name).ok_or_else(|| {
                    PipelineError::render_failed(format!(
                        "unparsable pitch '{}' in event {}",
                        name, event
                    ))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        let ticks = event
            .duration()
            .exact_ticks(ticks_per_quarter)
            .filter(|t| *t <= MAX_DELTA_TICKS)
            .ok_or_else(|| {
                PipelineError::render_failed(format!(
                    "duration {} of event {} does not fit a MIDI delta time",
                    event.duration(),
                    event
                ))
            })?
            .max(1) as u32;
        let velocity = u7::new(event.velocity().max(1));

        for &key in &keys {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOn {
                        key: u7::new(key),
                        vel: velocity,
                    },
                },
            });
        }
        for (i, &key) in keys.iter().enumerate() {
            track.push(TrackEvent {
                delta: u28::new(if i == 0 { ticks } else { 0 }),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::NoteOff {
                        key: u7::new(key),
                        vel: u7::new(0),
                    },
                },
            });
        }
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(ticks_per_quarter)),
    ));
    smf.tracks.push(track);

    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| PipelineError::render_failed(e.to_string()))?;
    Ok(buf)
}

/// Picks a tick resolution at which every event duration is a whole tick.
fn render_resolution(events: &[MusicalEvent]) -> Result<u16> {
    let mut lcm: u64 = 1;
    for event in events {
        let den = u64::from(event.duration().denominator());
        lcm = lcm / gcd(lcm, den) * den;
        if lcm > MAX_TICKS_PER_QUARTER {
            return Err(PipelineError::render_failed(format!(
                "duration {} of event {} needs more than {} ticks per quarter",
                event.duration(),
                event,
                MAX_TICKS_PER_QUARTER
            )));
        }
    }

    if u64::from(RENDER_TICKS_PER_QUARTER) % lcm == 0 {
        return Ok(RENDER_TICKS_PER_QUARTER);
    }
    u16::try_from(lcm).map_err(|_| PipelineError::render_failed("tick resolution out of range"))
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::parser::{parse_smf_bytes, MidiParser, ScoreParser};
    use crate::midi::score::Element;
    use crate::types::QuarterLength;

    #[test]
    fn renders_notes_and_chords_end_to_end() {
        let events = vec![
            MusicalEvent::new("C4", 80, QuarterLength::quarters(1)),
            MusicalEvent::new("E4:G4", 60, QuarterLength::new(1, 2).unwrap()),
        ];
        let bytes = events_to_smf_bytes(&events).unwrap();
        let score = parse_smf_bytes(&bytes).unwrap();

        assert_eq!(score.parts.len(), 1);
        assert_eq!(
            score.parts[0].elements,
            vec![
                Element::Note {
                    key: 60,
                    velocity: 80,
                    duration: QuarterLength::quarters(1)
                },
                Element::Chord {
                    keys: vec![64, 67],
                    velocity: 60,
                    duration: QuarterLength::new(1, 2).unwrap()
                },
            ]
        );
    }

    #[test]
    fn rejects_unparsable_pitch() {
        let events = vec![MusicalEvent::new("X9", 80, QuarterLength::quarters(1))];
        let err = events_to_smf_bytes(&events).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RenderFailed);
    }

    #[test]
    fn render_writes_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("song.mid");
        let events = vec![MusicalEvent::new("A4", 100, QuarterLength::quarters(2))];

        render_events(&events, &path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("mid.tmp").exists());
        let score = MidiParser::new().parse(&path).unwrap();
        assert_eq!(score.parts[0].elements.len(), 1);
    }

    #[test]
    fn fine_durations_render_exactly() {
        let fine = QuarterLength::new(1, 384).unwrap();
        let events = vec![
            MusicalEvent::new("C4", 80, QuarterLength::quarters(1)),
            MusicalEvent::new("D4", 80, fine),
        ];
        let bytes = events_to_smf_bytes(&events).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(384)));

        let score = parse_smf_bytes(&bytes).unwrap();
        assert_eq!(
            score.parts[0].elements[1],
            Element::Note {
                key: 62,
                velocity: 80,
                duration: fine
            }
        );
    }

    #[test]
    fn default_resolution_when_durations_divide_it() {
        let events = vec![MusicalEvent::new("C4", 80, QuarterLength::new(1, 3).unwrap())];
        let bytes = events_to_smf_bytes(&events).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(
            smf.header.timing,
            Timing::Metrical(u15::new(RENDER_TICKS_PER_QUARTER))
        );
    }

    #[test]
    fn rejects_durations_beyond_midi_range() {
        let long = vec![MusicalEvent::new("C4", 80, QuarterLength::quarters(1 << 20))];
        let err = events_to_smf_bytes(&long).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RenderFailed);

        let fine = vec![
            MusicalEvent::new("C4", 80, QuarterLength::new(1, 32749).unwrap()),
            MusicalEvent::new("D4", 80, QuarterLength::new(1, 7).unwrap()),
        ];
        let err = events_to_smf_bytes(&fine).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RenderFailed);
    }

    #[test]
    fn silent_velocity_still_sounds() {
        let events = vec![MusicalEvent::new("C4", 0, QuarterLength::quarters(1))];
        let bytes = events_to_smf_bytes(&events).unwrap();
        let score = parse_smf_bytes(&bytes).unwrap();

        assert_eq!(score.parts.len(), 1);
        assert_eq!(
            score.parts[0].elements,
            vec![Element::Note {
                key: 60,
                velocity: 1,
                duration: QuarterLength::quarters(1)
            }]
        );
    }

    #[test]
    fn empty_sequence_renders_valid_file() {
        let bytes = events_to_smf_bytes(&[]).unwrap();
        let score = parse_smf_bytes(&bytes).unwrap();
        assert!(score.parts.is_empty());
    }
}
