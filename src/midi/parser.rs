//! MIDI file parsing into [`Score`]s.
//!
//! Every track that sounds at least one note becomes a part. Notes are
//! paired per (channel, key) in first-on/first-off order, notes sharing an
//! onset tick are grouped into a chord, and gaps become rests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::types::QuarterLength;

use super::score::{Element, InstrumentTag, Part, Score};

/// MIDI channel 10, reserved for percussion.
const DRUM_CHANNEL: u8 = 9;

/// Capability to turn a file into a [`Score`].
///
/// The corpus extractor only depends on this trait, so tests and other
/// formats can supply their own parser.
pub trait ScoreParser {
    /// Parses one file.
    fn parse(&self, path: &Path) -> Result<Score>;
}

/// Standard MIDI File parser backed by `midly`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidiParser;

impl MidiParser {
    /// Creates a parser.
    pub fn new() -> Self {
        Self
    }
}

impl ScoreParser for MidiParser {
    fn parse(&self, path: &Path) -> Result<Score> {
        let bytes = fs::read(path).map_err(|e| {
            PipelineError::parse_failed(path.display().to_string(), e.to_string())
        })?;
        parse_smf_bytes(&bytes)
            .map_err(|reason| PipelineError::parse_failed(path.display().to_string(), reason))
    }
}

/// Parses an in-memory Standard MIDI File.
pub fn parse_smf_bytes(bytes: &[u8]) -> std::result::Result<Score, String> {
    let smf = Smf::parse(bytes).map_err(|e| e.to_string())?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(..) => return Err("SMPTE timecode timing is not supported".to_string()),
    };
    if ticks_per_quarter == 0 {
        return Err("ticks per quarter note is zero".to_string());
    }

    let mut parts = Vec::new();
    for (index, track) in smf.tracks.iter().enumerate() {
        if let Some(part) = parse_track(track, ticks_per_quarter)? {
            parts.push(part);
        } else {
            debug!("Track {} has no notes, skipping", index);
        }
    }

    Ok(Score { parts })
}

/// A sounded note with absolute tick bounds.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: u32,
    end: u32,
    key: u8,
    velocity: u8,
    channel: u8,
    order: usize,
}

fn parse_track(
    track: &[TrackEvent<'_>],
    ticks_per_quarter: u16,
) -> std::result::Result<Option<Part>, String> {
    let mut tick: u32 = 0;
    let mut order = 0usize;
    let mut name = None;
    let mut program = None;
    let mut open: HashMap<(u8, u8), Vec<(u32, u8, usize)>> = HashMap::new();
    let mut spans = Vec::new();

    for event in track {
        tick = tick.saturating_add(event.delta.as_int());
        match event.kind {
            TrackEventKind::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((channel, key.as_int()))
                            .or_default()
                            .push((tick, vel.as_int(), order));
                        order += 1;
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        let key = key.as_int();
                        if let Some(pending) = open.get_mut(&(channel, key)) {
                            if !pending.is_empty() {
                                let (start, velocity, on_order) = pending.remove(0);
                                spans.push(Span {
                                    start,
                                    end: tick,
                                    key,
                                    velocity,
                                    channel,
                                    order: on_order,
                                });
                            }
                        }
                    }
                    MidiMessage::ProgramChange { program: p } => {
                        if program.is_none() && channel != DRUM_CHANNEL {
                            program = Some(p.as_int());
                        }
                    }
                    _ => {}
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                let text = String::from_utf8_lossy(bytes).trim().to_string();
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            _ => {}
        }
    }

    // Notes still held at the end of the track stop there.
    for ((channel, key), pending) in open {
        for (start, velocity, order) in pending {
            spans.push(Span {
                start,
                end: tick,
                key,
                velocity,
                channel,
                order,
            });
        }
    }

    spans.retain(|s| s.end > s.start);
    if spans.is_empty() {
        return Ok(None);
    }
    spans.sort_by_key(|s| (s.start, s.order));

    let instrument = if spans[0].channel == DRUM_CHANNEL {
        InstrumentTag::Drums
    } else {
        program.map(InstrumentTag::from_program).unwrap_or_default()
    };

    let elements = group_spans(&spans, ticks_per_quarter)?;
    Ok(Some(Part {
        name,
        instrument,
        elements,
    }))
}

/// Groups spans sharing an onset into chords and fills gaps with rests.
fn group_spans(spans: &[Span], ticks_per_quarter: u16) -> std::result::Result<Vec<Element>, String> {
    let to_ql = |ticks: u32| {
        QuarterLength::from_ticks(ticks, ticks_per_quarter)
            .ok_or_else(|| "ticks per quarter note is zero".to_string())
    };

    let mut elements = Vec::new();
    let mut cursor = 0u32;
    let mut i = 0;
    while i < spans.len() {
        let start = spans[i].start;
        let mut j = i;
        while j < spans.len() && spans[j].start == start {
            j += 1;
        }
        let group = &spans[i..j];

        if start > cursor {
            elements.push(Element::Rest {
                duration: to_ql(start - cursor)?,
            });
        }

        let end = group.iter().map(|s| s.end).max().unwrap_or(start);
        let duration = to_ql(end - start)?;
        let velocity = group[0].velocity;
        if group.len() == 1 {
            elements.push(Element::Note {
                key: group[0].key,
                velocity,
                duration,
            });
        } else {
            elements.push(Element::Chord {
                keys: group.iter().map(|s| s.key).collect(),
                velocity,
                duration,
            });
        }

        cursor = cursor.max(end);
        i = j;
    }

    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u28, u4, u7};
    use midly::{Format, Header, Track};

    fn on(delta: u32, channel: u8, key: u8, vel: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        }
    }

    fn off(delta: u32, channel: u8, key: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        }
    }

    fn program(channel: u8, program: u8) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::ProgramChange {
                    program: u7::new(program),
                },
            },
        }
    }

    fn end() -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn smf_bytes(tracks: Vec<Track<'static>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(480))));
        smf.tracks = tracks;
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    #[test]
    fn parses_notes_chords_and_rests() {
        let bytes = smf_bytes(vec![vec![
            program(0, 0),
            on(0, 0, 60, 80),
            off(480, 0, 60),
            // rest of one eighth
            on(240, 0, 64, 70),
            on(0, 0, 60, 71),
            on(0, 0, 67, 72),
            off(960, 0, 64),
            off(0, 0, 60),
            off(0, 0, 67),
            end(),
        ]]);

        let score = parse_smf_bytes(&bytes).unwrap();
        assert_eq!(score.parts.len(), 1);
        let part = &score.parts[0];
        assert_eq!(part.instrument, InstrumentTag::Piano);
        assert_eq!(
            part.elements,
            vec![
                Element::Note {
                    key: 60,
                    velocity: 80,
                    duration: QuarterLength::quarters(1)
                },
                Element::Rest {
                    duration: QuarterLength::new(1, 2).unwrap()
                },
                Element::Chord {
                    keys: vec![64, 60, 67],
                    velocity: 70,
                    duration: QuarterLength::quarters(2)
                },
            ]
        );
    }

    #[test]
    fn note_on_with_zero_velocity_ends_note() {
        let bytes = smf_bytes(vec![vec![on(0, 0, 62, 90), on(240, 0, 62, 0), end()]]);
        let score = parse_smf_bytes(&bytes).unwrap();
        assert_eq!(
            score.parts[0].elements,
            vec![Element::Note {
                key: 62,
                velocity: 90,
                duration: QuarterLength::new(1, 2).unwrap()
            }]
        );
    }

    #[test]
    fn resolves_instruments_and_skips_empty_tracks() {
        let bytes = smf_bytes(vec![
            vec![end()],
            vec![program(1, 33), on(0, 1, 40, 100), off(480, 1, 40), end()],
            vec![on(0, 9, 36, 100), off(120, 9, 36), end()],
        ]);
        let score = parse_smf_bytes(&bytes).unwrap();
        assert_eq!(score.parts.len(), 2);
        assert_eq!(score.parts[0].instrument, InstrumentTag::Bass);
        assert_eq!(score.parts[1].instrument, InstrumentTag::Drums);
    }

    #[test]
    fn rejects_non_midi_bytes() {
        assert!(parse_smf_bytes(b"definitely not a midi file").is_err());
    }

    #[test]
    fn parser_reports_path_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mid");
        std::fs::write(&path, b"garbage").unwrap();
        let err = MidiParser::new().parse(&path).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ParseFailed);
        assert!(err.message.contains("broken.mid"));
    }
}
