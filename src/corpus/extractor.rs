//! Corpus extraction.
//!
//! Walks a genre directory, parses every MIDI file and linearizes one part
//! per file into [`MusicalEvent`]s. A file that fails to parse is skipped
//! with a warning; it never aborts the corpus.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::midi::{Element, InstrumentTag, Part, ScoreParser};
use crate::types::{MusicalEvent, Vocabulary};

/// File extensions recognised as MIDI, compared case-insensitively.
pub const MIDI_EXTENSIONS: &[&str] = &["mid", "midi"];

/// Token stream and vocabulary of one corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    /// All extracted events, concatenated in walk order.
    pub stream: Vec<MusicalEvent>,
    /// Distinct events of `stream`, in first-seen order.
    pub vocabulary: Vocabulary,
    /// Counters describing the walk.
    pub stats: ExtractionStats,
}

/// Per-walk counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Candidate files found.
    pub files_found: usize,
    /// Files parsed successfully.
    pub files_parsed: usize,
    /// Files skipped because parsing failed.
    pub files_failed: usize,
    /// Parsed files without a usable part.
    pub files_without_part: usize,
}

/// Lists MIDI files under `root`, recursively, in a deterministic order.
///
/// Entries are visited sorted by file name; files of a directory come in
/// the same pass as its subdirectories. A missing root yields no files.
pub fn discover_midi_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    walk(root, &mut files);
    files
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
    debug!("Loading MIDI files from '{}'...", dir.display());

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if dir.exists() {
                warn!("Cannot read directory '{}': {}", dir.display(), e);
            }
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            walk(&path, files);
        } else if has_midi_extension(&path) {
            files.push(path);
        }
    }
}

fn has_midi_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            MIDI_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Converts a part's notes and chords into events. Rests are skipped.
pub fn part_to_events(part: &Part) -> Vec<MusicalEvent> {
    part.elements
        .iter()
        .filter_map(|element| match element {
            Element::Note {
                velocity, duration, ..
            }
            | Element::Chord {
                velocity, duration, ..
            } => Some(MusicalEvent::cluster(
                &element.pitch_names(),
                *velocity,
                *duration,
            )),
            Element::Rest { .. } => None,
        })
        .collect()
}

/// Extracts the corpus rooted at `root`.
///
/// With an instrument filter, each file contributes its first part of that
/// instrument; otherwise its first part.
pub fn extract_corpus(
    root: &Path,
    parser: &dyn ScoreParser,
    instrument: Option<InstrumentTag>,
) -> Corpus {
    let files = discover_midi_files(root);
    let mut corpus = Corpus::default();
    corpus.stats.files_found = files.len();

    for (index, path) in files.iter().enumerate() {
        debug!("Extracting notes from file {}/{}...", index + 1, files.len());

        let score = match parser.parse(path) {
            Ok(score) => score,
            Err(e) => {
                warn!("MIDI file '{}' could not be parsed: {}", path.display(), e.message);
                corpus.stats.files_failed += 1;
                continue;
            }
        };
        corpus.stats.files_parsed += 1;

        let Some(part) = score.select_part(instrument) else {
            warn!(
                "MIDI file '{}' has no {} part, skipping",
                path.display(),
                instrument.map(|t| t.as_str()).unwrap_or("playable")
            );
            corpus.stats.files_without_part += 1;
            continue;
        };

        let events = part_to_events(part);
        corpus.vocabulary.extend(&events);
        corpus.stream.extend(events);
    }

    info!(
        "Loaded {} of {} MIDI files ({} failed).",
        corpus.stats.files_parsed, corpus.stats.files_found, corpus.stats.files_failed
    );
    debug!(
        "Extracted {} notes ({} individual notes).",
        corpus.stream.len(),
        corpus.vocabulary.len()
    );
    corpus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use crate::midi::Score;
    use crate::types::QuarterLength;
    use std::collections::HashMap;

    /// Parser returning canned scores keyed by file name.
    struct FakeParser {
        scores: HashMap<String, Score>,
    }

    impl ScoreParser for FakeParser {
        fn parse(&self, path: &Path) -> Result<Score> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.scores
                .get(&name)
                .cloned()
                .ok_or_else(|| PipelineError::parse_failed(name, "unreadable"))
        }
    }

    fn note(key: u8) -> Element {
        Element::Note {
            key,
            velocity: 90,
            duration: QuarterLength::quarters(1),
        }
    }

    fn part(instrument: InstrumentTag, elements: Vec<Element>) -> Part {
        Part {
            name: None,
            instrument,
            elements,
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovers_recursively_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.mid"));
        touch(&dir.path().join("a.MIDI"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub").join("c.mid"));

        let files = discover_midi_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.MIDI", "b.mid", "sub/c.mid"]);
    }

    #[test]
    fn missing_root_yields_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let parser = FakeParser {
            scores: HashMap::new(),
        };
        let corpus = extract_corpus(&dir.path().join("nope"), &parser, None);
        assert!(corpus.stream.is_empty());
        assert!(corpus.vocabulary.is_empty());
        assert_eq!(corpus.stats, ExtractionStats::default());
    }

    #[test]
    fn failed_files_contribute_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("good.mid"));
        touch(&dir.path().join("bad.mid"));

        let mut scores = HashMap::new();
        scores.insert(
            "good.mid".to_string(),
            Score {
                parts: vec![part(
                    InstrumentTag::Piano,
                    vec![note(60), note(64), note(67), note(60), note(62)],
                )],
            },
        );
        let corpus = extract_corpus(dir.path(), &FakeParser { scores }, None);

        let pitches: Vec<_> = corpus.stream.iter().map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec!["C4", "E4", "G4", "C4", "D4"]);
        assert_eq!(corpus.vocabulary.len(), 4);
        assert_eq!(corpus.stats.files_found, 2);
        assert_eq!(corpus.stats.files_parsed, 1);
        assert_eq!(corpus.stats.files_failed, 1);
    }

    #[test]
    fn stream_concatenates_files_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("1.mid"));
        touch(&dir.path().join("2.mid"));

        let mut scores = HashMap::new();
        scores.insert(
            "1.mid".to_string(),
            Score {
                parts: vec![part(InstrumentTag::Piano, vec![note(60), note(62)])],
            },
        );
        scores.insert(
            "2.mid".to_string(),
            Score {
                parts: vec![part(InstrumentTag::Piano, vec![note(64)])],
            },
        );
        let corpus = extract_corpus(dir.path(), &FakeParser { scores }, None);
        let pitches: Vec<_> = corpus.stream.iter().map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec!["C4", "D4", "E4"]);
    }

    #[test]
    fn instrument_filter_picks_matching_part() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("song.mid"));
        touch(&dir.path().join("drums_only.mid"));

        let mut scores = HashMap::new();
        scores.insert(
            "song.mid".to_string(),
            Score {
                parts: vec![
                    part(InstrumentTag::Bass, vec![note(40)]),
                    part(InstrumentTag::Piano, vec![note(72)]),
                ],
            },
        );
        scores.insert(
            "drums_only.mid".to_string(),
            Score {
                parts: vec![part(InstrumentTag::Drums, vec![note(36)])],
            },
        );
        let parser = FakeParser { scores };

        let unfiltered = extract_corpus(dir.path(), &parser, None);
        let pitches: Vec<_> = unfiltered.stream.iter().map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec!["C2", "E2"]);

        let piano = extract_corpus(dir.path(), &parser, Some(InstrumentTag::Piano));
        let pitches: Vec<_> = piano.stream.iter().map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec!["C5"]);
        assert_eq!(piano.stats.files_without_part, 1);
    }

    #[test]
    fn chords_become_clusters_and_rests_are_skipped() {
        let p = part(
            InstrumentTag::Piano,
            vec![
                Element::Chord {
                    keys: vec![60, 64, 67],
                    velocity: 70,
                    duration: QuarterLength::quarters(2),
                },
                Element::Rest {
                    duration: QuarterLength::quarters(1),
                },
                note(62),
            ],
        );
        let events = part_to_events(&p);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].pitch(), "C4:E4:G4");
        assert_eq!(events[0].velocity(), 70);
        assert_eq!(events[0].duration(), QuarterLength::quarters(2));
        assert!(events.iter().all(|e| e.delay().is_zero()));
        assert_eq!(events[1].pitch(), "D4");
    }
}
