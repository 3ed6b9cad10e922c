//! Corpus extraction module.
//!
//! Turns a directory of MIDI files into one token stream and its vocabulary.

pub mod extractor;

// Re-export commonly used items
pub use extractor::{
    discover_midi_files, extract_corpus, part_to_events, Corpus, ExtractionStats, MIDI_EXTENSIONS,
};
