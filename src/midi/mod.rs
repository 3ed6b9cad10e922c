//! MIDI adapter.
//!
//! - [`parser`]: Standard MIDI File -> [`Score`] via the [`ScoreParser`] trait
//! - [`render`]: token sequence -> Standard MIDI File
//! - [`pitch`]: key number <-> pitch name spelling
//! - [`score`]: parts, elements and instrument tags

pub mod parser;
pub mod pitch;
pub mod render;
pub mod score;

// Re-export commonly used items
pub use parser::{parse_smf_bytes, MidiParser, ScoreParser};
pub use pitch::{key_to_name, name_to_key};
pub use render::{events_to_smf_bytes, render_events, RENDER_TICKS_PER_QUARTER};
pub use score::{Element, InstrumentTag, Part, Score};
