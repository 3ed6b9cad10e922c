//! Parsed score model.
//!
//! A [`Score`] is what the parser hands to the corpus extractor: a list of
//! parts, each tagged with one instrument family and holding its elements
//! in temporal order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::QuarterLength;

use super::pitch::key_to_name;

/// General MIDI instrument family of a part.
///
/// Resolved once at parse time from the part's first program change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentTag {
    /// Programs 0-7.
    #[default]
    Piano,
    /// Programs 8-15 (celesta, vibraphone, marimba...).
    ChromaticPercussion,
    /// Programs 16-23.
    Organ,
    /// Programs 24-31.
    Guitar,
    /// Programs 32-39.
    Bass,
    /// Programs 40-47.
    Strings,
    /// Programs 48-55 (string ensembles, choirs).
    Ensemble,
    /// Programs 56-63.
    Brass,
    /// Programs 64-71.
    Reed,
    /// Programs 72-79.
    Pipe,
    /// Programs 80-87.
    SynthLead,
    /// Programs 88-95.
    SynthPad,
    /// Programs 96-103.
    SynthEffects,
    /// Programs 104-111.
    Ethnic,
    /// Programs 112-119.
    Percussive,
    /// Programs 120-127.
    SoundEffects,
    /// Anything on MIDI channel 10.
    Drums,
}

impl InstrumentTag {
    /// All tags, in program order with drums last.
    pub const ALL: [InstrumentTag; 17] = [
        InstrumentTag::Piano,
        InstrumentTag::ChromaticPercussion,
        InstrumentTag::Organ,
        InstrumentTag::Guitar,
        InstrumentTag::Bass,
        InstrumentTag::Strings,
        InstrumentTag::Ensemble,
        InstrumentTag::Brass,
        InstrumentTag::Reed,
        InstrumentTag::Pipe,
        InstrumentTag::SynthLead,
        InstrumentTag::SynthPad,
        InstrumentTag::SynthEffects,
        InstrumentTag::Ethnic,
        InstrumentTag::Percussive,
        InstrumentTag::SoundEffects,
        InstrumentTag::Drums,
    ];

    /// Maps a General MIDI program number (0-127) to its family.
    pub fn from_program(program: u8) -> Self {
        Self::ALL[usize::from(program.min(127) / 8)]
    }

    /// Returns the string representation of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentTag::Piano => "piano",
            InstrumentTag::ChromaticPercussion => "chromatic_percussion",
            InstrumentTag::Organ => "organ",
            InstrumentTag::Guitar => "guitar",
            InstrumentTag::Bass => "bass",
            InstrumentTag::Strings => "strings",
            InstrumentTag::Ensemble => "ensemble",
            InstrumentTag::Brass => "brass",
            InstrumentTag::Reed => "reed",
            InstrumentTag::Pipe => "pipe",
            InstrumentTag::SynthLead => "synth_lead",
            InstrumentTag::SynthPad => "synth_pad",
            InstrumentTag::SynthEffects => "synth_effects",
            InstrumentTag::Ethnic => "ethnic",
            InstrumentTag::Percussive => "percussive",
            InstrumentTag::SoundEffects => "sound_effects",
            InstrumentTag::Drums => "drums",
        }
    }

    /// Parses a tag from a string.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == normalized)
    }
}

impl fmt::Display for InstrumentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InstrumentTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown instrument '{}'", s))
    }
}

/// One item of a part, in temporal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// A single sounding key.
    Note {
        key: u8,
        velocity: u8,
        duration: QuarterLength,
    },
    /// Keys starting together, in the order they were struck.
    Chord {
        keys: Vec<u8>,
        velocity: u8,
        duration: QuarterLength,
    },
    /// Silence between sounding elements.
    Rest { duration: QuarterLength },
}

impl Element {
    /// Pitch names of a note or chord; empty for rests.
    pub fn pitch_names(&self) -> Vec<String> {
        match self {
            Element::Note { key, .. } => vec![key_to_name(*key)],
            Element::Chord { keys, .. } => keys.iter().map(|k| key_to_name(*k)).collect(),
            Element::Rest { .. } => Vec::new(),
        }
    }

    /// Length of the element.
    pub fn duration(&self) -> QuarterLength {
        match self {
            Element::Note { duration, .. }
            | Element::Chord { duration, .. }
            | Element::Rest { duration } => *duration,
        }
    }
}

/// A single instrumental line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Track name, if the file carried one.
    pub name: Option<String>,
    /// Instrument family.
    pub instrument: InstrumentTag,
    /// Elements in temporal order.
    pub elements: Vec<Element>,
}

/// A parsed score.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Score {
    /// Parts in file order.
    pub parts: Vec<Part>,
}

impl Score {
    /// Returns the first part, optionally restricted to one instrument.
    pub fn select_part(&self, filter: Option<InstrumentTag>) -> Option<&Part> {
        match filter {
            Some(tag) => self.parts.iter().find(|p| p.instrument == tag),
            None => self.parts.first(),
        }
    }
}
