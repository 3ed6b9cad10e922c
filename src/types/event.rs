//! Musical event (token) representation.
//!
//! A [`MusicalEvent`] is the atomic unit of the sequence model's vocabulary:
//! a single note or a simultaneous cluster together with its velocity,
//! duration and delay. Events are hashed and compared field by field, so
//! durations are stored as exact reduced rationals rather than floats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between pitch names of a simultaneous cluster.
pub const PITCH_SEPARATOR: char = ':';

/// Highest MIDI velocity.
pub const MAX_VELOCITY: u8 = 127;

/// A length in quarter notes, stored as a reduced fraction.
///
/// `3/2` is a dotted quarter, `1/4` a sixteenth. Reduction makes lengths
/// read at different tick resolutions compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawQuarterLength", into = "RawQuarterLength")]
pub struct QuarterLength {
    num: u32,
    den: u32,
}

#[derive(Serialize, Deserialize)]
struct RawQuarterLength {
    num: u32,
    den: u32,
}

impl TryFrom<RawQuarterLength> for QuarterLength {
    type Error = String;

    fn try_from(raw: RawQuarterLength) -> std::result::Result<Self, Self::Error> {
        QuarterLength::new(raw.num, raw.den)
            .ok_or_else(|| format!("invalid quarter length {}/{}", raw.num, raw.den))
    }
}

impl From<QuarterLength> for RawQuarterLength {
    fn from(ql: QuarterLength) -> Self {
        Self {
            num: ql.num,
            den: ql.den,
        }
    }
}

impl QuarterLength {
    /// The zero length.
    pub const ZERO: QuarterLength = QuarterLength { num: 0, den: 1 };

    /// Creates a reduced quarter length. Returns None for a zero denominator.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if den == 0 {
            return None;
        }
        if num == 0 {
            return Some(Self::ZERO);
        }
        let g = gcd(num, den);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Creates a whole number of quarter notes.
    pub fn quarters(count: u32) -> Self {
        Self { num: count, den: 1 }
    }

    /// Converts a tick count at the given resolution into quarter notes.
    ///
    /// Returns None if `ticks_per_quarter` is zero.
    pub fn from_ticks(ticks: u32, ticks_per_quarter: u16) -> Option<Self> {
        Self::new(ticks, u32::from(ticks_per_quarter))
    }

    /// Converts to ticks at the given resolution, rounding to the nearest tick.
    pub fn to_ticks(&self, ticks_per_quarter: u16) -> u32 {
        let scaled = u64::from(self.num) * u64::from(ticks_per_quarter);
        let den = u64::from(self.den);
        ((scaled + den / 2) / den) as u32
    }

    /// Converts to ticks at the given resolution, or None if the duration
    /// falls between ticks.
    pub fn exact_ticks(&self, ticks_per_quarter: u16) -> Option<u64> {
        let scaled = u64::from(self.num) * u64::from(ticks_per_quarter);
        let den = u64::from(self.den);
        (scaled % den == 0).then_some(scaled / den)
    }

    /// Numerator of the reduced fraction.
    pub fn numerator(&self) -> u32 {
        self.num
    }

    /// Denominator of the reduced fraction.
    pub fn denominator(&self) -> u32 {
        self.den
    }

    /// Returns true for the zero length.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Floating-point value in quarter notes.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }
}

impl fmt::Display for QuarterLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A single note or simultaneous cluster.
///
/// Equality and hashing cover all four fields. Events are created during
/// extraction and never mutated afterwards, so the fields are read-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MusicalEvent {
    pitch: String,
    velocity: u8,
    duration: QuarterLength,
    delay: QuarterLength,
}

impl MusicalEvent {
    /// Creates an event with zero delay.
    ///
    /// `pitch` is either one octave-qualified name (`"C#4"`) or several
    /// joined by [`PITCH_SEPARATOR`] (`"C4:E4:G4"`). Velocity is clamped to
    /// the MIDI range.
    pub fn new(pitch: impl Into<String>, velocity: u8, duration: QuarterLength) -> Self {
        Self {
            pitch: pitch.into(),
            velocity: velocity.min(MAX_VELOCITY),
            duration,
            delay: QuarterLength::ZERO,
        }
    }

    /// Creates a cluster event from its pitch names in their original order.
    pub fn cluster<S: AsRef<str>>(names: &[S], velocity: u8, duration: QuarterLength) -> Self {
        let pitch = names
            .iter()
            .map(|n| n.as_ref())
            .collect::<Vec<_>>()
            .join(&PITCH_SEPARATOR.to_string());
        Self::new(pitch, velocity, duration)
    }

    /// The pitch string.
    pub fn pitch(&self) -> &str {
        &self.pitch
    }

    /// The MIDI velocity (0-127).
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// The sounding length.
    pub fn duration(&self) -> QuarterLength {
        self.duration
    }

    /// Offset from the previous event's onset. Currently always zero.
    pub fn delay(&self) -> QuarterLength {
        self.delay
    }

    /// Returns true if the pitch names a simultaneous cluster.
    pub fn is_cluster(&self) -> bool {
        self.pitch.contains(PITCH_SEPARATOR)
    }

    /// Iterates over the individual pitch names.
    pub fn pitch_names(&self) -> impl Iterator<Item = &str> {
        self.pitch.split(PITCH_SEPARATOR)
    }
}

impl fmt::Display for MusicalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}x{}", self.pitch, self.velocity, self.duration)
    }
}
