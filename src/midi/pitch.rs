//! Pitch spelling between MIDI key numbers and octave-qualified names.
//!
//! Names follow the `C C# D Eb E F F# G Ab A Bb B` table with octave
//! `key / 12 - 1`, so key 60 is `C4` and key 0 is `C-1`. Spelled names never
//! use `-` as a flat sign, which keeps a trailing `-1` unambiguous.

const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Spells a MIDI key as an octave-qualified pitch name.
pub fn key_to_name(key: u8) -> String {
    let octave = i32::from(key) / 12 - 1;
    format!("{}{}", PITCH_CLASS_NAMES[usize::from(key % 12)], octave)
}

/// Parses an octave-qualified pitch name into a MIDI key.
///
/// Accepts `#` for sharps and `b` or `-` for flats, any number of them. The
/// octave is the trailing integer; a `-` right before it is read as a sign
/// first (`C-1` is key 0) and as a flat only when the signed reading is out
/// of range (`E-4` is E-flat 4).
pub fn name_to_key(name: &str) -> Option<u8> {
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let digits_at = rest
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let (accidentals, digits) = rest.split_at(digits_at);
    let octave: i32 = digits.parse().ok()?;

    if let Some(unsigned) = accidentals.strip_suffix('-') {
        if let Some(key) = spell(base, unsigned, -octave) {
            return Some(key);
        }
    }
    spell(base, accidentals, octave)
}

fn spell(base: i32, accidentals: &str, octave: i32) -> Option<u8> {
    let mut shift = 0i32;
    for c in accidentals.chars() {
        match c {
            '#' => shift += 1,
            '-' | 'b' => shift -= 1,
            _ => return None,
        }
    }

    let key = (octave + 1) * 12 + base + shift;
    u8::try_from(key).ok().filter(|k| *k <= 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spells_middle_c_and_neighbours() {
        assert_eq!(key_to_name(60), "C4");
        assert_eq!(key_to_name(61), "C#4");
        assert_eq!(key_to_name(63), "Eb4");
        assert_eq!(key_to_name(70), "Bb4");
        assert_eq!(key_to_name(21), "A0");
        assert_eq!(key_to_name(127), "G9");
        assert_eq!(key_to_name(0), "C-1");
        assert_eq!(key_to_name(10), "Bb-1");
    }

    #[test]
    fn parses_accidentals() {
        assert_eq!(name_to_key("C4"), Some(60));
        assert_eq!(name_to_key("C#4"), Some(61));
        assert_eq!(name_to_key("E-4"), Some(63));
        assert_eq!(name_to_key("Eb4"), Some(63));
        assert_eq!(name_to_key("B#3"), Some(60));
        assert_eq!(name_to_key("g9"), Some(127));
        assert_eq!(name_to_key("B-4"), Some(70));
    }

    #[test]
    fn trailing_minus_one_is_the_lowest_octave() {
        assert_eq!(name_to_key("C-1"), Some(0));
        assert_eq!(name_to_key("B-1"), Some(11));
        assert_eq!(name_to_key("Eb-1"), Some(3));
        assert_eq!(name_to_key("C#-1"), Some(1));
        assert_eq!(name_to_key("Cb-2"), None);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(name_to_key(""), None);
        assert_eq!(name_to_key("H4"), None);
        assert_eq!(name_to_key("C"), None);
        assert_eq!(name_to_key("C?4"), None);
        assert_eq!(name_to_key("C4x"), None);
        assert_eq!(name_to_key("C-"), None);
        assert_eq!(name_to_key("G#9"), None);
    }

    #[test]
    fn round_trips_every_key() {
        for key in 0..=127u8 {
            assert_eq!(name_to_key(&key_to_name(key)), Some(key), "key {}", key);
        }
    }
}
