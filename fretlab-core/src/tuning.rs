//! # Musical Tuning Module
//!
//! Maps frequencies to twelve-tone equal-temperament note names.
//!
//! ## Features
//! - Frequency to MIDI note rounding against a configurable A4
//! - Note name + octave with an absolute tolerance band
//! - Cent deviation from the nearest note
//! - Pitch-class lookup shared by the chroma and chord code

use std::fmt;

use crate::config::NoteConfig;

/// Pitch-class names indexed 0 = C ... 11 = B.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// MIDI note number of A4.
const MIDI_A4: i32 = 69;

/// A note name with its octave, or `Unknown` when the frequency falls outside
/// the tolerance band of every equal-tempered note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NoteName {
    Known {
        pitch_class: u8,
        octave: i32,
    },
    #[default]
    Unknown,
}

impl NoteName {
    /// Builds a note from a pitch class (wrapped into 0..12) and an octave.
    pub const fn new(pitch_class: u8, octave: i32) -> Self {
        NoteName::Known {
            pitch_class: pitch_class % 12,
            octave,
        }
    }

    /// The note for a MIDI number, `Unknown` for negative numbers.
    pub fn from_midi(midi: i32) -> Self {
        if midi < 0 {
            return NoteName::Unknown;
        }
        NoteName::new(midi.rem_euclid(12) as u8, midi.div_euclid(12) - 1)
    }

    /// Pitch-class name such as `"A#"`, or `None` for `Unknown`.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            NoteName::Known { pitch_class, .. } => Some(PITCH_CLASS_NAMES[*pitch_class as usize]),
            NoteName::Unknown => None,
        }
    }

    pub fn pitch_class(&self) -> Option<u8> {
        match self {
            NoteName::Known { pitch_class, .. } => Some(*pitch_class),
            NoteName::Unknown => None,
        }
    }

    pub fn octave(&self) -> Option<i32> {
        match self {
            NoteName::Known { octave, .. } => Some(*octave),
            NoteName::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, NoteName::Known { .. })
    }

    /// MIDI note number for a known note.
    pub fn midi(&self) -> Option<i32> {
        match self {
            NoteName::Known {
                pitch_class,
                octave,
            } => Some((octave + 1) * 12 + *pitch_class as i32),
            NoteName::Unknown => None,
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteName::Known {
                pitch_class,
                octave,
            } => write!(f, "{}{}", PITCH_CLASS_NAMES[*pitch_class as usize], octave),
            NoteName::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Nearest MIDI note for `freq`, or `None` for non-positive or non-finite input.
pub fn midi_from_frequency(freq: f32, reference_a4: f32) -> Option<i32> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let semitones = (12.0 * (freq / reference_a4).log2()).round();
    semitones.is_finite().then(|| semitones as i32 + MIDI_A4)
}

/// Exact equal-tempered frequency of a MIDI note.
pub fn frequency_of_midi(midi: i32, reference_a4: f32) -> f32 {
    reference_a4 * 2.0_f32.powf((midi - MIDI_A4) as f32 / 12.0)
}

/// Pitch class (0 = C) of the note nearest to `freq`.
pub fn pitch_class_of(freq: f32, reference_a4: f32) -> Option<usize> {
    midi_from_frequency(freq, reference_a4).map(|midi| midi.rem_euclid(12) as usize)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}

/// Frequency to note-name mapper with an absolute tolerance in Hz.
///
/// The tolerance does not scale with pitch, so it is effectively stricter for
/// high notes than for low ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMapper {
    reference_a4: f32,
    tolerance_hz: f32,
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self::from_config(&NoteConfig::default())
    }
}

impl NoteMapper {
    pub fn new(reference_a4: f32, tolerance_hz: f32) -> Self {
        Self {
            reference_a4,
            tolerance_hz,
        }
    }

    pub fn from_config(config: &NoteConfig) -> Self {
        Self::new(config.reference_a4, config.tolerance_hz)
    }

    pub fn tolerance_hz(&self) -> f32 {
        self.tolerance_hz
    }

    /// Maps a frequency to the nearest equal-tempered note.
    ///
    /// # Arguments
    /// * `freq` - Input frequency in Hz
    ///
    /// # Returns
    /// * `NoteName::Known` - Within `tolerance_hz` of the nearest note
    /// * `NoteName::Unknown` - Further off, or not a valid frequency
    pub fn map(&self, freq: f32) -> NoteName {
        self.nearest(freq)
            .filter(|(_, target)| (freq - target).abs() <= self.tolerance_hz)
            .map_or(NoteName::Unknown, |(note, _)| note)
    }

    /// The nearest note and its exact frequency, ignoring the tolerance.
    pub fn nearest(&self, freq: f32) -> Option<(NoteName, f32)> {
        let midi = midi_from_frequency(freq, self.reference_a4)?;
        let note = NoteName::from_midi(midi);
        note.is_known()
            .then(|| (note, frequency_of_midi(midi, self.reference_a4)))
    }

    /// Cent deviation of `freq` from its nearest note.
    pub fn cents(&self, freq: f32) -> Option<f32> {
        self.nearest(freq)
            .map(|(_, target)| calculate_cents_deviation(freq, target))
    }
}
