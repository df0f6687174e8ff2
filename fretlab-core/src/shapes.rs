//! Open-position fingerings for the chords shown in the chord library.
//!
//! Strings are numbered 1 (high E) to 6 (low E). Strings neither fretted nor
//! muted ring open.

#[derive(Debug, PartialEq, Eq)]
pub struct ChordShape {
    /// Matches the chord names of the standard catalog.
    pub name: &'static str,
    /// `(string, fret)` pairs.
    pub fretted: &'static [(u8, u8)],
    pub muted: &'static [u8],
}

impl ChordShape {
    pub fn is_muted(&self, string: u8) -> bool {
        self.muted.contains(&string)
    }

    /// Fret held on `string`: `Some(0)` when open, `None` when muted.
    pub fn fret_on(&self, string: u8) -> Option<u8> {
        if self.is_muted(string) {
            return None;
        }
        Some(
            self.fretted
                .iter()
                .find(|(s, _)| *s == string)
                .map_or(0, |(_, fret)| *fret),
        )
    }
}

pub static CHORD_SHAPES: [ChordShape; 7] = [
    ChordShape {
        name: "C Major",
        fretted: &[(5, 3), (4, 2), (2, 1)],
        muted: &[6],
    },
    ChordShape {
        name: "G Major",
        fretted: &[(6, 3), (5, 2), (1, 3)],
        muted: &[],
    },
    ChordShape {
        name: "D Major",
        fretted: &[(3, 2), (2, 3), (1, 2)],
        muted: &[6, 5],
    },
    ChordShape {
        name: "A Major",
        fretted: &[(4, 2), (3, 2), (2, 2)],
        muted: &[6],
    },
    ChordShape {
        name: "E Major",
        fretted: &[(5, 2), (4, 2), (3, 1)],
        muted: &[],
    },
    ChordShape {
        name: "A Minor",
        fretted: &[(4, 2), (3, 2), (2, 1)],
        muted: &[6],
    },
    ChordShape {
        name: "E Minor",
        fretted: &[(5, 2), (4, 2)],
        muted: &[],
    },
];

pub fn shape_for(chord_name: &str) -> Option<&'static ChordShape> {
    CHORD_SHAPES
        .iter()
        .find(|shape| shape.name.eq_ignore_ascii_case(chord_name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordCatalog;
    use crate::tuning::{NoteName, frequency_of_midi, pitch_class_of};

    /// MIDI numbers of the open strings, indexed by string number - 1.
    const OPEN_STRINGS: [i32; 6] = [64, 59, 55, 50, 45, 40];

    #[test]
    fn c_major_fingering() {
        let shape = shape_for("c major").unwrap();
        assert_eq!(shape.fret_on(5), Some(3));
        assert_eq!(shape.fret_on(3), Some(0));
        assert_eq!(shape.fret_on(6), None);
        assert!(shape_for("B7").is_none());
    }

    #[test]
    fn every_sounding_string_belongs_to_the_chord() {
        let catalog = ChordCatalog::standard();
        for shape in &CHORD_SHAPES {
            let template = catalog.find(shape.name).unwrap();
            for string in 1..=6u8 {
                let Some(fret) = shape.fret_on(string) else {
                    continue;
                };
                let midi = OPEN_STRINGS[string as usize - 1] + fret as i32;
                let pc = pitch_class_of(frequency_of_midi(midi, 440.0), 440.0).unwrap();
                assert!(
                    template.pitch_classes.contains(&(pc as u8)),
                    "{} string {string} sounds {}",
                    shape.name,
                    NoteName::from_midi(midi)
                );
            }
        }
    }
}
