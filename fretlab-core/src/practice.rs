//! Scale practice: the player plays the notes of a scale in order and the
//! exercise advances each time the detected note matches the required one.
//!
//! String numbers follow guitar convention (1 = high E, 6 = low E) and fret 0
//! is the open string.

use crate::tuning::NoteName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleStep {
    pub note: NoteName,
    pub string: u8,
    pub fret: u8,
}

const fn step(pitch_class: u8, octave: i32, string: u8, fret: u8) -> ScaleStep {
    ScaleStep {
        note: NoteName::new(pitch_class, octave),
        string,
        fret,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct PracticeScale {
    pub name: &'static str,
    pub steps: &'static [ScaleStep],
}

/// Built-in scales in first position.
pub static PRACTICE_SCALES: [PracticeScale; 5] = [
    PracticeScale {
        name: "C Major",
        steps: &[
            step(0, 3, 5, 3),
            step(2, 3, 4, 0),
            step(4, 3, 4, 2),
            step(5, 3, 4, 3),
            step(7, 3, 3, 0),
            step(9, 3, 3, 2),
            step(11, 3, 2, 0),
        ],
    },
    PracticeScale {
        name: "A Minor",
        steps: &[
            step(9, 2, 5, 0),
            step(11, 2, 5, 2),
            step(0, 3, 5, 3),
            step(2, 3, 4, 0),
            step(4, 3, 4, 2),
            step(5, 3, 4, 3),
            step(7, 3, 3, 0),
        ],
    },
    PracticeScale {
        name: "C Major Pentatonic",
        steps: &[
            step(0, 3, 5, 3),
            step(2, 3, 4, 0),
            step(4, 3, 4, 2),
            step(7, 3, 3, 0),
            step(9, 3, 3, 2),
        ],
    },
    PracticeScale {
        name: "A Minor Pentatonic",
        steps: &[
            step(9, 2, 5, 0),
            step(0, 3, 5, 3),
            step(2, 3, 4, 0),
            step(4, 3, 4, 2),
            step(7, 3, 3, 0),
        ],
    },
    PracticeScale {
        name: "E Blues",
        steps: &[
            step(4, 2, 6, 0),
            step(7, 2, 6, 3),
            step(9, 2, 5, 0),
            step(10, 2, 5, 1),
            step(11, 2, 5, 2),
            step(2, 3, 4, 0),
        ],
    },
];

/// Case-insensitive lookup in [`PRACTICE_SCALES`].
pub fn scale_by_name(name: &str) -> Option<&'static PracticeScale> {
    PRACTICE_SCALES
        .iter()
        .find(|scale| scale.name.eq_ignore_ascii_case(name.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseEvent {
    /// The required note was played; `next` is the new requirement.
    Advanced { next: ScaleStep },
    /// The last note of the scale was played.
    Completed,
}

#[derive(Debug, Clone)]
pub struct ScaleExercise {
    scale: &'static PracticeScale,
    position: usize,
}

impl ScaleExercise {
    pub fn new(scale: &'static PracticeScale) -> Self {
        Self { scale, position: 0 }
    }

    pub fn scale(&self) -> &'static PracticeScale {
        self.scale
    }

    /// Index of the required step, equal to the scale length once complete.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The step the player should play next, `None` once complete.
    pub fn required(&self) -> Option<&'static ScaleStep> {
        self.scale.steps.get(self.position)
    }

    pub fn is_complete(&self) -> bool {
        self.position >= self.scale.steps.len()
    }

    /// Checks a confirmed note against the requirement. Wrong notes and
    /// `Unknown` are ignored.
    pub fn observe(&mut self, note: NoteName) -> Option<ExerciseEvent> {
        let required = self.required()?;
        if note != required.note {
            return None;
        }
        self.position += 1;
        Some(match self.required() {
            Some(next) => ExerciseEvent::Advanced { next: *next },
            None => ExerciseEvent::Completed,
        })
    }

    pub fn restart(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_notes_match_their_names() {
        let names: Vec<String> = scale_by_name("e blues")
            .unwrap()
            .steps
            .iter()
            .map(|s| s.note.to_string())
            .collect();
        assert_eq!(names, ["E2", "G2", "A2", "A#2", "B2", "D3"]);

        let c_major = scale_by_name("C Major").unwrap();
        assert_eq!(c_major.steps.len(), 7);
        assert_eq!(c_major.steps[0], step(0, 3, 5, 3));
        assert!(scale_by_name("Lydian").is_none());
    }

    #[test]
    fn every_hint_is_on_a_real_string() {
        for scale in &PRACTICE_SCALES {
            for step in scale.steps {
                assert!((1..=6).contains(&step.string), "{}", scale.name);
                assert!(step.fret <= 12);
            }
        }
    }

    #[test]
    fn exercise_walks_through_the_scale() {
        let scale = scale_by_name("A Minor Pentatonic").unwrap();
        let mut exercise = ScaleExercise::new(scale);
        assert_eq!(exercise.required().unwrap().note, NoteName::new(9, 2));

        // Wrong octave and unknown notes do not count.
        assert_eq!(exercise.observe(NoteName::new(9, 3)), None);
        assert_eq!(exercise.observe(NoteName::Unknown), None);

        assert_eq!(
            exercise.observe(NoteName::new(9, 2)),
            Some(ExerciseEvent::Advanced {
                next: step(0, 3, 5, 3)
            })
        );
        for note in [NoteName::new(0, 3), NoteName::new(2, 3), NoteName::new(4, 3)] {
            assert!(matches!(
                exercise.observe(note),
                Some(ExerciseEvent::Advanced { .. })
            ));
        }
        assert_eq!(
            exercise.observe(NoteName::new(7, 3)),
            Some(ExerciseEvent::Completed)
        );
        assert!(exercise.is_complete());
        assert_eq!(exercise.observe(NoteName::new(7, 3)), None);

        exercise.restart();
        assert_eq!(exercise.position(), 0);
        assert!(!exercise.is_complete());
    }
}
