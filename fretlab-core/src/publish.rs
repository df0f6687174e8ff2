//! Lock-free hand-off of the latest results from the audio thread.
//!
//! Each output lives in its own single-slot [`Published`] cell. The audio
//! thread replaces the value, readers take an immutable snapshot and never
//! see a half-written result. Readers compare [`Published::sequence`] to
//! detect updates without cloning.
//!
//! The value replaced by a publication is kept as a spare and overwritten in
//! place by the next one, so once readers have dropped their snapshots the
//! audio thread neither allocates nor frees.

use arc_swap::{ArcSwap, ArcSwapOption};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::chord::{ChordMatch, UNKNOWN_CHORD};
use crate::pitch::PitchReading;
use crate::tempo::TempoReading;
use crate::tuning::NoteName;

pub struct Published<T> {
    value: ArcSwap<T>,
    /// Allocation of the previously published value, reused when unshared.
    spare: ArcSwapOption<T>,
    sequence: AtomicU64,
}

impl<T> Published<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: ArcSwap::from_pointee(initial),
            spare: ArcSwapOption::empty(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replaces the current value and bumps the sequence number.
    ///
    /// Writes into the spare allocation when no reader still holds it and
    /// allocates a fresh `Arc` otherwise. Meant for a single writer.
    pub fn publish(&self, value: T) {
        let next = match self.spare.swap(None) {
            Some(mut recycled) => match Arc::get_mut(&mut recycled) {
                Some(slot) => {
                    *slot = value;
                    recycled
                }
                None => Arc::new(value),
            },
            None => Arc::new(value),
        };
        let previous = self.value.swap(next);
        self.sequence.fetch_add(1, Ordering::Release);
        self.spare.store(Some(previous));
    }

    pub fn snapshot(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Number of values published so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Published<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Published")
            .field("value", &**self.value.load())
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Stability-gated note with its cent offset from the exact pitch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoteOutput {
    pub note: NoteName,
    pub cents: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChordOutput {
    pub name: Option<Arc<str>>,
    /// In [0, 1].
    pub confidence: f32,
}

impl ChordOutput {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_CHORD)
    }
}

impl From<&ChordMatch> for ChordOutput {
    fn from(m: &ChordMatch) -> Self {
        Self {
            name: m.name.clone(),
            confidence: m.confidence,
        }
    }
}

impl fmt::Display for ChordOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name {
            Some(ref name) => write!(f, "{name} ({:.0}%)", self.confidence * 100.0),
            None => f.write_str(UNKNOWN_CHORD),
        }
    }
}

/// Everything the presentation layer reads, shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct AnalysisOutputs {
    pub pitch: Published<PitchReading>,
    pub note: Published<NoteOutput>,
    /// Only confirmed chords are published here.
    pub chord: Published<ChordOutput>,
    pub tempo: Published<TempoReading>,
}

impl AnalysisOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all sequence numbers; changes whenever anything is published.
    pub fn generation(&self) -> u64 {
        self.pitch.sequence()
            + self.note.sequence()
            + self.chord.sequence()
            + self.tempo.sequence()
    }
}
