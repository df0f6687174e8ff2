// fretlab-core/src/lib.rs

//! The core logic for the fretlab guitar practice tool.
//! This crate is responsible for audio capture, pitch detection, chord
//! recognition and tempo tracking. It is completely headless
//! and contains no GUI code.
//!
//! Every detector owns its buffers, sized once at `initialize`, and runs
//! synchronously on the audio thread. Results leave that thread through the
//! lock-free cells in [`publish`].

pub mod accumulator;
pub mod analyzer;
pub mod audio;
pub mod chord;
pub mod chroma;
pub mod config;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod practice;
pub mod publish;
pub mod shapes;
pub mod stability;
pub mod tempo;
pub mod tuning;
pub mod window;

pub use analyzer::Analyzer;
pub use chord::{ChordCatalog, ChordMatch, ChordRecognizer, ChordTemplate, UNKNOWN_CHORD};
pub use chroma::PitchClassHistogram;
pub use config::AnalyzerConfig;
pub use error::ConfigError;
pub use pitch::{PitchDetector, PitchEstimate, PitchReading};
pub use publish::{AnalysisOutputs, ChordOutput, NoteOutput, Published};
pub use tempo::{Adherence, TempoReading, TempoState, TempoTracker};
pub use tuning::{NoteMapper, NoteName};
