//! # Analysis Pipeline
//!
//! Drives every detector from the audio callback and publishes their results.
//!
//! ## Data flow
//! - interleaved input is downmixed to mono by averaging the channels
//! - mono blocks feed the YIN detector (pitch, note, and optionally chords)
//! - the same blocks feed the spectral analyzer (chords) unless chords come
//!   from the multi-pitch scan
//! - each block also drives the tempo tracker
//!
//! After `initialize` nothing on this path allocates. Published results reuse
//! their previous allocation unless a reader is still holding it.

use std::mem;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chord::{ChordCatalog, ChordMatch, ChordRecognizer};
use crate::chroma::PitchClassHistogram;
use crate::config::{AnalyzerConfig, ChordSource};
use crate::error::ConfigError;
use crate::fft::SpectralAnalyzer;
use crate::pitch::{PitchDetector, PitchReading};
use crate::publish::{AnalysisOutputs, ChordOutput, NoteOutput};
use crate::stability::StabilityGate;
use crate::tempo::{TempoReading, TempoTracker};
use crate::tuning::{NoteMapper, NoteName};

#[derive(Debug)]
pub struct Analyzer {
    config: AnalyzerConfig,
    pitch: PitchDetector,
    spectrum: SpectralAnalyzer,
    chords: ChordRecognizer,
    tempo: TempoTracker,
    notes: NoteMapper,
    note_gate: StabilityGate<NoteName>,
    /// Downmix buffer, one host block long.
    mono: Vec<f32>,
    block_size: usize,
    last_tempo: TempoReading,
    outputs: Arc<AnalysisOutputs>,
    initialized: bool,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, catalog: ChordCatalog) -> Self {
        let reference_a4 = config.note.reference_a4;
        Self {
            pitch: PitchDetector::new(config.pitch.clone()),
            spectrum: SpectralAnalyzer::new(config.spectrum.clone(), reference_a4),
            chords: ChordRecognizer::new(config.chord.clone(), catalog),
            tempo: TempoTracker::new(config.tempo.clone()),
            notes: NoteMapper::from_config(&config.note),
            note_gate: StabilityGate::new(config.note.stable_frames),
            mono: Vec::new(),
            block_size: 0,
            last_tempo: TempoReading::default(),
            outputs: Arc::new(AnalysisOutputs::new()),
            initialized: false,
            config,
        }
    }

    /// Handle for readers on other threads.
    pub fn outputs(&self) -> Arc<AnalysisOutputs> {
        Arc::clone(&self.outputs)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ChordCatalog {
        self.chords.catalog()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// (Re)configures every detector for a stream format.
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz
    /// * `block_size` - Largest host block per channel passed to [`Analyzer::process`]
    ///
    /// # Returns
    /// * `Ok(())` - Every detector is ready and the tempo reading is published
    /// * `Err(ConfigError)` - The analyzer ignores input until initialized successfully
    pub fn initialize(&mut self, sample_rate: f32, block_size: usize) -> Result<(), ConfigError> {
        self.initialized = false;
        if let Err(e) = self.config.validate() {
            warn!("analyzer configuration rejected: {e}");
            return Err(e);
        }
        self.pitch.initialize(sample_rate, block_size)?;
        if self.config.chord.source == ChordSource::Spectrum {
            self.spectrum.initialize(sample_rate, block_size)?;
        }
        self.tempo.initialize(sample_rate, block_size)?;

        self.mono = Vec::with_capacity(block_size);
        self.block_size = block_size;
        self.chords.reset();
        self.note_gate.reset();
        self.last_tempo = self.tempo.reading();
        self.outputs.tempo.publish(self.last_tempo);
        self.initialized = true;

        info!(
            sample_rate,
            block_size,
            pitch_window = self.pitch.window_len(),
            chord_source = ?self.config.chord.source,
            "analyzer initialized"
        );
        Ok(())
    }

    pub fn set_target_bpm(&mut self, bpm: f32) {
        self.tempo.set_target_bpm(bpm);
        self.publish_tempo();
    }

    /// Processes one interleaved host buffer.
    ///
    /// # Arguments
    /// * `samples` - Interleaved samples of any length
    /// * `channels` - Channel count; multi-channel input is averaged to mono
    pub fn process(&mut self, samples: &[f32], channels: usize) {
        if !self.initialized {
            return;
        }
        if channels <= 1 {
            self.process_mono(samples);
            return;
        }

        let mut mono = mem::take(&mut self.mono);
        let capacity = mono.capacity().max(1);
        let scale = 1.0 / channels as f32;
        for chunk in samples.chunks(capacity * channels) {
            mono.clear();
            mono.extend(
                chunk
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() * scale),
            );
            self.process_mono(&mono);
        }
        self.mono = mono;
    }

    /// Processes mono samples of any length.
    pub fn process_mono(&mut self, samples: &[f32]) {
        if !self.initialized || samples.is_empty() {
            return;
        }

        if let Some(reading) = self.pitch.feed(samples) {
            self.on_pitch(reading);
            if self.config.chord.source == ChordSource::MultiPitch {
                let histogram = PitchClassHistogram::from_frequencies(
                    self.pitch.candidates_for_last_frame(),
                    self.config.note.reference_a4,
                );
                let matched = self.chords.process(&histogram);
                self.on_chord(&matched);
            }
        }

        if self.config.chord.source == ChordSource::Spectrum {
            if let Some(histogram) = self.spectrum.feed(samples) {
                let matched = self.chords.process(&histogram);
                self.on_chord(&matched);
            }
        }

        for block in samples.chunks(self.block_size.max(1)) {
            self.tempo.process_block(block);
        }
        self.publish_tempo();
    }

    /// Drops buffered audio and streaks; published results stay as they are.
    pub fn reset(&mut self) {
        self.pitch.reset();
        self.spectrum.reset();
        self.chords.reset();
        self.note_gate.reset();
    }

    fn on_pitch(&mut self, reading: PitchReading) {
        self.outputs.pitch.publish(reading);

        let note = reading
            .frequency()
            .map_or(NoteName::Unknown, |f| self.notes.map(f));
        self.note_gate.observe(note);
        if self.note_gate.just_confirmed() {
            let cents = reading
                .frequency()
                .filter(|_| note.is_known())
                .and_then(|f| self.notes.cents(f));
            debug!(%note, "note confirmed");
            self.outputs.note.publish(NoteOutput { note, cents });
        }
    }

    fn on_chord(&self, matched: &ChordMatch) {
        if matched.confirmed && matched.stable_frames == self.config.chord.stable_frames.max(1) {
            self.outputs.chord.publish(ChordOutput::from(matched));
        }
    }

    fn publish_tempo(&mut self) {
        let reading = self.tempo.reading();
        if reading != self.last_tempo {
            if reading.state != self.last_tempo.state {
                debug!(state = ?reading.state, bpm = reading.bpm, "tempo state changed");
            }
            self.last_tempo = reading;
            self.outputs.tempo.publish(reading);
        }
    }
}
