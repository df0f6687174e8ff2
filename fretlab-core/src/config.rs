//! # Analysis Configuration
//!
//! Every threshold, window size and smoothing constant used by the detectors
//! lives here. The structs deserialize from JSON with `#[serde(default)]`, so a
//! config file only needs to mention the values it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, check_positive, check_unit};
use crate::window::WindowKind;

/// Top-level configuration for the whole analysis pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub pitch: PitchConfig,
    pub spectrum: SpectrumConfig,
    pub chord: ChordConfig,
    pub tempo: TempoConfig,
    pub note: NoteConfig,
}

impl AnalyzerConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pitch.validate()?;
        self.spectrum.validate()?;
        self.chord.validate()?;
        self.tempo.validate()?;
        self.note.validate()
    }
}

/// YIN pitch detector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Smallest analysis window in samples. 8192 is enough to resolve ~80 Hz.
    pub min_window: usize,
    /// Absolute CMND threshold for the first-dip rule.
    pub tolerance: f32,
    /// Floor for the average rectified magnitude of a frame.
    pub input_magnitude_threshold: f32,
    /// Fraction of the running average magnitude a frame must reach.
    pub adaptive_magnitude_ratio: f32,
    /// Exponential smoothing factor for the running average magnitude.
    pub magnitude_smoothing: f32,
    /// Lowest frequency reported, in Hz.
    pub min_frequency: f32,
    /// Highest frequency reported, in Hz.
    pub max_frequency: f32,
    /// Upper bound on the candidates returned by the multi-pitch scan.
    pub max_candidates: usize,
    /// CMND threshold for the multi-pitch scan. Looser than `tolerance`
    /// because simultaneous notes fill in each other's dips.
    pub multi_pitch_tolerance: f32,
    /// Taper applied before the difference function.
    pub window: WindowKind,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_window: 8192,
            tolerance: 0.15,
            input_magnitude_threshold: 0.01,
            adaptive_magnitude_ratio: 0.25,
            magnitude_smoothing: 0.1,
            min_frequency: 70.0,
            max_frequency: 1400.0,
            max_candidates: 6,
            multi_pitch_tolerance: 0.6,
            window: WindowKind::Hamming,
        }
    }
}

impl PitchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_window < 64 {
            return Err(ConfigError::InvalidParameter {
                name: "pitch.min_window",
                value: self.min_window as f32,
                reason: "must be at least 64 samples",
            });
        }
        check_unit("pitch.tolerance", self.tolerance)?;
        check_unit("pitch.multi_pitch_tolerance", self.multi_pitch_tolerance)?;
        check_positive("pitch.input_magnitude_threshold", self.input_magnitude_threshold)?;
        check_unit("pitch.magnitude_smoothing", self.magnitude_smoothing)?;
        if !(self.adaptive_magnitude_ratio >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "pitch.adaptive_magnitude_ratio",
                value: self.adaptive_magnitude_ratio,
                reason: "must not be negative",
            });
        }
        check_positive("pitch.min_frequency", self.min_frequency)?;
        if !(self.max_frequency > self.min_frequency) {
            return Err(ConfigError::InvalidParameter {
                name: "pitch.max_frequency",
                value: self.max_frequency,
                reason: "must exceed pitch.min_frequency",
            });
        }
        Ok(())
    }
}

/// How a pitch-class histogram is scaled into [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Divide by the largest bin.
    #[default]
    Max,
    /// Divide by the sum of all bins.
    Sum,
}

/// FFT spectral analyzer and harmonic folding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// log2 of the FFT size.
    pub fft_order: u32,
    /// Bins below this frequency are ignored when folding.
    pub min_frequency: f32,
    /// Bins above this frequency are ignored when folding.
    pub max_frequency: f32,
    /// Bins quieter than this fraction of the loudest in-range bin are ignored.
    pub noise_floor: f32,
    /// Absolute magnitude floor (in amplitude units) below which a frame is silent.
    pub absolute_floor: f32,
    /// Weights for harmonics 2, 3, 4, ... folded back onto the fundamental.
    pub harmonic_weights: Vec<f32>,
    pub normalization: Normalization,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_order: 13,
            min_frequency: 80.0,
            max_frequency: 1318.51,
            noise_floor: 0.1,
            absolute_floor: 0.005,
            harmonic_weights: vec![1.0, 0.5, 0.25, 0.125],
            normalization: Normalization::Max,
        }
    }
}

impl SpectrumConfig {
    pub fn fft_size(&self) -> usize {
        1usize << self.fft_order
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(6..=16).contains(&self.fft_order) {
            return Err(ConfigError::InvalidFftOrder(self.fft_order));
        }
        check_positive("spectrum.min_frequency", self.min_frequency)?;
        if !(self.max_frequency > self.min_frequency) {
            return Err(ConfigError::InvalidParameter {
                name: "spectrum.max_frequency",
                value: self.max_frequency,
                reason: "must exceed spectrum.min_frequency",
            });
        }
        check_unit("spectrum.noise_floor", self.noise_floor)?;
        check_positive("spectrum.absolute_floor", self.absolute_floor)?;
        if let Some(&w) = self.harmonic_weights.iter().find(|w| !(**w >= 0.0)) {
            return Err(ConfigError::InvalidParameter {
                name: "spectrum.harmonic_weights",
                value: w,
                reason: "weights must not be negative",
            });
        }
        Ok(())
    }
}

/// Where the chord recognizer takes its pitch-class histogram from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordSource {
    /// Harmonic-folded FFT spectrum.
    #[default]
    Spectrum,
    /// Candidate frequencies from the YIN multi-pitch scan.
    MultiPitch,
}

/// What the chord detection threshold is a fraction of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdReference {
    #[default]
    Peak,
    Average,
}

/// Chord template matching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChordConfig {
    /// A bin counts as present above this fraction of the reference level.
    pub detection_threshold: f32,
    pub threshold_reference: ThresholdReference,
    /// How many template notes may be absent for the template to qualify.
    /// Zero demands an exact match.
    pub max_missing_notes: usize,
    /// Consecutive identical best matches needed before a chord is confirmed.
    pub stable_frames: u32,
    pub source: ChordSource,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            threshold_reference: ThresholdReference::Peak,
            max_missing_notes: 1,
            stable_frames: 12,
            source: ChordSource::Spectrum,
        }
    }
}

impl ChordConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("chord.detection_threshold", self.detection_threshold)?;
        if self.stable_frames == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "chord.stable_frames",
                value: 0.0,
                reason: "must be at least one frame",
            });
        }
        Ok(())
    }
}

/// How the inter-peak interval is estimated from the peak history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalEstimator {
    /// Arithmetic mean of consecutive differences.
    #[default]
    Mean,
    /// Least-squares slope of peak time against peak index.
    Regression,
}

/// Onset-based tempo tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    /// Tempo the player is aiming for, clamped to 40..=240 BPM.
    pub target_bpm: f32,
    /// Minimum time between accepted peaks, in milliseconds.
    pub debounce_ms: f32,
    /// Number of peak timestamps kept.
    pub history_len: usize,
    /// Smoothing factor of the running energy average.
    pub energy_smoothing: f32,
    /// Per-frame decay of the dynamic threshold.
    pub threshold_decay: f32,
    /// Running average is scaled by this to form the threshold floor.
    pub threshold_scale: f32,
    /// BPM smoothing factor for small tempo changes.
    pub gentle_smoothing: f32,
    /// BPM smoothing factor once the jump exceeds `jump_bpm`.
    pub aggressive_smoothing: f32,
    pub jump_bpm: f32,
    /// In-tempo band as a fraction of the target tempo.
    pub in_tempo_tolerance: f32,
    /// Mean absolute sample value below which a block is treated as silence.
    pub signal_threshold: f32,
    /// Smoothing factor of the block envelope fed to peak picking.
    pub envelope_smoothing: f32,
    /// Silence longer than this returns the tracker to idle, in milliseconds.
    pub idle_timeout_ms: f32,
    pub interval_estimator: IntervalEstimator,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            target_bpm: 120.0,
            debounce_ms: 300.0,
            history_len: 6,
            energy_smoothing: 0.1,
            threshold_decay: 0.98,
            threshold_scale: 0.7,
            gentle_smoothing: 0.1,
            aggressive_smoothing: 0.3,
            jump_bpm: 20.0,
            in_tempo_tolerance: 0.05,
            signal_threshold: 0.07,
            envelope_smoothing: 0.1,
            idle_timeout_ms: 2000.0,
            interval_estimator: IntervalEstimator::Mean,
        }
    }
}

impl TempoConfig {
    pub const MIN_BPM: f32 = 40.0;
    pub const MAX_BPM: f32 = 240.0;

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("tempo.target_bpm", self.target_bpm)?;
        check_positive("tempo.debounce_ms", self.debounce_ms)?;
        if self.history_len < 2 {
            return Err(ConfigError::InvalidParameter {
                name: "tempo.history_len",
                value: self.history_len as f32,
                reason: "at least two peaks are needed for an interval",
            });
        }
        check_unit("tempo.energy_smoothing", self.energy_smoothing)?;
        check_unit("tempo.threshold_decay", self.threshold_decay)?;
        check_positive("tempo.threshold_scale", self.threshold_scale)?;
        check_unit("tempo.gentle_smoothing", self.gentle_smoothing)?;
        check_unit("tempo.aggressive_smoothing", self.aggressive_smoothing)?;
        check_positive("tempo.jump_bpm", self.jump_bpm)?;
        check_unit("tempo.in_tempo_tolerance", self.in_tempo_tolerance)?;
        check_positive("tempo.signal_threshold", self.signal_threshold)?;
        check_unit("tempo.envelope_smoothing", self.envelope_smoothing)?;
        check_positive("tempo.idle_timeout_ms", self.idle_timeout_ms)
    }
}

/// Frequency-to-note mapping settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteConfig {
    /// Concert pitch of A4 in Hz.
    pub reference_a4: f32,
    /// Absolute deviation allowed from the equal-tempered frequency, in Hz.
    pub tolerance_hz: f32,
    /// Consecutive identical notes needed before a note is reported.
    pub stable_frames: u32,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            reference_a4: 440.0,
            tolerance_hz: 5.0,
            stable_frames: 2,
        }
    }
}

impl NoteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("note.reference_a4", self.reference_a4)?;
        check_positive("note.tolerance_hz", self.tolerance_hz)?;
        if self.stable_frames == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "note.stable_frames",
                value: 0.0,
                reason: "must be at least one frame",
            });
        }
        Ok(())
    }
}
