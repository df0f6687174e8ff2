//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for chord recognition, and harmonic folding of a
//! spectrum into a twelve-bin pitch-class histogram.
//!
//! ## Features
//! - RustFFT plan and scratch space prepared once at initialization
//! - DC offset removal and Hann windowing
//! - Magnitudes scaled to amplitude units (a full-scale sine peaks near 1.0)
//! - Frequency gate, noise floor, and weighted harmonic folding

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::accumulator::SampleAccumulator;
use crate::chroma::PitchClassHistogram;
use crate::config::SpectrumConfig;
use crate::error::{ConfigError, check_stream_format};
use crate::tuning::pitch_class_of;
use crate::window::{Window, WindowKind, remove_dc_offset};

/// Windowed FFT analyzer with its own accumulation buffer.
pub struct SpectralAnalyzer {
    config: SpectrumConfig,
    reference_a4: f32,
    sample_rate: f32,
    fft: Option<Arc<dyn Fft<f32>>>,
    window: Window,
    accumulator: SampleAccumulator,
    frame: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("fft_size", &self.fft_size())
            .field("sample_rate", &self.sample_rate)
            .field("initialized", &self.fft.is_some())
            .finish()
    }
}

impl SpectralAnalyzer {
    pub fn new(config: SpectrumConfig, reference_a4: f32) -> Self {
        Self {
            config,
            reference_a4,
            sample_rate: 0.0,
            fft: None,
            window: Window::new(WindowKind::Hann, 0),
            accumulator: SampleAccumulator::default(),
            frame: Vec::new(),
            buffer: Vec::new(),
            scratch: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    /// Plans the transform and sizes every buffer. Host blocks may be up to
    /// `block_size` samples.
    pub fn initialize(&mut self, sample_rate: f32, block_size: usize) -> Result<(), ConfigError> {
        self.fft = None;
        if let Err(e) = check_stream_format(sample_rate, block_size)
            .and_then(|_| self.config.validate())
        {
            warn!("spectral analyzer initialization failed: {e}");
            return Err(e);
        }

        let size = self.config.fft_size();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);

        self.sample_rate = sample_rate;
        self.window = Window::new(WindowKind::Hann, size);
        self.accumulator = SampleAccumulator::new(size, block_size);
        self.frame = vec![0.0; size];
        self.buffer = vec![Complex::new(0.0, 0.0); size];
        self.scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        self.magnitudes = vec![0.0; size / 2];
        self.fft = Some(fft);

        debug!(sample_rate, fft_size = size, "spectral analyzer initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.fft.is_some()
    }

    pub fn fft_size(&self) -> usize {
        self.buffer.len()
    }

    /// Width of one spectral bin in Hz.
    pub fn bin_width(&self) -> f32 {
        if self.buffer.is_empty() {
            0.0
        } else {
            self.sample_rate / self.buffer.len() as f32
        }
    }

    /// The most recent magnitude spectrum (N/2 bins).
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Accumulates mono samples of any length.
    ///
    /// # Arguments
    /// * `samples` - Mono samples, possibly spanning several FFT frames
    ///
    /// # Returns
    /// * `Some(histogram)` - Folded histogram of the last frame completed during this call
    /// * `None` - The frame is still filling, or the analyzer is uninitialized
    pub fn feed(&mut self, samples: &[f32]) -> Option<PitchClassHistogram> {
        self.fft.as_ref()?;
        let mut latest = None;
        let mut rest = samples;
        while !rest.is_empty() {
            let taken = self.accumulator.push(rest);
            rest = &rest[taken..];
            while self.accumulator.pop_frame(&mut self.frame) {
                self.transform_current_frame();
                latest = Some(self.fold_harmonics());
            }
            if taken == 0 {
                break;
            }
        }
        latest
    }

    /// Windows `frame` and computes its magnitude spectrum.
    ///
    /// Returns an empty slice when the analyzer is uninitialized or the frame
    /// length differs from the FFT size.
    pub fn analyze(&mut self, frame: &[f32]) -> &[f32] {
        if self.fft.is_none() || frame.len() != self.frame.len() {
            return &[];
        }
        self.frame.copy_from_slice(frame);
        self.transform_current_frame();
        &self.magnitudes
    }

    /// Folds the current spectrum into a normalized pitch-class histogram.
    ///
    /// Each in-range bin above the noise floor contributes its own magnitude
    /// plus the weighted magnitudes found at its 2nd, 3rd, ... harmonics to
    /// its pitch class. Harmonic energy is credited to the fundamental's own
    /// class, not to the class of the harmonic bin (`(pc + 12·log2 h) mod 12`),
    /// so a 3rd harmonic strengthens the root instead of the fifth. A spectrum
    /// with nothing above the absolute floor yields an all-zero histogram.
    pub fn fold_harmonics(&self) -> PitchClassHistogram {
        let mut histogram = PitchClassHistogram::default();
        let bin_width = self.bin_width();
        if self.magnitudes.is_empty() || bin_width <= 0.0 {
            return histogram;
        }

        let last = self.magnitudes.len() - 1;
        let low = ((self.config.min_frequency / bin_width).ceil() as usize).max(1);
        let high = ((self.config.max_frequency / bin_width).floor() as usize).min(last);
        if low > high {
            return histogram;
        }

        let peak = self.magnitudes[low..=high].iter().copied().fold(0.0, f32::max);
        if peak < self.config.absolute_floor {
            return histogram;
        }
        let floor = self.config.absolute_floor.max(self.config.noise_floor * peak);

        for bin in low..=high {
            let magnitude = self.magnitudes[bin];
            if magnitude < floor {
                continue;
            }
            let Some(pitch_class) = pitch_class_of(bin as f32 * bin_width, self.reference_a4) else {
                continue;
            };
            let harmonics: f32 = self
                .config
                .harmonic_weights
                .iter()
                .enumerate()
                .filter_map(|(i, weight)| {
                    self.magnitudes.get(bin * (i + 2)).map(|m| weight * m)
                })
                .sum();
            histogram.add(pitch_class, magnitude + harmonics);
        }

        histogram.normalize(self.config.normalization);
        histogram
    }

    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.magnitudes.iter_mut().for_each(|m| *m = 0.0);
    }

    fn transform_current_frame(&mut self) {
        let Some(fft) = &self.fft else {
            return;
        };
        remove_dc_offset(&mut self.frame);
        self.window.apply(&mut self.frame);

        for (slot, &sample) in self.buffer.iter_mut().zip(&self.frame) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // A windowed sine of amplitude A peaks at A * sum(w) / 2.
        let scale = 2.0 / self.window.sum();
        for (magnitude, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *magnitude = c.norm() * scale;
        }
    }
}
