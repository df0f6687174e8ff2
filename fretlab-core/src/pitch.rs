//! # Pitch Detection Module
//!
//! Streaming YIN fundamental-frequency estimation for guitar input.
//!
//! ## Features
//! - Accumulates arbitrarily sized host blocks into one analysis window
//! - Adaptive magnitude gate to reject silence and background noise
//! - Hamming taper before the difference function
//! - First-dip absolute threshold with parabolic refinement
//! - Multi-pitch estimation for simultaneous notes by iterative period
//!   cancellation
//!
//! All buffers are sized in [`PitchDetector::initialize`]; feeding and
//! analyzing never allocate.

use tracing::{debug, warn};

use crate::accumulator::SampleAccumulator;
use crate::config::PitchConfig;
use crate::error::{ConfigError, check_stream_format};
use crate::window::Window;

/// Guards the CMND division when the running sum is zero.
const CMND_EPSILON: f32 = 1e-6;

/// Parabolic refinement is skipped when the curvature is smaller than this.
const DEGENERATE_CURVATURE: f32 = 1e-9;

/// The multi-pitch scan stops once the cancelled residual keeps less than this
/// fraction of the frame energy.
const RESIDUAL_ENERGY_FLOOR: f32 = 0.02;

/// Passes re-estimating every period with the others cancelled.
const REFINEMENT_PASSES: usize = 2;

/// A detected fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz.
    pub frequency: f32,
    /// `1 - d'(τ)` at the chosen lag; closer to one means a cleaner period.
    pub clarity: f32,
}

/// Outcome of analyzing one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum PitchReading {
    /// Silence, noise, or no lag crossed the threshold.
    #[default]
    NoPitch,
    Voiced(PitchEstimate),
}

impl PitchReading {
    pub fn frequency(&self) -> Option<f32> {
        match self {
            PitchReading::Voiced(estimate) => Some(estimate.frequency),
            PitchReading::NoPitch => None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        matches!(self, PitchReading::Voiced(_))
    }
}

/// YIN pitch detector owning its accumulation window and scratch buffers.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    config: PitchConfig,
    sample_rate: f32,
    accumulator: SampleAccumulator,
    window: Window,
    /// The frame most recently taken from the accumulator, un-windowed.
    frame: Vec<f32>,
    /// Windowed copy of `frame`.
    scratch: Vec<f32>,
    /// Difference function, normalized in place to the CMND.
    yin: Vec<f32>,
    /// Windowed frame with the periods found so far comb-filtered out.
    residual: Vec<f32>,
    /// Integer periods found by the multi-pitch scan, with their refined lags.
    periods: Vec<(usize, f32)>,
    candidates: Vec<f32>,
    magnitude_average: f32,
    last_reading: PitchReading,
    initialized: bool,
}

impl PitchDetector {
    pub fn new(config: PitchConfig) -> Self {
        Self {
            config,
            sample_rate: 0.0,
            accumulator: SampleAccumulator::default(),
            window: Window::new(Default::default(), 0),
            frame: Vec::new(),
            scratch: Vec::new(),
            yin: Vec::new(),
            residual: Vec::new(),
            periods: Vec::new(),
            candidates: Vec::new(),
            magnitude_average: 0.0,
            last_reading: PitchReading::NoPitch,
            initialized: false,
        }
    }

    /// Allocates buffers for `sample_rate` and host blocks of up to `min_buffer_size`.
    ///
    /// The analysis window is the larger of the configured minimum window and
    /// the host block.
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz
    /// * `min_buffer_size` - Largest host block that will be fed at once
    ///
    /// # Returns
    /// * `Ok(())` - Buffers are sized and the detector accepts input
    /// * `Err(ConfigError)` - Bad stream format or config; the detector stays uninitialized
    pub fn initialize(&mut self, sample_rate: f32, min_buffer_size: usize) -> Result<(), ConfigError> {
        self.initialized = false;
        if let Err(e) = check_stream_format(sample_rate, min_buffer_size)
            .and_then(|_| self.config.validate())
        {
            warn!("pitch detector initialization failed: {e}");
            return Err(e);
        }

        let window_len = self.config.min_window.max(min_buffer_size);
        let half = window_len / 2;

        self.sample_rate = sample_rate;
        self.accumulator = SampleAccumulator::new(window_len, min_buffer_size);
        self.window = Window::new(self.config.window, window_len);
        self.frame = vec![0.0; window_len];
        self.scratch = vec![0.0; window_len];
        self.yin = vec![0.0; half];
        self.residual = vec![0.0; window_len];
        self.periods = Vec::with_capacity(self.config.max_candidates);
        self.candidates = Vec::with_capacity(self.config.max_candidates);
        self.magnitude_average = 0.0;
        self.last_reading = PitchReading::NoPitch;
        self.initialized = true;

        debug!(sample_rate, window_len, "pitch detector initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &PitchConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Samples per analysis frame.
    pub fn window_len(&self) -> usize {
        self.frame.len()
    }

    /// Reading produced by the most recent analyzed frame.
    pub fn last_reading(&self) -> PitchReading {
        self.last_reading
    }

    /// Feeds mono samples of any length.
    ///
    /// # Arguments
    /// * `samples` - Mono samples, possibly spanning several frames
    ///
    /// # Returns
    /// * `Some(reading)` - Reading of the last frame completed during this call
    /// * `None` - The window is still filling, or the detector is uninitialized
    pub fn feed(&mut self, samples: &[f32]) -> Option<PitchReading> {
        if !self.initialized {
            return None;
        }
        let mut latest = None;
        let mut rest = samples;
        while !rest.is_empty() {
            let taken = self.accumulator.push(rest);
            rest = &rest[taken..];
            while self.accumulator.pop_frame(&mut self.frame) {
                latest = Some(self.analyze_current_frame());
            }
            if taken == 0 {
                break;
            }
        }
        latest
    }

    /// Analyzes a complete frame directly, bypassing the accumulator.
    ///
    /// Frames of the wrong length yield [`PitchReading::NoPitch`].
    pub fn analyze_frame(&mut self, frame: &[f32]) -> PitchReading {
        if !self.initialized || frame.len() != self.frame.len() {
            return PitchReading::NoPitch;
        }
        self.frame.copy_from_slice(frame);
        self.analyze_current_frame()
    }

    /// Estimates every simultaneous fundamental in the most recently analyzed frame.
    ///
    /// Each round picks the deepest in-range CMND dip of the residual, then
    /// comb-filters that period out (`r[n] - r[n + τ]`) and searches again.
    /// After every new period the earlier ones are re-estimated with all the
    /// others cancelled, which removes the bias neighbouring notes put on a
    /// lone dip. The scan stops when the residual energy is spent, no dip is
    /// below `multi_pitch_tolerance`, or `max_candidates` is reached.
    ///
    /// # Returns
    /// * Candidate frequencies in Hz, strongest first. A note whose period is a
    ///   multiple of another candidate's can be absorbed into it.
    pub fn candidates_for_last_frame(&mut self) -> &[f32] {
        self.candidates.clear();
        self.periods.clear();
        if !self.initialized || !self.passes_magnitude_gate(frame_magnitude(&self.frame)) {
            return &self.candidates;
        }
        let (tau_min, tau_max) = self.lag_bounds();
        if tau_min >= tau_max {
            return &self.candidates;
        }

        self.scratch.copy_from_slice(&self.frame);
        self.window.apply(&mut self.scratch);
        let frame_energy = mean_square(&self.scratch);
        if frame_energy <= 0.0 {
            return &self.candidates;
        }

        while self.periods.len() < self.config.max_candidates {
            let len = cancel_periods(&self.scratch, &self.periods, None, &mut self.residual);
            // Each comb stage doubles the average energy of what it keeps.
            let gain = 2f32.powi(self.periods.len() as i32);
            if mean_square(&self.residual[..len]) < RESIDUAL_ENERGY_FLOOR * frame_energy * gain {
                break;
            }
            let Some(dip) = deepest_dip(&self.residual[..len], &mut self.yin, tau_min, tau_max)
            else {
                break;
            };
            if dip.depth > self.config.multi_pitch_tolerance {
                break;
            }
            self.periods.push((dip.tau, dip.lag));

            for _ in 0..REFINEMENT_PASSES {
                for index in 0..self.periods.len() {
                    let len =
                        cancel_periods(&self.scratch, &self.periods, Some(index), &mut self.residual);
                    if let Some(dip) =
                        deepest_dip(&self.residual[..len], &mut self.yin, tau_min, tau_max)
                    {
                        self.periods[index] = (dip.tau, dip.lag);
                    }
                }
            }
        }

        for (index, &(tau, lag)) in self.periods.iter().enumerate() {
            // Refinement can pull two periods onto the same lag.
            if self.periods[..index].iter().any(|&(other, _)| other == tau) {
                continue;
            }
            let frequency = self.sample_rate / lag;
            if self.in_range(frequency) {
                self.candidates.push(frequency);
            }
        }
        &self.candidates
    }

    /// Clears accumulated audio and adaptive state, keeping the buffers.
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.magnitude_average = 0.0;
        self.last_reading = PitchReading::NoPitch;
    }

    fn analyze_current_frame(&mut self) -> PitchReading {
        let reading = self.detect();
        self.last_reading = reading;
        reading
    }

    fn detect(&mut self) -> PitchReading {
        let average = frame_magnitude(&self.frame);
        let audible = self.passes_magnitude_gate(average);
        let s = self.config.magnitude_smoothing;
        self.magnitude_average = s * average + (1.0 - s) * self.magnitude_average;
        if !audible {
            return PitchReading::NoPitch;
        }

        let (tau_min, tau_max) = self.lag_bounds();
        if tau_min >= tau_max {
            return PitchReading::NoPitch;
        }
        // Two extra lags so the chosen dip always has a right neighbour.
        let lag_limit = (tau_max + 2).min(self.yin.len());
        self.prepare_cmnd(lag_limit);

        let mut search = tau_min;
        while let Some(tau) = first_dip(&self.yin, search, tau_max + 1, self.config.tolerance) {
            let frequency = self.sample_rate / parabolic_refine(&self.yin[..lag_limit], tau);
            if self.in_range(frequency) {
                return PitchReading::Voiced(PitchEstimate {
                    frequency,
                    clarity: (1.0 - self.yin[tau]).clamp(0.0, 1.0),
                });
            }
            search = tau + 1;
        }
        PitchReading::NoPitch
    }

    /// Adaptive gate: `max(input threshold, ratio * running average)`.
    fn passes_magnitude_gate(&self, average: f32) -> bool {
        let gate = self
            .config
            .input_magnitude_threshold
            .max(self.config.adaptive_magnitude_ratio * self.magnitude_average);
        average >= gate
    }

    /// Windows the current frame and fills `yin[..lag_limit]` with the CMND.
    fn prepare_cmnd(&mut self, lag_limit: usize) {
        self.scratch.copy_from_slice(&self.frame);
        self.window.apply(&mut self.scratch);
        difference_function(&self.scratch, &mut self.yin[..lag_limit]);
        cumulative_mean_normalize(&mut self.yin[..lag_limit]);
    }

    /// Lag search range derived from the frequency gate and the half window.
    fn lag_bounds(&self) -> (usize, usize) {
        let half = self.yin.len();
        let tau_min = ((self.sample_rate / self.config.max_frequency).floor() as usize).max(2);
        let tau_max = ((self.sample_rate / self.config.min_frequency).ceil() as usize)
            .min(half.saturating_sub(2));
        (tau_min, tau_max)
    }

    fn in_range(&self, frequency: f32) -> bool {
        frequency.is_finite()
            && frequency >= self.config.min_frequency
            && frequency <= self.config.max_frequency
    }
}

/// Average rectified magnitude of a frame.
fn frame_magnitude(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|s| s.abs()).sum::<f32>() / frame.len() as f32
}

fn mean_square(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|s| s * s).sum::<f32>() / signal.len() as f32
}

/// Copies `source` into `residual` and applies `r[n] -= r[n + τ]` for every
/// period except `skip`. Returns how many residual samples remain valid.
fn cancel_periods(
    source: &[f32],
    periods: &[(usize, f32)],
    skip: Option<usize>,
    residual: &mut [f32],
) -> usize {
    let mut len = source.len().min(residual.len());
    residual[..len].copy_from_slice(&source[..len]);
    for (index, &(tau, _)) in periods.iter().enumerate() {
        if Some(index) == skip {
            continue;
        }
        if tau >= len {
            return 0;
        }
        len -= tau;
        for j in 0..len {
            residual[j] -= residual[j + tau];
        }
    }
    len
}

/// A CMND minimum: integer lag, refined lag and the CMND value there.
#[derive(Debug, Clone, Copy)]
struct Dip {
    tau: usize,
    lag: f32,
    depth: f32,
}

/// Deepest local CMND minimum of `signal` with a lag in `tau_min..=tau_max`.
fn deepest_dip(signal: &[f32], yin: &mut [f32], tau_min: usize, tau_max: usize) -> Option<Dip> {
    let lag_limit = (tau_max + 2).min(signal.len() / 2).min(yin.len());
    if lag_limit < 3 {
        return None;
    }
    let yin = &mut yin[..lag_limit];
    difference_function(signal, yin);
    cumulative_mean_normalize(yin);

    let tau = (tau_min.max(1)..lag_limit - 1)
        .filter(|&t| yin[t] < yin[t - 1] && yin[t] <= yin[t + 1])
        .min_by(|&a, &b| yin[a].total_cmp(&yin[b]))?;
    Some(Dip {
        tau,
        lag: parabolic_refine(yin, tau),
        depth: yin[tau],
    })
}

/// `d(τ) = Σ_j (x[j] - x[j+τ])²` over the first half of `signal`.
fn difference_function(signal: &[f32], out: &mut [f32]) {
    let half = signal.len() / 2;
    if let Some(first) = out.first_mut() {
        *first = 0.0;
    }
    for (tau, slot) in out.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0;
        for j in 0..half {
            let delta = signal[j] - signal[j + tau];
            sum += delta * delta;
        }
        *slot = sum;
    }
}

/// In-place cumulative mean normalized difference, `d'(0) = 1`.
fn cumulative_mean_normalize(yin: &mut [f32]) {
    let Some(first) = yin.first_mut() else {
        return;
    };
    *first = 1.0;
    let mut running_sum = 0.0;
    for (tau, value) in yin.iter_mut().enumerate().skip(1) {
        running_sum += *value;
        *value *= tau as f32 / (running_sum + CMND_EPSILON);
    }
}

/// First lag in `from..to` whose CMND falls below `tolerance`, followed down
/// to the bottom of that dip.
fn first_dip(yin: &[f32], from: usize, to: usize, tolerance: f32) -> Option<usize> {
    let to = to.min(yin.len());
    let mut tau = (from..to).find(|&tau| yin[tau] < tolerance)?;
    while tau + 1 < to && yin[tau + 1] < yin[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Sub-sample lag from a parabola through `tau` and its neighbours.
///
/// Falls back to the integer lag at the edges or when the curvature is degenerate.
fn parabolic_refine(yin: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= yin.len() {
        return tau as f32;
    }
    let (s0, s1, s2) = (yin[tau - 1], yin[tau], yin[tau + 1]);
    let curvature = s0 - 2.0 * s1 + s2;
    if !curvature.is_finite() || curvature.abs() < DEGENERATE_CURVATURE {
        return tau as f32;
    }
    let shift = ((s0 - s2) / (2.0 * curvature)).clamp(-1.0, 1.0);
    tau as f32 + shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SAMPLE_RATE: f32 = 44_100.0;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn detector() -> PitchDetector {
        let mut detector = PitchDetector::new(PitchConfig::default());
        detector.initialize(SAMPLE_RATE, 512).unwrap();
        detector
    }

    #[test]
    fn window_is_at_least_the_configured_minimum() {
        let detector = detector();
        assert_eq!(detector.window_len(), 8192);

        let mut large = PitchDetector::new(PitchConfig::default());
        large.initialize(SAMPLE_RATE, 16_384).unwrap();
        assert_eq!(large.window_len(), 16_384);
    }

    #[test]
    fn detects_sines_across_the_guitar_range() {
        for freq in [82.41, 110.0, 196.0, 329.63, 440.0, 659.25, 987.77, 1318.0] {
            let mut detector = detector();
            let reading = detector.analyze_frame(&sine(freq, 0.5, 8192));
            let detected = reading
                .frequency()
                .unwrap_or_else(|| panic!("no pitch for {freq} Hz"));
            assert!(
                (detected - freq).abs() / freq < 0.01,
                "expected ~{freq} Hz, got {detected} Hz"
            );
        }
    }

    #[test]
    fn clean_sine_has_high_clarity() {
        let mut detector = detector();
        match detector.analyze_frame(&sine(220.0, 0.5, 8192)) {
            PitchReading::Voiced(estimate) => assert!(estimate.clarity > 0.85),
            PitchReading::NoPitch => panic!("expected a pitch"),
        }
    }

    #[test]
    fn silence_has_no_pitch() {
        let mut detector = detector();
        assert_eq!(detector.analyze_frame(&[0.0; 8192]), PitchReading::NoPitch);
        assert_eq!(detector.feed(&[0.0; 8192 * 2]), Some(PitchReading::NoPitch));
    }

    #[test]
    fn quiet_input_is_gated() {
        let mut detector = detector();
        let reading = detector.analyze_frame(&sine(440.0, 0.005, 8192));
        assert_eq!(reading, PitchReading::NoPitch);
    }

    #[test]
    fn wrong_frame_length_has_no_pitch() {
        let mut detector = detector();
        assert_eq!(
            detector.analyze_frame(&sine(440.0, 0.5, 1000)),
            PitchReading::NoPitch
        );
    }

    #[test]
    fn uninitialized_detector_stays_silent() {
        let mut detector = PitchDetector::new(PitchConfig::default());
        assert!(detector.initialize(0.0, 512).is_err());
        assert!(!detector.is_initialized());
        assert_eq!(detector.feed(&sine(440.0, 0.5, 9000)), None);
        assert_eq!(
            detector.analyze_frame(&sine(440.0, 0.5, 8192)),
            PitchReading::NoPitch
        );
    }

    #[test]
    fn feed_waits_for_a_full_window() {
        let mut detector = detector();
        let signal = sine(440.0, 0.5, 8192 + 300);
        let mut readings = Vec::new();
        for block in signal.chunks(512) {
            if let Some(reading) = detector.feed(block) {
                readings.push(reading);
            }
        }
        assert_eq!(readings.len(), 1);
        let detected = readings[0].frequency().unwrap();
        assert!((detected - 440.0).abs() < 4.4);
    }

    #[test]
    fn same_frame_twice_gives_same_frequency() {
        let mut detector = detector();
        let frame = sine(196.0, 0.4, 8192);
        let first = detector.feed(&frame).and_then(|r| r.frequency()).unwrap();
        let second = detector.feed(&frame).and_then(|r| r.frequency()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn instances_do_not_share_state() {
        let mut a = detector();
        let mut b = detector();
        a.feed(&sine(440.0, 0.5, 4000));
        let reading = b.analyze_frame(&sine(110.0, 0.5, 8192));
        assert!((reading.frequency().unwrap() - 110.0).abs() < 1.1);
        assert_eq!(a.last_reading(), PitchReading::NoPitch);
    }

    #[test]
    fn multi_pitch_scan_finds_the_fundamental_first() {
        let mut detector = detector();
        detector.analyze_frame(&sine(220.0, 0.5, 8192));
        let candidates = detector.candidates_for_last_frame().to_vec();
        assert!(!candidates.is_empty());
        assert!((candidates[0] - 220.0).abs() < 2.2);
        assert!(candidates.len() <= PitchConfig::default().max_candidates);
    }

    #[test]
    fn multi_pitch_scan_separates_a_c_major_triad() {
        let mut detector = detector();
        let triad: Vec<f32> = (0..8192)
            .map(|i| {
                [261.63f32, 329.63, 392.0]
                    .iter()
                    .map(|f| 0.2 * (2.0 * PI * f * i as f32 / SAMPLE_RATE).sin())
                    .sum()
            })
            .collect();
        detector.analyze_frame(&triad);
        let candidates = detector.candidates_for_last_frame().to_vec();

        let mut classes: Vec<usize> = candidates
            .iter()
            .filter_map(|&f| crate::tuning::pitch_class_of(f, 440.0))
            .filter(|pc| [0, 4, 7].contains(pc))
            .collect();
        classes.sort_unstable();
        classes.dedup();
        assert!(classes.len() >= 2, "candidates {candidates:?}");
    }

    #[test]
    fn cancel_periods_removes_a_periodic_signal() {
        let source = sine(441.0, 0.5, 1000);
        let mut residual = vec![0.0; 1000];
        let len = cancel_periods(&source, &[(100, 100.0)], None, &mut residual);
        assert_eq!(len, 900);
        assert!(mean_square(&residual[..len]) < 1e-6);

        let len = cancel_periods(&source, &[(100, 100.0)], Some(0), &mut residual);
        assert_eq!(len, 1000);
        assert_eq!(residual, source);
    }

    #[test]
    fn multi_pitch_scan_on_silence_is_empty() {
        let mut detector = detector();
        detector.analyze_frame(&[0.0; 8192]);
        assert!(detector.candidates_for_last_frame().is_empty());
    }

    #[test]
    fn parabolic_refinement_skips_degenerate_curvature() {
        let flat = [0.5, 0.5, 0.5, 0.5];
        assert_eq!(parabolic_refine(&flat, 1), 1.0);
        let dip = [1.0, 0.2, 0.0, 0.2, 1.0];
        assert_eq!(parabolic_refine(&dip, 2), 2.0);
        let skewed = [1.0, 0.4, 0.0, 0.2, 1.0];
        assert!(parabolic_refine(&skewed, 2) > 2.0);
    }

    #[test]
    fn first_dip_descends_to_the_local_minimum() {
        let yin = [1.0, 0.9, 0.12, 0.05, 0.08, 0.01, 0.3];
        assert_eq!(first_dip(&yin, 1, yin.len(), 0.15), Some(3));
        assert_eq!(first_dip(&yin, 1, yin.len(), 0.01), None);
    }
}
