//! # Tempo Tracking Module
//!
//! Onset-based tempo estimation from a per-block energy signal.
//!
//! ## Algorithm
//! 1. The dynamic threshold decays each frame and is floored by a scaled
//!    running average of the energy: `max(threshold * decay, avg * scale)`.
//! 2. A peak is an energy value above the threshold and above the previous
//!    frame, at least `debounce_ms` after the last accepted peak.
//! 3. Peak times go into a bounded history; with two or more, the mean
//!    interval converts to BPM and is smoothed into the current estimate.
//!    Jumps larger than `jump_bpm` use the more aggressive smoothing factor.
//!
//! Time is counted from the samples fed in, never from the wall clock, so
//! the tracker is deterministic.

use linreg::linear_regression;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::config::{IntervalEstimator, TempoConfig};
use crate::error::{ConfigError, check_stream_format};

/// Tracker state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TempoState {
    /// No signal above the threshold recently.
    #[default]
    Idle,
    Playing(Adherence),
}

/// How the detected tempo compares to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adherence {
    /// Not enough peaks for an estimate yet.
    Measuring,
    InTempo,
    Deviating,
}

/// Immutable snapshot handed to the presentation layer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TempoReading {
    /// Smoothed tempo estimate, 0 before the first estimate.
    pub bpm: f32,
    pub target_bpm: f32,
    pub in_tempo: bool,
    pub state: TempoState,
    /// `|bpm - target| / (0.1 * target)` clamped to [0, 1]; 0 means on target.
    pub deviation: f32,
}

#[derive(Debug, Clone)]
pub struct TempoTracker {
    config: TempoConfig,
    target_bpm: f32,
    /// Duration of one `feed` frame in milliseconds.
    frame_ms: f64,
    sample_rate: f32,
    now_ms: f64,
    peak_times: VecDeque<f64>,
    regression_x: Vec<f64>,
    regression_y: Vec<f64>,
    current_bpm: f32,
    threshold: f32,
    running_average: f32,
    previous_energy: f32,
    envelope: f32,
    last_peak_ms: Option<f64>,
    last_signal_ms: Option<f64>,
    state: TempoState,
    initialized: bool,
}

impl TempoTracker {
    pub fn new(config: TempoConfig) -> Self {
        let target_bpm = config
            .target_bpm
            .clamp(TempoConfig::MIN_BPM, TempoConfig::MAX_BPM);
        let history = config.history_len;
        Self {
            config,
            target_bpm,
            frame_ms: 0.0,
            sample_rate: 0.0,
            now_ms: 0.0,
            peak_times: VecDeque::with_capacity(history + 1),
            regression_x: Vec::with_capacity(history),
            regression_y: Vec::with_capacity(history),
            current_bpm: 0.0,
            threshold: 0.0,
            running_average: 0.0,
            previous_energy: 0.0,
            envelope: 0.0,
            last_peak_ms: None,
            last_signal_ms: None,
            state: TempoState::Idle,
            initialized: false,
        }
    }

    /// Sets the clock and clears all tracking state.
    ///
    /// # Arguments
    /// * `sample_rate` - Stream sample rate in Hz
    /// * `block_size` - Samples covered by each [`feed`](Self::feed) call
    ///
    /// # Returns
    /// * `Ok(())` - The tracker accepts input
    /// * `Err(ConfigError)` - Bad stream format or config; input is ignored
    pub fn initialize(&mut self, sample_rate: f32, block_size: usize) -> Result<(), ConfigError> {
        self.initialized = false;
        if let Err(e) = check_stream_format(sample_rate, block_size)
            .and_then(|_| self.config.validate())
        {
            warn!("tempo tracker initialization failed: {e}");
            return Err(e);
        }
        self.sample_rate = sample_rate;
        self.frame_ms = block_size as f64 * 1000.0 / sample_rate as f64;
        self.peak_times = VecDeque::with_capacity(self.config.history_len + 1);
        self.regression_x = Vec::with_capacity(self.config.history_len);
        self.regression_y = Vec::with_capacity(self.config.history_len);
        self.now_ms = 0.0;
        self.current_bpm = 0.0;
        self.threshold = 0.0;
        self.running_average = 0.0;
        self.previous_energy = 0.0;
        self.envelope = 0.0;
        self.last_peak_ms = None;
        self.last_signal_ms = None;
        self.state = TempoState::Idle;
        self.initialized = true;
        debug!(sample_rate, block_size, "tempo tracker initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn target_bpm(&self) -> f32 {
        self.target_bpm
    }

    /// Changes the target, clamped to 40..=240 BPM.
    pub fn set_target_bpm(&mut self, bpm: f32) {
        if bpm.is_finite() {
            self.target_bpm = bpm.clamp(TempoConfig::MIN_BPM, TempoConfig::MAX_BPM);
            self.refresh_adherence();
        }
    }

    pub fn current_bpm(&self) -> f32 {
        self.current_bpm
    }

    pub fn state(&self) -> TempoState {
        self.state
    }

    /// Current time of the internal clock in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn peak_count(&self) -> usize {
        self.peak_times.len()
    }

    /// Feeds the energy of one frame and advances the clock by one frame.
    /// Returns `true` when the frame was accepted as a peak.
    pub fn feed(&mut self, frame_energy: f32) -> bool {
        if !self.initialized {
            return false;
        }
        self.now_ms += self.frame_ms;
        self.step(frame_energy, self.now_ms)
    }

    /// Feeds one energy value observed at `timestamp_ms`.
    ///
    /// Timestamps must not go backwards; earlier ones are treated as "now".
    pub fn feed_at(&mut self, frame_energy: f32, timestamp_ms: f64) -> bool {
        if !self.initialized {
            return false;
        }
        self.now_ms = self.now_ms.max(timestamp_ms);
        self.step(frame_energy, self.now_ms)
    }

    /// Processes one block of mono samples.
    ///
    /// The block's mean absolute value is gated by `signal_threshold`;
    /// only audible blocks pass through the envelope smoother into peak
    /// picking. Silence just advances the clock and may return to idle.
    pub fn process_block(&mut self, samples: &[f32]) -> bool {
        if !self.initialized || samples.is_empty() {
            return false;
        }
        self.now_ms += samples.len() as f64 * 1000.0 / self.sample_rate as f64;

        let magnitude = samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32;
        if magnitude > self.config.signal_threshold {
            let s = self.config.envelope_smoothing;
            self.envelope = s * magnitude + (1.0 - s) * self.envelope;
            self.step(self.envelope, self.now_ms)
        } else {
            self.check_idle(self.now_ms);
            false
        }
    }

    /// True while playing with an estimate inside the tolerance band.
    ///
    /// After an idle timeout the last estimate stays readable through
    /// [`current_bpm`](Self::current_bpm) but no longer counts as in tempo.
    pub fn is_in_tempo(&self) -> bool {
        matches!(self.state, TempoState::Playing(_))
            && self.current_bpm > 0.0
            && (self.current_bpm - self.target_bpm).abs()
                <= self.config.in_tempo_tolerance * self.target_bpm
    }

    /// Normalized distance from the target, 0 on target and 1 at 10% off or more.
    /// Always 1 when idle or still measuring.
    pub fn deviation(&self) -> f32 {
        if self.state == TempoState::Idle || self.current_bpm <= 0.0 {
            return 1.0;
        }
        ((self.current_bpm - self.target_bpm).abs() / (0.1 * self.target_bpm)).clamp(0.0, 1.0)
    }

    pub fn reading(&self) -> TempoReading {
        TempoReading {
            bpm: self.current_bpm,
            target_bpm: self.target_bpm,
            in_tempo: self.is_in_tempo(),
            state: self.state,
            deviation: self.deviation(),
        }
    }

    fn step(&mut self, energy: f32, now: f64) -> bool {
        if energy > self.config.signal_threshold {
            self.last_signal_ms = Some(now);
            if self.state == TempoState::Idle {
                self.state = TempoState::Playing(Adherence::Measuring);
                debug!(now_ms = now, "tempo tracker playing");
            }
        } else {
            self.check_idle(now);
        }

        self.update_threshold(energy);

        let debounced = self
            .last_peak_ms
            .is_none_or(|last| now - last > self.config.debounce_ms as f64);
        let is_peak = energy > self.threshold && energy > self.previous_energy && debounced;
        self.previous_energy = energy;

        if is_peak {
            self.record_peak(now);
        }
        is_peak
    }

    fn update_threshold(&mut self, energy: f32) {
        let s = self.config.energy_smoothing;
        self.running_average = s * energy + (1.0 - s) * self.running_average;
        self.threshold = (self.threshold * self.config.threshold_decay)
            .max(self.running_average * self.config.threshold_scale);
    }

    fn record_peak(&mut self, now: f64) {
        self.last_peak_ms = Some(now);
        self.peak_times.push_back(now);
        while self.peak_times.len() > self.config.history_len {
            self.peak_times.pop_front();
        }

        if let Some(interval) = self.mean_interval() {
            if interval > 0.0 {
                let measured = (60_000.0 / interval) as f32;
                self.smooth_into_estimate(measured);
            }
        }
        self.refresh_adherence();
    }

    fn mean_interval(&mut self) -> Option<f64> {
        let n = self.peak_times.len();
        if n < 2 {
            return None;
        }
        match self.config.interval_estimator {
            IntervalEstimator::Mean => {
                let first = self.peak_times.front()?;
                let last = self.peak_times.back()?;
                Some((last - first) / (n - 1) as f64)
            }
            IntervalEstimator::Regression => {
                if n == 2 {
                    return Some(self.peak_times[1] - self.peak_times[0]);
                }
                self.regression_x.clear();
                self.regression_y.clear();
                for (i, t) in self.peak_times.iter().enumerate() {
                    self.regression_x.push(i as f64);
                    self.regression_y.push(*t);
                }
                linear_regression::<f64, f64, f64>(&self.regression_x, &self.regression_y)
                    .ok()
                    .map(|(slope, _)| slope)
            }
        }
    }

    fn smooth_into_estimate(&mut self, measured: f32) {
        if self.current_bpm <= 0.0 {
            self.current_bpm = measured;
            return;
        }
        let factor = if (self.current_bpm - measured).abs() > self.config.jump_bpm {
            self.config.aggressive_smoothing
        } else {
            self.config.gentle_smoothing
        };
        self.current_bpm = factor * measured + (1.0 - factor) * self.current_bpm;
    }

    fn check_idle(&mut self, now: f64) {
        if self.state == TempoState::Idle {
            return;
        }
        let silent_for = self.last_signal_ms.map_or(f64::INFINITY, |t| now - t);
        if silent_for > self.config.idle_timeout_ms as f64 {
            self.state = TempoState::Idle;
            self.peak_times.clear();
            self.previous_energy = 0.0;
            self.envelope = 0.0;
            debug!(now_ms = now, "tempo tracker idle");
        }
    }

    fn refresh_adherence(&mut self) {
        if let TempoState::Playing(_) = self.state {
            self.state = TempoState::Playing(if self.current_bpm <= 0.0 {
                Adherence::Measuring
            } else if self.is_in_tempo() {
                Adherence::InTempo
            } else {
                Adherence::Deviating
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 48 kHz with 480-sample blocks: one `feed` per 10 ms.
    fn tracker(config: TempoConfig) -> TempoTracker {
        let mut tracker = TempoTracker::new(config);
        tracker.initialize(48_000.0, 480).unwrap();
        tracker
    }

    /// Impulses of `level` every `spacing` frames, zero energy in between.
    fn impulse_train(tracker: &mut TempoTracker, spacing: usize, frames: usize, level: f32) -> usize {
        (0..frames)
            .filter(|i| tracker.feed(if i % spacing == 0 { level } else { 0.0 }))
            .count()
    }

    #[test]
    fn half_second_impulses_converge_to_120_bpm() {
        let mut tracker = tracker(TempoConfig::default());
        // Six impulses, 500 ms apart.
        let peaks = impulse_train(&mut tracker, 50, 251, 1.0);
        assert_eq!(peaks, 6);
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 2.0);
        assert!(tracker.is_in_tempo());
        assert_eq!(tracker.state(), TempoState::Playing(Adherence::InTempo));
    }

    #[test]
    fn regression_estimator_agrees_on_a_steady_pulse() {
        let config = TempoConfig {
            interval_estimator: IntervalEstimator::Regression,
            ..TempoConfig::default()
        };
        let mut tracker = tracker(config);
        impulse_train(&mut tracker, 50, 251, 1.0);
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 2.0);
    }

    #[test]
    fn debounce_rejects_double_triggers() {
        let mut tracker = tracker(TempoConfig::default());
        assert!(tracker.feed_at(1.0, 0.0));
        assert!(!tracker.feed_at(0.0, 100.0));
        // Rising again 200 ms after the last peak is inside the debounce window.
        assert!(!tracker.feed_at(1.0, 200.0));
        assert_eq!(tracker.peak_count(), 1);
        assert!(!tracker.feed_at(0.0, 400.0));
        assert!(tracker.feed_at(1.0, 500.0));
        assert_eq!(tracker.peak_count(), 2);
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 1e-3);
    }

    #[test]
    fn a_flat_signal_is_not_a_peak() {
        let mut tracker = tracker(TempoConfig::default());
        assert!(tracker.feed_at(0.5, 0.0));
        // Same level, later: not above the previous frame.
        assert!(!tracker.feed_at(0.5, 400.0));
    }

    #[test]
    fn history_is_bounded() {
        let mut tracker = tracker(TempoConfig::default());
        impulse_train(&mut tracker, 50, 1000, 1.0);
        assert_eq!(tracker.peak_count(), 6);
    }

    #[test]
    fn large_jumps_adapt_faster() {
        let mut tracker = tracker(TempoConfig::default());
        for t in [0.0, 500.0] {
            tracker.feed_at(1.0, t);
            tracker.feed_at(0.0, t + 10.0);
        }
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 1e-3);

        // Next peak after 1000 ms: mean interval 500 -> 750 ms, 80 BPM (jump of 40).
        tracker.feed_at(1.0, 1500.0);
        let expected = 0.3 * 80.0 + 0.7 * 120.0;
        assert_abs_diff_eq!(tracker.current_bpm(), expected, epsilon = 1e-3);
    }

    #[test]
    fn small_changes_are_smoothed_gently() {
        let mut tracker = tracker(TempoConfig::default());
        tracker.feed_at(1.0, 0.0);
        tracker.feed_at(0.0, 10.0);
        tracker.feed_at(1.0, 500.0);
        tracker.feed_at(0.0, 510.0);
        // Intervals 500 and 550: mean 525 ms, 114.29 BPM.
        tracker.feed_at(1.0, 1050.0);
        let measured = 60_000.0 / 525.0;
        let expected = 0.1 * measured + 0.9 * 120.0;
        assert_abs_diff_eq!(tracker.current_bpm(), expected as f32, epsilon = 1e-3);
    }

    #[test]
    fn off_target_tempo_is_deviating() {
        let config = TempoConfig {
            target_bpm: 90.0,
            ..TempoConfig::default()
        };
        let mut tracker = tracker(config);
        impulse_train(&mut tracker, 50, 251, 1.0);
        assert!(!tracker.is_in_tempo());
        assert_eq!(tracker.state(), TempoState::Playing(Adherence::Deviating));
        assert_abs_diff_eq!(tracker.deviation(), 1.0);

        tracker.set_target_bpm(118.0);
        assert!(tracker.is_in_tempo());
        assert!(tracker.deviation() < 0.2);
    }

    #[test]
    fn target_is_clamped() {
        let mut tracker = tracker(TempoConfig::default());
        tracker.set_target_bpm(400.0);
        assert_eq!(tracker.target_bpm(), 240.0);
        tracker.set_target_bpm(10.0);
        assert_eq!(tracker.target_bpm(), 40.0);
    }

    #[test]
    fn silence_stays_idle() {
        let mut tracker = tracker(TempoConfig::default());
        for _ in 0..500 {
            assert!(!tracker.feed(0.0));
        }
        assert_eq!(tracker.state(), TempoState::Idle);
        assert_eq!(tracker.current_bpm(), 0.0);
        assert!(!tracker.is_in_tempo());

        for _ in 0..100 {
            assert!(!tracker.process_block(&[0.0; 480]));
        }
        assert_eq!(tracker.state(), TempoState::Idle);
    }

    #[test]
    fn prolonged_silence_returns_to_idle() {
        let mut tracker = tracker(TempoConfig::default());
        impulse_train(&mut tracker, 50, 251, 1.0);
        assert!(matches!(tracker.state(), TempoState::Playing(_)));
        assert!(tracker.is_in_tempo());
        for _ in 0..300 {
            tracker.feed(0.0);
        }
        assert_eq!(tracker.state(), TempoState::Idle);
        assert_eq!(tracker.peak_count(), 0);

        // The last estimate is kept for display but no longer counts.
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 2.0);
        let reading = tracker.reading();
        assert!(!reading.in_tempo);
        assert_eq!(reading.deviation, 1.0);
    }

    #[test]
    fn process_block_tracks_strummed_pulses() {
        let mut tracker = tracker(TempoConfig::default());
        let loud = [0.5f32; 480];
        let quiet = [0.0f32; 480];
        let mut peaks = 0;
        // 10 ms blocks: 100 ms of strumming every 500 ms.
        for i in 0..300 {
            let block: &[f32] = if i % 50 < 10 { &loud } else { &quiet };
            if tracker.process_block(block) {
                peaks += 1;
            }
        }
        assert!(peaks >= 3, "only {peaks} peaks");
        assert_abs_diff_eq!(tracker.current_bpm(), 120.0, epsilon = 2.0);
    }

    #[test]
    fn uninitialized_tracker_ignores_input() {
        let mut tracker = TempoTracker::new(TempoConfig::default());
        assert!(!tracker.feed(1.0));
        assert!(tracker.initialize(48_000.0, 0).is_err());
        assert!(!tracker.process_block(&[1.0; 64]));
        assert_eq!(tracker.state(), TempoState::Idle);
    }
}
