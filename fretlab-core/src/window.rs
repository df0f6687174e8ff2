//! # Windowing Module
//!
//! Taper functions applied to a frame before spectral or autocorrelation
//! analysis. Tables are computed once at initialization and reused for every
//! frame, so applying a window never allocates.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Supported taper shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Tapers to zero at both edges. Used for the FFT path.
    #[default]
    Hann,
    /// Raised cosine that stops at 0.08. Used before the YIN difference function.
    Hamming,
}

impl WindowKind {
    /// Coefficient `i` of a symmetric window of length `n`.
    fn coefficient(self, i: usize, n: usize) -> f32 {
        if n < 2 {
            return 1.0;
        }
        let phase = 2.0 * PI * i as f32 / (n - 1) as f32;
        match self {
            WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
            WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
        }
    }
}

/// A precomputed window table.
#[derive(Debug, Clone)]
pub struct Window {
    table: Vec<f32>,
    sum: f32,
}

impl Window {
    pub fn new(kind: WindowKind, len: usize) -> Self {
        let table: Vec<f32> = (0..len).map(|i| kind.coefficient(i, len)).collect();
        let sum = table.iter().sum();
        Self { table, sum }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Sum of all coefficients (the window's DC gain).
    pub fn sum(&self) -> f32 {
        self.sum
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.table
    }

    /// Multiplies `frame` by the window in place.
    ///
    /// Only the overlapping prefix is touched when the lengths differ.
    pub fn apply(&self, frame: &mut [f32]) {
        for (sample, w) in frame.iter_mut().zip(&self.table) {
            *sample *= *w;
        }
    }
}

/// Removes the DC offset from a signal by making its average value zero.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn hann_tapers_to_zero_and_peaks_in_the_middle() {
        let w = Window::new(WindowKind::Hann, 9);
        let c = w.coefficients();
        assert_abs_diff_eq!(c[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c[8], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(c[4], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn hamming_keeps_a_pedestal() {
        let w = Window::new(WindowKind::Hamming, 9);
        let c = w.coefficients();
        assert_abs_diff_eq!(c[0], 0.08, epsilon = 1e-6);
        assert_abs_diff_eq!(c[4], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn hann_sum_is_about_half_the_length() {
        let w = Window::new(WindowKind::Hann, 1024);
        assert_abs_diff_eq!(w.sum(), 511.5, epsilon = 0.01);
    }

    #[test]
    fn apply_scales_samples() {
        let w = Window::new(WindowKind::Hann, 5);
        let mut frame = [2.0; 5];
        w.apply(&mut frame);
        assert_abs_diff_eq!(frame[2], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(frame[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = [1.5, 2.5, 1.5, 2.5];
        remove_dc_offset(&mut signal);
        assert_abs_diff_eq!(signal.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(signal[0], -0.5, epsilon = 1e-6);
    }
}
