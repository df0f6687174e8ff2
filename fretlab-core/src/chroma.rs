//! Twelve-bin pitch-class histograms (0 = C ... 11 = B).

use crate::config::Normalization;
use crate::tuning::{PITCH_CLASS_NAMES, pitch_class_of};

pub const PITCH_CLASSES: usize = 12;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchClassHistogram {
    bins: [f32; PITCH_CLASSES],
}

impl PitchClassHistogram {
    pub fn from_bins(bins: [f32; PITCH_CLASSES]) -> Self {
        Self { bins }
    }

    /// One unit of weight per frequency, attributed to its nearest pitch class.
    /// Invalid frequencies are skipped. The result is normalized by its maximum.
    pub fn from_frequencies(frequencies: &[f32], reference_a4: f32) -> Self {
        let mut histogram = Self::default();
        for &freq in frequencies {
            if let Some(pc) = pitch_class_of(freq, reference_a4) {
                histogram.add(pc, 1.0);
            }
        }
        histogram.normalize(Normalization::Max);
        histogram
    }

    pub fn get(&self, pitch_class: usize) -> f32 {
        self.bins[pitch_class % PITCH_CLASSES]
    }

    /// Adds `magnitude` to the bin of `pitch_class`, wrapped into 0..12.
    pub fn add(&mut self, pitch_class: usize, magnitude: f32) {
        self.bins[pitch_class % PITCH_CLASSES] += magnitude;
    }

    pub fn peak(&self) -> f32 {
        self.bins.iter().copied().fold(0.0, f32::max)
    }

    pub fn total(&self) -> f32 {
        self.bins.iter().sum()
    }

    pub fn average(&self) -> f32 {
        self.total() / PITCH_CLASSES as f32
    }

    /// True when no bin carries any energy.
    pub fn is_silent(&self) -> bool {
        self.peak() <= 0.0
    }

    /// Index of the strongest bin, `None` for a silent histogram.
    pub fn dominant(&self) -> Option<usize> {
        if self.is_silent() {
            return None;
        }
        self.bins
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Scales the bins into [0, 1]. A silent histogram is left untouched.
    pub fn normalize(&mut self, mode: Normalization) {
        let divisor = match mode {
            Normalization::Max => self.peak(),
            Normalization::Sum => self.total(),
        };
        if divisor > 0.0 {
            for bin in &mut self.bins {
                *bin /= divisor;
            }
        }
    }

    /// Pitch-class names whose bins exceed `threshold`.
    pub fn active_names(&self, threshold: f32) -> impl Iterator<Item = &'static str> + '_ {
        self.bins
            .iter()
            .enumerate()
            .filter(move |(_, m)| **m > threshold)
            .map(|(i, _)| PITCH_CLASS_NAMES[i])
    }
}
