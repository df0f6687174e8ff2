//! # Chord Recognition Module
//!
//! Matches pitch-class histograms against a catalog of chord templates.
//!
//! The catalog is data: a list of names with their pitch-class sets, held in
//! registration order. Matching tolerates a configurable number of missing
//! notes, and a best match must repeat for several frames before it is
//! reported as confirmed.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::chroma::{PITCH_CLASSES, PitchClassHistogram};
use crate::config::{ChordConfig, ThresholdReference};
use crate::error::ConfigError;
use crate::stability::StabilityGate;
use crate::tuning::PITCH_CLASS_NAMES;

/// Shown when nothing in the catalog qualifies.
pub const UNKNOWN_CHORD: &str = "Unknown Chord";

/// A chord name and the pitch classes (0 = C) it is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChordTemplate {
    pub name: Arc<str>,
    pub pitch_classes: Vec<u8>,
}

impl ChordTemplate {
    pub fn new(name: &str, pitch_classes: &[u8]) -> Self {
        Self {
            name: Arc::from(name),
            pitch_classes: pitch_classes.to_vec(),
        }
    }

    /// A template built from a root and semitone intervals above it.
    pub fn from_intervals(name: &str, root: u8, intervals: &[u8]) -> Self {
        let pitch_classes: Vec<u8> = intervals.iter().map(|i| (root + i) % 12).collect();
        Self::new(name, &pitch_classes)
    }

    /// Number of pitch classes the chord needs.
    pub fn note_count(&self) -> usize {
        self.pitch_classes.len()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidTemplate {
            name: self.name.to_string(),
            reason,
        };
        if !(2..=4).contains(&self.pitch_classes.len()) {
            return Err(invalid("a template needs between two and four notes"));
        }
        if self.pitch_classes.iter().any(|&pc| pc as usize >= PITCH_CLASSES) {
            return Err(invalid("pitch classes must be below 12"));
        }
        let mut seen = [false; PITCH_CLASSES];
        for &pc in &self.pitch_classes {
            if std::mem::replace(&mut seen[pc as usize], true) {
                return Err(invalid("pitch classes must not repeat"));
            }
        }
        Ok(())
    }
}

/// An ordered, validated set of chord templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChordTemplate>", into = "Vec<ChordTemplate>")]
pub struct ChordCatalog {
    templates: Vec<ChordTemplate>,
}

impl ChordCatalog {
    pub fn new(templates: Vec<ChordTemplate>) -> Result<Self, ConfigError> {
        if templates.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        templates.iter().try_for_each(ChordTemplate::validate)?;
        Ok(Self { templates })
    }

    /// Major and minor triads on all twelve roots, `"C Major"`, `"C Minor"`, ...
    pub fn standard() -> Self {
        STANDARD_CATALOG.clone()
    }

    pub fn templates(&self) -> &[ChordTemplate] {
        &self.templates
    }

    pub fn get(&self, index: usize) -> Option<&ChordTemplate> {
        self.templates.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&ChordTemplate> {
        self.templates.iter().find(|t| &*t.name == name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl TryFrom<Vec<ChordTemplate>> for ChordCatalog {
    type Error = ConfigError;

    fn try_from(templates: Vec<ChordTemplate>) -> Result<Self, Self::Error> {
        Self::new(templates)
    }
}

impl From<ChordCatalog> for Vec<ChordTemplate> {
    fn from(catalog: ChordCatalog) -> Self {
        catalog.templates
    }
}

static STANDARD_CATALOG: Lazy<ChordCatalog> = Lazy::new(|| {
    const QUALITIES: [(&str, [u8; 3]); 2] = [("Major", [0, 4, 7]), ("Minor", [0, 3, 7])];
    let templates = (0..12u8)
        .flat_map(|root| {
            QUALITIES.iter().map(move |(quality, intervals)| {
                let name = format!("{} {}", PITCH_CLASS_NAMES[root as usize], quality);
                ChordTemplate::from_intervals(&name, root, intervals)
            })
        })
        .collect();
    ChordCatalog { templates }
});

/// Best template for one histogram: catalog index and confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateScore {
    pub index: usize,
    pub confidence: f32,
}

/// Scores every template and returns the best qualifying one.
///
/// A bin is present when it exceeds `detection_threshold` times the
/// histogram's peak (or average). Confidence is the sum of the present
/// template bins divided by the template size. A template qualifies when at
/// most `max_missing_notes` of its notes are absent. The highest confidence
/// wins and ties go to the template registered first.
///
/// # Arguments
/// * `histogram` - Pitch-class magnitudes of one frame
/// * `catalog` - Templates in registration order
/// * `config` - Threshold, its reference, and the missing-note allowance
///
/// # Returns
/// * `Some(score)` - Index and confidence of the winning template
/// * `None` - The histogram is silent or no template qualifies
pub fn best_match(
    histogram: &PitchClassHistogram,
    catalog: &ChordCatalog,
    config: &ChordConfig,
) -> Option<TemplateScore> {
    if histogram.is_silent() {
        return None;
    }
    let reference = match config.threshold_reference {
        ThresholdReference::Peak => histogram.peak(),
        ThresholdReference::Average => histogram.average(),
    };
    let threshold = config.detection_threshold * reference;

    let mut best: Option<TemplateScore> = None;
    for (index, template) in catalog.templates().iter().enumerate() {
        let (matched, energy) = template
            .pitch_classes
            .iter()
            .map(|&pc| histogram.get(pc as usize))
            .filter(|&magnitude| magnitude > threshold)
            .fold((0usize, 0.0f32), |(count, sum), m| (count + 1, sum + m));

        if template.note_count() - matched > config.max_missing_notes {
            continue;
        }
        let confidence = energy / template.note_count() as f32;
        if best.is_none_or(|b| confidence > b.confidence) {
            best = Some(TemplateScore { index, confidence });
        }
    }
    best
}

/// Result of one recognition step.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordMatch {
    /// Best template for this frame, `None` when nothing qualified.
    pub name: Option<Arc<str>>,
    pub confidence: f32,
    /// How many consecutive frames produced this same best match.
    pub stable_frames: u32,
    /// True once `stable_frames` reaches the configured requirement.
    pub confirmed: bool,
}

impl ChordMatch {
    /// The chord name, or `"Unknown Chord"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_CHORD)
    }
}

/// Stateful recognizer: template matching plus stability gating.
#[derive(Debug, Clone)]
pub struct ChordRecognizer {
    config: ChordConfig,
    catalog: ChordCatalog,
    gate: StabilityGate<Option<usize>>,
}

impl ChordRecognizer {
    pub fn new(config: ChordConfig, catalog: ChordCatalog) -> Self {
        let gate = StabilityGate::new(config.stable_frames);
        Self {
            config,
            catalog,
            gate,
        }
    }

    pub fn catalog(&self) -> &ChordCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ChordConfig {
        &self.config
    }

    /// Matches one histogram and advances the stability streak.
    ///
    /// "No qualifying template" is tracked like any other outcome, so a run of
    /// silent frames confirms an unknown chord.
    pub fn process(&mut self, histogram: &PitchClassHistogram) -> ChordMatch {
        let score = best_match(histogram, &self.catalog, &self.config);
        let stable_frames = self.gate.observe(score.map(|s| s.index));
        if self.gate.just_confirmed() {
            debug!(
                chord = score.and_then(|s| self.catalog.get(s.index)).map_or(UNKNOWN_CHORD, |t| &*t.name),
                "chord confirmed"
            );
        }
        ChordMatch {
            name: score
                .and_then(|s| self.catalog.get(s.index))
                .map(|t| Arc::clone(&t.name)),
            confidence: score.map_or(0.0, |s| s.confidence),
            stable_frames,
            confirmed: self.gate.is_stable(),
        }
    }

    pub fn reset(&mut self) {
        self.gate.reset();
    }
}
