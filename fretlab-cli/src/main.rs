//! # fretlab - headless guitar practice analyzer
//!
//! Captures the default input device, runs the analysis core on the audio
//! callback, and reports the published results from the main thread.
//!
//! ## Architecture
//! - **Audio Thread**: CPAL callback driving `fretlab_core::Analyzer`
//! - **Main Thread**: polls the lock-free result cells on a ticker
//! - **Communication**: published snapshots for results, a crossbeam channel
//!   for stream errors

mod cli;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use crossbeam_channel::{after, never, select, tick};
use fretlab_core::practice::{ExerciseEvent, PRACTICE_SCALES, ScaleExercise, scale_by_name};
use fretlab_core::shapes::{CHORD_SHAPES, ChordShape, shape_for};
use fretlab_core::{
    AnalysisOutputs, Analyzer, AnalyzerConfig, ChordCatalog, NoteName, TempoState, audio,
};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// How often the published results are polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if cli.list_scales {
        list_scales();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AnalyzerConfig::default(),
    };
    if let Some(bpm) = cli.target_bpm {
        config.tempo.target_bpm = bpm;
    }
    config.validate().context("invalid analyzer configuration")?;

    let catalog = match &cli.chords {
        Some(path) => load_catalog(path)?,
        None => ChordCatalog::standard(),
    };
    info!(templates = catalog.len(), "chord catalog loaded");

    let exercise = match &cli.scale {
        Some(name) => {
            let scale = scale_by_name(name)
                .ok_or_else(|| anyhow!("unknown scale {name:?}, see --list-scales"))?;
            Some(ScaleExercise::new(scale))
        }
        None => None,
    };

    let analyzer = Analyzer::new(config, catalog);
    let outputs = analyzer.outputs();

    let (error_tx, error_rx) = crossbeam_channel::bounded(16);
    let (stream, format) = audio::start_audio_capture(analyzer, error_tx)?;
    info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "capture started, press Ctrl+C to stop"
    );

    let mut reporter = Reporter::new(exercise);
    reporter.announce_exercise();

    let ticker = tick(POLL_INTERVAL);
    let deadline = cli
        .seconds
        .map_or_else(never, |s| after(Duration::from_secs(s)));

    loop {
        select! {
            recv(ticker) -> _ => reporter.poll(&outputs),
            recv(error_rx) -> err => match err {
                Ok(cpal::StreamError::DeviceNotAvailable) => {
                    bail!("the input device is no longer available");
                }
                Ok(err) => warn!("continuing after stream error: {err}"),
                Err(_) => break,
            },
            recv(deadline) -> _ => break,
        }
    }

    drop(stream);
    info!("capture stopped");
    Ok(())
}

fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn load_catalog(path: &Path) -> Result<ChordCatalog> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading chord catalog {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing chord catalog {}", path.display()))
}

fn list_scales() {
    println!("Scales:");
    for scale in &PRACTICE_SCALES {
        let notes: Vec<String> = scale.steps.iter().map(|s| s.note.to_string()).collect();
        println!("  {:<20} {}", scale.name, notes.join(" "));
    }
    println!("Chord shapes:");
    for shape in &CHORD_SHAPES {
        println!("  {:<20} {}", shape.name, diagram(shape));
    }
}

/// Fret per string from low E to high E, `x` for muted strings.
fn diagram(shape: &ChordShape) -> String {
    (1..=6u8)
        .rev()
        .map(|string| shape.fret_on(string).map_or("x".to_string(), |f| f.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prints published results whenever their sequence numbers move.
struct Reporter {
    exercise: Option<ScaleExercise>,
    note_seq: u64,
    chord_seq: u64,
    tempo_seq: u64,
    last_tempo_state: TempoState,
}

impl Reporter {
    fn new(exercise: Option<ScaleExercise>) -> Self {
        Self {
            exercise,
            note_seq: 0,
            chord_seq: 0,
            tempo_seq: 0,
            last_tempo_state: TempoState::Idle,
        }
    }

    fn announce_exercise(&self) {
        let Some(exercise) = &self.exercise else {
            return;
        };
        println!("Scale: {}", exercise.scale().name);
        if let Some(step) = exercise.required() {
            println!(
                "Play {} (string {}, fret {})",
                step.note, step.string, step.fret
            );
        }
    }

    fn poll(&mut self, outputs: &AnalysisOutputs) {
        let seq = outputs.note.sequence();
        if seq != self.note_seq {
            self.note_seq = seq;
            let note = outputs.note.snapshot();
            if note.note.is_known() {
                match note.cents {
                    Some(cents) => println!("Note: {} ({cents:+.0} cents)", note.note),
                    None => println!("Note: {}", note.note),
                }
                self.advance_exercise(note.note);
            }
        }

        let seq = outputs.chord.sequence();
        if seq != self.chord_seq {
            self.chord_seq = seq;
            let chord = outputs.chord.snapshot();
            match chord.name.as_deref().and_then(shape_for) {
                Some(shape) => println!("Chord: {chord}  [{}]", diagram(shape)),
                None => println!("Chord: {chord}"),
            }
        }

        let seq = outputs.tempo.sequence();
        if seq != self.tempo_seq {
            self.tempo_seq = seq;
            let tempo = outputs.tempo.snapshot();
            let state_changed = tempo.state != self.last_tempo_state;
            self.last_tempo_state = tempo.state;
            if tempo.bpm > 0.0 && (state_changed || tempo.state != TempoState::Idle) {
                println!(
                    "Tempo: {:.1} BPM (target {:.0}, {})",
                    tempo.bpm,
                    tempo.target_bpm,
                    if tempo.in_tempo { "in tempo" } else { "off tempo" }
                );
            } else if state_changed && tempo.state == TempoState::Idle {
                println!("Tempo: idle");
            }
        }
    }

    fn advance_exercise(&mut self, note: NoteName) {
        let Some(exercise) = self.exercise.as_mut() else {
            return;
        };
        match exercise.observe(note) {
            Some(ExerciseEvent::Advanced { next }) => println!(
                "Correct! Next: {} (string {}, fret {})",
                next.note, next.string, next.fret
            ),
            Some(ExerciseEvent::Completed) => {
                println!("Scale completed! Starting again...");
                exercise.restart();
                self.announce_exercise();
            }
            None => {}
        }
    }
}
