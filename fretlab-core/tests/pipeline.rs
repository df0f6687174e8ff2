//! End-to-end runs of the analyzer on synthesized audio.

use approx::assert_abs_diff_eq;
use fretlab_core::{
    Adherence, Analyzer, AnalyzerConfig, ChordCatalog, NoteName, PitchReading, TempoState,
};
use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;

const SAMPLE_RATE: f32 = 44_100.0;
const BLOCK: usize = 441;

fn tones(freqs: &[f32], amplitude: f32, seconds: f32) -> Vec<f32> {
    (0..(SAMPLE_RATE * seconds) as usize)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            freqs
                .iter()
                .map(|f| amplitude * (2.0 * PI * f * t).sin())
                .sum()
        })
        .collect()
}

fn analyzer() -> Analyzer {
    let mut analyzer = Analyzer::new(AnalyzerConfig::default(), ChordCatalog::standard());
    analyzer.initialize(SAMPLE_RATE, BLOCK).unwrap();
    analyzer
}

fn play(analyzer: &mut Analyzer, signal: &[f32]) {
    for block in signal.chunks(BLOCK) {
        analyzer.process(block, 1);
    }
}

#[test]
fn c_major_triad_is_confirmed() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();

    let triad = tones(&[261.63, 329.63, 392.0], 0.2, 3.0);
    let (first_second, rest) = triad.split_at(SAMPLE_RATE as usize);

    play(&mut analyzer, first_second);
    // Fewer windows than the stability gate needs.
    assert_eq!(outputs.chord.snapshot().name, None);

    play(&mut analyzer, rest);
    let chord = outputs.chord.snapshot();
    assert_eq!(chord.display_name(), "C Major");
    assert!(chord.confidence > 0.5, "confidence {}", chord.confidence);
}

#[test]
fn silence_produces_no_detections() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();
    play(&mut analyzer, &vec![0.0; (SAMPLE_RATE * 4.0) as usize]);

    assert_eq!(*outputs.pitch.snapshot(), PitchReading::NoPitch);
    assert_eq!(outputs.note.snapshot().note, NoteName::Unknown);
    assert_eq!(outputs.chord.snapshot().display_name(), "Unknown Chord");
    let tempo = outputs.tempo.snapshot();
    assert_eq!(tempo.state, TempoState::Idle);
    assert!(!tempo.in_tempo);
}

#[test]
fn open_a_string_is_named_and_in_tune() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();
    play(&mut analyzer, &tones(&[110.0], 0.4, 1.0));

    let frequency = outputs.pitch.snapshot().frequency().unwrap();
    assert_abs_diff_eq!(frequency, 110.0, epsilon = 1.1);
    let note = outputs.note.snapshot();
    assert_eq!(note.note.to_string(), "A2");
    assert!(note.cents.unwrap().abs() < 16.0);
}

#[test]
fn strummed_pulse_at_120_bpm_is_in_tempo() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();

    // 100 ms of a constant-level square wave every 500 ms.
    let loud: Vec<f32> = (0..BLOCK).map(|i| if i % 100 < 50 { 0.5 } else { -0.5 }).collect();
    let quiet = vec![0.0f32; BLOCK];
    for i in 0..300 {
        analyzer.process(if i % 50 < 10 { &loud } else { &quiet }, 1);
    }

    let tempo = outputs.tempo.snapshot();
    assert_abs_diff_eq!(tempo.bpm, 120.0, epsilon = 2.0);
    assert!(tempo.in_tempo);
    assert_eq!(tempo.state, TempoState::Playing(Adherence::InTempo));
}

#[test]
fn tempo_is_no_longer_in_tempo_once_idle() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();

    let loud: Vec<f32> = (0..BLOCK).map(|i| if i % 100 < 50 { 0.5 } else { -0.5 }).collect();
    let quiet = vec![0.0f32; BLOCK];
    for i in 0..300 {
        analyzer.process(if i % 50 < 10 { &loud } else { &quiet }, 1);
    }
    assert!(outputs.tempo.snapshot().in_tempo);

    // Four seconds of silence, past the idle timeout.
    for _ in 0..400 {
        analyzer.process(&quiet, 1);
    }
    let tempo = outputs.tempo.snapshot();
    assert_eq!(tempo.state, TempoState::Idle);
    assert!(!tempo.in_tempo);
    assert_eq!(tempo.deviation, 1.0);
}

#[test]
fn readers_poll_while_the_audio_thread_publishes() {
    let mut analyzer = analyzer();
    let outputs = analyzer.outputs();
    let signal = tones(&[196.0], 0.3, 2.0);

    let audio = thread::spawn(move || play(&mut analyzer, &signal));
    let reader = {
        let outputs = Arc::clone(&outputs);
        thread::spawn(move || {
            let mut last = 0;
            for _ in 0..1000 {
                let generation = outputs.generation();
                assert!(generation >= last);
                last = generation;
                let _ = outputs.pitch.snapshot();
            }
        })
    };
    audio.join().unwrap();
    reader.join().unwrap();

    assert_eq!(outputs.note.snapshot().note, NoteName::new(7, 3));
}
