use clap::Parser;
use std::path::PathBuf;

/// command-line interface for the guitar practice analyzer
#[derive(Parser, Debug, Clone)]
#[command(name = "fretlab")]
#[command(about = "real-time pitch, chord and tempo analysis for guitar practice")]
pub struct Cli {
    /// analyzer settings as JSON; omitted fields keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// chord catalog as a JSON array of {"name", "pitch_classes"} objects
    #[arg(long)]
    pub chords: Option<PathBuf>,

    /// practice scale to walk through (use --list-scales to see options)
    #[arg(short, long)]
    pub scale: Option<String>,

    /// target tempo in BPM, clamped to 40..=240
    #[arg(short, long)]
    pub target_bpm: Option<f32>,

    /// stop after this many seconds instead of running until the stream fails
    #[arg(long)]
    pub seconds: Option<u64>,

    /// list the practice scales and chord shapes and exit
    #[arg(long)]
    pub list_scales: bool,
}
