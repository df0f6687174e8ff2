//! # Audio Capture Module
//!
//! Real-time capture from the default input device using CPAL
//! (Cross-Platform Audio Library). The [`Analyzer`] runs directly inside the
//! stream callback, so results are available through its published outputs
//! without any buffer hand-off.
//!
//! ## Features
//! - Default input device selection
//! - Closest supported rate to 44.1 kHz, preferring 32-bit float
//! - Any channel count; the analyzer downmixes interleaved input
//! - Stream errors forwarded over a channel instead of printed

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfigRange};
use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::analyzer::Analyzer;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Largest callback block the analyzer is sized for up front. Bigger host
/// buffers are still processed, in pieces of this size.
pub const BLOCK_SIZE: usize = 2048;

/// Format chosen for the running stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Starts capture from the default input device and drives `analyzer` from
/// the audio callback.
///
/// The analyzer is initialized for the selected format before the stream
/// starts. Errors reported by the running stream are sent on `errors`; the
/// callback itself never blocks on the channel.
///
/// # Returns
/// * `Ok((stream, info))` - Stream handle (capture stops when dropped) and format
/// * `Err(e)` - No usable device or format, or the stream could not start
pub fn start_audio_capture(
    mut analyzer: Analyzer,
    errors: Sender<cpal::StreamError>,
) -> Result<(cpal::Stream, CaptureInfo)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    info!(device = %device.name().unwrap_or_else(|_| "<unnamed>".into()), "using audio input device");

    let configs = device
        .supported_input_configs()
        .context("querying supported input configurations")?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, TARGET_SAMPLE_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = TARGET_SAMPLE_RATE.clamp(supported.min_sample_rate().0, supported.max_sample_rate().0);
    let config: cpal::StreamConfig = supported.with_sample_rate(cpal::SampleRate(rate)).into();
    let info = CaptureInfo {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    analyzer
        .initialize(info.sample_rate as f32, BLOCK_SIZE)
        .context("initializing the analyzer for the input format")?;
    info!(
        sample_rate = info.sample_rate,
        channels = info.channels,
        "selected input format"
    );

    let channels = info.channels as usize;
    let err_fn = move |err: cpal::StreamError| {
        warn!("audio stream error: {err}");
        let _ = errors.try_send(err);
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                analyzer.process(data, channels);
            },
            err_fn,
            None,
        )
        .context("building the input stream")?;

    stream.play().context("starting the input stream")?;
    Ok((stream, info))
}

/// Picks the f32 configuration whose rate range lies closest to
/// `target_rate`. Ranges that contain the target win outright.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .min_by_key(|c| (rate_distance(c, target_rate), c.channels()))
}

fn rate_distance(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    let min = config.min_sample_rate().0;
    let max = config.max_sample_rate().0;
    if target_rate < min {
        min - target_rate
    } else {
        target_rate.saturating_sub(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_a_range_containing_the_target() {
        let configs = vec![
            range(2, 48_000, 48_000, SampleFormat::F32),
            range(2, 8_000, 96_000, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.min_sample_rate().0, 8_000);
    }

    #[test]
    fn ignores_non_float_formats_and_favours_fewer_channels() {
        let configs = vec![
            range(1, 44_100, 44_100, SampleFormat::I16),
            range(2, 44_100, 44_100, SampleFormat::F32),
            range(1, 44_100, 44_100, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);

        assert!(find_supported_config(vec![range(1, 44_100, 44_100, SampleFormat::I16)], 44_100).is_none());
    }
}
