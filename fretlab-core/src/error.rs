//! Configuration errors raised at initialization time.
//!
//! Signal-quality rejections (silence, no periodicity, nothing above the
//! noise floor) are not errors and never show up here: they come back as
//! sentinel values from the detectors themselves.

use thiserror::Error;

/// Invalid parameters handed to a detector's `initialize` or constructor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f32),

    #[error("block size must be non-zero")]
    InvalidBlockSize,

    #[error("FFT order {0} is outside the supported range 6..=16")]
    InvalidFftOrder(u32),

    #[error("`{name}` = {value} is invalid: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f32,
        reason: &'static str,
    },

    #[error("chord catalog contains no templates")]
    EmptyCatalog,

    #[error("chord template `{name}` is invalid: {reason}")]
    InvalidTemplate { name: String, reason: &'static str },
}

/// Validates a sample rate / block size pair as handed over by the audio host.
pub(crate) fn check_stream_format(sample_rate: f32, block_size: usize) -> Result<(), ConfigError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(ConfigError::InvalidSampleRate(sample_rate));
    }
    if block_size == 0 {
        return Err(ConfigError::InvalidBlockSize);
    }
    Ok(())
}

/// Checks that `value` lies in the open unit interval.
pub(crate) fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must lie strictly between 0 and 1",
        })
    }
}

/// Checks that `value` is strictly positive and finite.
pub(crate) fn check_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            value,
            reason: "must be positive",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_stream_formats() {
        assert_eq!(
            check_stream_format(0.0, 512),
            Err(ConfigError::InvalidSampleRate(0.0))
        );
        assert!(check_stream_format(f32::NAN, 512).is_err());
        assert_eq!(
            check_stream_format(44_100.0, 0),
            Err(ConfigError::InvalidBlockSize)
        );
        assert!(check_stream_format(48_000.0, 256).is_ok());
    }

    #[test]
    fn unit_interval_is_open() {
        assert!(check_unit("tolerance", 0.0).is_err());
        assert!(check_unit("tolerance", 1.0).is_err());
        assert!(check_unit("tolerance", 0.15).is_ok());
    }
}
