//! Error types for the encoder core
//!
//! Only configuration problems are surfaced to the caller; the quantization
//! hot path always recovers to a fallback candidate and never returns an
//! error (a Layer III frame always carries some encoding).

use thiserror::Error;

/// Configuration validation errors, raised at initialization only
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Unsupported sample rate
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Unsupported bitrate for the MPEG version implied by the sample rate
    #[error("unsupported bitrate: {0} kbps")]
    UnsupportedBitrate(u32),

    /// Invalid channel configuration
    #[error("invalid channel count: {0}")]
    InvalidChannels(u8),

    /// Incompatible sample rate and bitrate combination
    #[error("incompatible sample rate ({sample_rate} Hz) and bitrate ({bitrate} kbps)")]
    IncompatibleRateCombination { sample_rate: u32, bitrate: u32 },

    /// Channel mode does not match the channel count
    #[error("stereo mode {mode} is invalid for {channels} channel(s)")]
    InvalidChannelMode { mode: &'static str, channels: u8 },

    /// A tuning knob is outside its documented range
    #[error("parameter {name} = {value} outside [{min}, {max}]")]
    ParameterOutOfRange {
        name: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    /// ABR/VBR bitrate bounds are inverted or out of table range
    #[error("invalid bitrate bounds: min {min} kbps > max {max} kbps")]
    InvalidBitrateBounds { min: u32, max: u32 },
}

/// Errors raised when frame input violates the caller contract
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Wrong number of granule bundles for the configured MPEG version
    #[error("expected {expected} granule(s) per frame, got {actual}")]
    GranuleCountMismatch { expected: usize, actual: usize },

    /// Wrong number of channel bundles for the configured channel mode
    #[error("expected {expected} channel(s), got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
