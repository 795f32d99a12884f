//! Encoder configuration and validation
//!
//! All parameter checking happens here, before an encoder instance exists;
//! the quantization hot path assumes a validated configuration and never
//! re-checks it.

use crate::error::{ConfigError, ConfigResult};
use crate::tables::{samplerate_index, BITRATES_LSF, BITRATES_MPEG1};
use crate::types::{ChannelMode, MpegVersion};

/// Rate-control strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VbrMode {
    /// Constant bitrate at `EncoderConfig::bitrate`
    Off,
    /// Average bitrate around `EncoderConfig::abr_mean_kbps`
    Abr,
    /// True variable bitrate, quality-driven
    Rh,
}

/// Encoder configuration; build with the setters and finish with
/// [`EncoderConfig::validate`].
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Sample rate in Hz; selects the MPEG version
    pub samplerate: u32,
    /// Channel mode; selects the channel count
    pub mode: ChannelMode,
    /// CBR bitrate in kbps (also the ABR fallback ceiling seed)
    pub bitrate: u32,
    pub vbr_mode: VbrMode,
    /// VBR quality, 0 (best) ..= 9 (smallest)
    pub vbr_q: u32,
    /// Target mean bitrate for ABR, kbps
    pub abr_mean_kbps: u32,
    /// Bitrate index bounds for VBR/ABR frame selection
    pub vbr_min_kbps: u32,
    pub vbr_max_kbps: u32,
    /// Encode speed/quality trade, 0 (slowest) ..= 9 (fastest)
    pub quality: u32,
    /// Quantization comparator mode, 0 ..= 8
    pub experimental_x: u32,
    /// Disables the last-band extra tolerance
    pub experimental_y: bool,
    /// Alternative subblock-gain gate
    pub experimental_z: bool,
    /// 0 = single pass, 1 = amplify, 2 = amplify + scalefac_scale
    pub noise_shaping: u8,
    /// 0 = amplify all offending bands, >0 = only the worst band per pass
    pub noise_shaping_amp: u8,
    /// Extra stop condition strictness for the outer loop
    pub noise_shaping_stop: u8,
    /// Allow a distorted top band to cut VBR iteration short
    pub sfb21_extra: bool,
    /// Copyright/original header flags
    pub copyright: bool,
    pub original: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            samplerate: 44100,
            mode: ChannelMode::JointStereo,
            bitrate: 128,
            vbr_mode: VbrMode::Off,
            vbr_q: 4,
            abr_mean_kbps: 128,
            vbr_min_kbps: 32,
            vbr_max_kbps: 320,
            quality: 5,
            experimental_x: 0,
            experimental_y: false,
            experimental_z: false,
            noise_shaping: 1,
            noise_shaping_amp: 0,
            noise_shaping_stop: 0,
            sfb21_extra: true,
            copyright: false,
            original: true,
        }
    }
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samplerate(mut self, hz: u32) -> Self {
        self.samplerate = hz;
        self
    }

    pub fn mode(mut self, mode: ChannelMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = kbps;
        self
    }

    pub fn vbr(mut self, mode: VbrMode) -> Self {
        self.vbr_mode = mode;
        self
    }

    pub fn vbr_quality(mut self, q: u32) -> Self {
        self.vbr_q = q;
        self
    }

    pub fn abr_mean(mut self, kbps: u32) -> Self {
        self.abr_mean_kbps = kbps;
        self
    }

    pub fn quality(mut self, q: u32) -> Self {
        self.quality = q;
        self
    }

    /// MPEG version implied by the sample rate
    pub fn version(&self) -> MpegVersion {
        match self.samplerate {
            44100 | 48000 | 32000 => MpegVersion::Mpeg1,
            22050 | 24000 | 16000 => MpegVersion::Mpeg2,
            _ => MpegVersion::Mpeg25,
        }
    }

    pub fn channels(&self) -> usize {
        self.mode.channels()
    }

    /// Bitrate table for the configured version
    pub fn bitrate_table(&self) -> &'static [u32; 15] {
        if self.version().is_lsf() {
            &BITRATES_LSF
        } else {
            &BITRATES_MPEG1
        }
    }

    /// Index of `kbps` in the version's bitrate table
    pub fn bitrate_index_of(&self, kbps: u32) -> Option<usize> {
        self.bitrate_table().iter().position(|&b| b == kbps)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if samplerate_index(self.samplerate).is_none() {
            return Err(ConfigError::UnsupportedSampleRate(self.samplerate));
        }
        if self.bitrate_index_of(self.bitrate).map_or(true, |i| i == 0) {
            // index 0 is free format, which the rate control does not drive
            return Err(ConfigError::IncompatibleRateCombination {
                sample_rate: self.samplerate,
                bitrate: self.bitrate,
            });
        }
        if self.vbr_mode == VbrMode::Abr && self.bitrate_index_of(self.abr_mean_kbps).is_none() {
            return Err(ConfigError::UnsupportedBitrate(self.abr_mean_kbps));
        }
        if self.vbr_min_kbps > self.vbr_max_kbps {
            return Err(ConfigError::InvalidBitrateBounds {
                min: self.vbr_min_kbps,
                max: self.vbr_max_kbps,
            });
        }
        for (name, value, max) in [
            ("vbr_q", self.vbr_q, 9),
            ("quality", self.quality, 9),
            ("experimental_x", self.experimental_x, 8),
            ("noise_shaping", self.noise_shaping as u32, 2),
        ] {
            if value > max {
                return Err(ConfigError::ParameterOutOfRange {
                    name,
                    value: value as i32,
                    min: 0,
                    max: max as i32,
                });
            }
        }
        Ok(())
    }

    /// Masking threshold adjustment for the configured VBR quality.
    /// Lower vbr_q tightens the allowed noise below the psy threshold.
    pub fn masking_lower(&self) -> f64 {
        let db = (self.vbr_q as f64 - 4.0) * 1.5;
        10f64.powf(db / 10.0)
    }

    /// Region re-division after quantization is worth its cost except at
    /// the fastest settings.
    pub fn use_best_huffman(&self) -> bool {
        self.quality <= 7
    }
}
