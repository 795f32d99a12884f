//! Shared helpers for the integration tests
#![allow(dead_code)]

use quaver_mp3::types::{GranulePsy, Xmin};
use quaver_mp3::{BlockType, FrameInput, GRANULE_SIZE};

/// Deterministic xorshift64* generator so the tests need no external RNG
pub struct Rng(pub u64);

impl Rng {
    pub fn next_u32(&mut self) -> u32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 32) as u32
    }

    /// Uniform in [0, 1]
    pub fn uniform(&mut self) -> f64 {
        self.next_u32() as f64 / u32::MAX as f64
    }
}

/// Band-limited noise with a gentle spectral rolloff
pub fn noisy_xr(rng: &mut Rng, amp: f64) -> Box<[f64; GRANULE_SIZE]> {
    let mut xr = Box::new([0.0f64; GRANULE_SIZE]);
    for (i, v) in xr.iter_mut().enumerate() {
        *v = (rng.uniform() * 2.0 - 1.0) * amp / (1.0 + (i as f64 / 80.0).powi(2));
    }
    xr
}

/// Alternating-sign energy confined to one scalefactor band (44.1 kHz
/// long band `sfb`)
pub fn band_tone(sfb: usize, amp: f64) -> Box<[f64; GRANULE_SIZE]> {
    let bands = quaver_mp3::tables::bands(0);
    let mut xr = Box::new([0.0f64; GRANULE_SIZE]);
    for (k, i) in bands.long_range(sfb).enumerate() {
        xr[i] = if k % 2 == 0 { amp } else { -amp };
    }
    xr
}

pub fn flat_xmin(value: f64) -> Xmin {
    let mut xmin = Xmin::default();
    for v in xmin.l.iter_mut() {
        *v = value;
    }
    for ws in xmin.s.iter_mut() {
        for v in ws.iter_mut() {
            *v = value;
        }
    }
    xmin
}

pub fn psy(xr: Box<[f64; GRANULE_SIZE]>, xmin_value: f64, pe: f64) -> GranulePsy {
    GranulePsy {
        xr,
        xmin: flat_xmin(xmin_value),
        pe,
        block_type: BlockType::Norm,
        mixed_block: false,
    }
}

pub fn frame_input(granules: Vec<Vec<GranulePsy>>) -> FrameInput {
    FrameInput {
        granules,
        ms_ener_ratio: [0.5; 2],
        ms_stereo: false,
    }
}
