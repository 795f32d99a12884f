//! Static tables for Layer III quantization
//!
//! MPEG-1 Table B.8 and MPEG-2 Table B.1 scalefactor band boundaries, the
//! pre-emphasis table, scalefactor length packing tables, the big-value
//! region subdivision table, and the runtime-computed power tables used by
//! the quantizer. All of it is immutable after initialization and is the
//! single source of truth for any iteration over bands.

use crate::types::{SBMAX_L, SBMAX_S};
use lazy_static::lazy_static;

/// Valid samplerates, grouped by MPEG version
pub const SAMPLERATES: [u32; 9] = [
    44100, 48000, 32000, // MPEG-1
    22050, 24000, 16000, // MPEG-2
    11025, 12000, 8000, // MPEG-2.5
];

/// kbps per bitrate index, MPEG-1 (index 0 = free format, unsupported)
pub const BITRATES_MPEG1: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// kbps per bitrate index, MPEG-2 and MPEG-2.5
pub const BITRATES_LSF: [u32; 15] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

/// Scalefactor band boundaries over the 576 MDCT bins, long blocks
pub const SFB_LONG: [[usize; SBMAX_L + 1]; 9] = [
    // 44.1 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 52, 62, 74, 90, 110, 134, 162, 196, 238, 288, 342,
        418, 576,
    ],
    // 48 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 42, 50, 60, 72, 88, 106, 128, 156, 190, 230, 276, 330,
        384, 576,
    ],
    // 32 kHz
    [
        0, 4, 8, 12, 16, 20, 24, 30, 36, 44, 54, 66, 82, 102, 126, 156, 194, 240, 296, 364, 448,
        550, 576,
    ],
    // 22.05 kHz
    [
        0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396, 464,
        522, 576,
    ],
    // 24 kHz
    [
        0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 114, 136, 162, 194, 232, 278, 332, 394, 464,
        540, 576,
    ],
    // 16 kHz
    [
        0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396, 464,
        522, 576,
    ],
    // 11.025 kHz
    [
        0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 116, 140, 168, 200, 238, 284, 336, 396, 464,
        522, 576,
    ],
    // 12 kHz
    [
        0, 6, 12, 18, 24, 30, 36, 44, 54, 66, 80, 96, 114, 136, 162, 194, 232, 278, 332, 394, 464,
        540, 576,
    ],
    // 8 kHz
    [
        0, 12, 24, 36, 48, 60, 72, 88, 108, 132, 160, 192, 232, 280, 336, 400, 476, 566, 568, 570,
        572, 574, 576,
    ],
];

/// Scalefactor band boundaries per 192-bin window, short blocks
pub const SFB_SHORT: [[usize; SBMAX_S + 1]; 9] = [
    [0, 4, 8, 12, 16, 22, 30, 40, 52, 66, 84, 106, 136, 192],
    [0, 4, 8, 12, 16, 22, 28, 38, 50, 64, 80, 100, 126, 192],
    [0, 4, 8, 12, 16, 22, 30, 42, 58, 78, 104, 138, 180, 192],
    [0, 4, 8, 12, 18, 24, 32, 42, 56, 74, 100, 132, 174, 192],
    [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 136, 180, 192],
    [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 134, 174, 192],
    [0, 4, 8, 12, 18, 24, 32, 42, 56, 74, 100, 132, 174, 192],
    [0, 4, 8, 12, 18, 26, 36, 48, 62, 80, 104, 136, 180, 192],
    [0, 8, 16, 24, 36, 52, 72, 96, 124, 160, 162, 164, 166, 192],
];

/// Pre-emphasis added to upper long-block scalefactors when preflag is set
pub const PRETAB: [i32; SBMAX_L] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 3, 2, 0,
];

/// scalefac_compress -> (slen1, slen2), MPEG-1 scheme
pub const SLEN1_TAB: [u32; 16] = [0, 0, 0, 0, 3, 1, 1, 1, 2, 2, 2, 3, 3, 3, 4, 4];
pub const SLEN2_TAB: [u32; 16] = [0, 1, 2, 3, 0, 1, 2, 3, 1, 2, 3, 1, 2, 3, 2, 3];

/// scfsi partition of the long scalefactor bands, 2.4.2.7 of the IS
pub const SCFSI_BAND_LONG: [usize; 5] = [0, 6, 11, 16, 21];

/// (region0_count, region1_count) by number of scalefactor bands covered
/// by the big-value region
pub const SUBDV_TABLE: [(u32, u32); 23] = [
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 0),
    (0, 1),
    (1, 1),
    (1, 1),
    (1, 2),
    (2, 2),
    (2, 3),
    (2, 3),
    (3, 4),
    (3, 4),
    (3, 4),
    (4, 5),
    (4, 5),
    (4, 6),
    (5, 6),
    (5, 6),
    (5, 7),
    (6, 7),
    (6, 7),
];

/// Scalefactor partition widths for the MPEG-2/2.5 scheme, indexed by
/// [partition table][long/short/mixed][partition]
pub const NR_OF_SFB_BLOCK: [[[u32; 4]; 3]; 6] = [
    [[6, 5, 5, 5], [9, 9, 9, 9], [6, 9, 9, 9]],
    [[6, 5, 7, 3], [9, 9, 12, 6], [6, 9, 12, 6]],
    [[11, 10, 0, 0], [18, 18, 0, 0], [15, 18, 0, 0]],
    [[7, 7, 7, 0], [12, 12, 12, 0], [6, 15, 12, 0]],
    [[6, 6, 6, 3], [12, 9, 9, 6], [6, 12, 9, 6]],
    [[8, 8, 5, 0], [15, 12, 9, 0], [6, 18, 9, 0]],
];

/// Lowest gain index the per-band effective gain can reach: a scalefactor
/// of 15+3 shifted by 2 plus a subblock gain of 7 windows subtracts 128.
pub const GAIN_OFFSET: i32 = 128;

/// ISO rounding constant for the 3/4-power quantizer (0.5 - 0.0946)
pub const QUANT_ROUND: f64 = 0.4054;

lazy_static! {
    /// 2^(-0.1875 * (x - 210)) for x in [-GAIN_OFFSET, 256): multiplying
    /// xrpow by this quantizes at gain index x.
    pub static ref IPOW20: Vec<f64> = (-GAIN_OFFSET..256)
        .map(|x| 2f64.powf(-0.1875 * (x - 210) as f64))
        .collect();

    /// 2^(0.25 * (x - 210)) for x in [-GAIN_OFFSET, 256): the dequantizer
    /// step at gain index x.
    pub static ref POW20: Vec<f64> = (-GAIN_OFFSET..256)
        .map(|x| 2f64.powf(0.25 * (x - 210) as f64))
        .collect();

    /// i^(4/3) for every representable quantized magnitude
    pub static ref POW43: Vec<f64> = (0..=crate::types::IXMAX_VAL as usize)
        .map(|i| (i as f64).powf(4.0 / 3.0))
        .collect();
}

/// Scalefactor band boundaries for one sample rate
#[derive(Debug, Clone, Copy)]
pub struct Bands {
    pub l: &'static [usize; SBMAX_L + 1],
    pub s: &'static [usize; SBMAX_S + 1],
}

impl Bands {
    /// Bin range of a long band
    #[inline]
    pub fn long_range(&self, sfb: usize) -> std::ops::Range<usize> {
        self.l[sfb]..self.l[sfb + 1]
    }

    /// Bin range of one window of a short band in the band-major layout
    #[inline]
    pub fn short_range(&self, sfb: usize, window: usize) -> std::ops::Range<usize> {
        let width = self.s[sfb + 1] - self.s[sfb];
        let start = 3 * self.s[sfb] + window * width;
        start..start + width
    }
}

/// Band geometry for a samplerate index
pub fn bands(samplerate_idx: usize) -> Bands {
    Bands {
        l: &SFB_LONG[samplerate_idx],
        s: &SFB_SHORT[samplerate_idx],
    }
}

/// Quantizer multiplier at gain index `x`
#[inline]
pub fn ipow20(x: i32) -> f64 {
    IPOW20[(x + GAIN_OFFSET) as usize]
}

/// Dequantizer step at gain index `x`
#[inline]
pub fn pow20(x: i32) -> f64 {
    POW20[(x + GAIN_OFFSET) as usize]
}

/// Index into the per-samplerate tables
pub fn samplerate_index(samplerate: u32) -> Option<usize> {
    SAMPLERATES.iter().position(|&sr| sr == samplerate)
}

/// Bits in one frame at the given rate, excluding nothing (header included)
pub fn frame_bits(lsf: bool, bitrate_kbps: u32, samplerate: u32, padding: u32) -> u32 {
    let per_frame = if lsf { 72_000 } else { 144_000 };
    (per_frame * bitrate_kbps / samplerate + padding) * 8
}

/// Side info length in bytes for the version and channel count
pub fn side_info_bytes(lsf: bool, channels: usize) -> usize {
    match (lsf, channels) {
        (false, 1) => 17,
        (false, _) => 32,
        (true, 1) => 9,
        (true, _) => 17,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_tables_cover_the_granule() {
        for t in &SFB_LONG {
            assert_eq!(t[0], 0);
            assert_eq!(t[SBMAX_L], 576);
            assert!(t.windows(2).all(|w| w[0] < w[1]));
        }
        for t in &SFB_SHORT {
            assert_eq!(t[0], 0);
            assert_eq!(t[SBMAX_S], 192);
            assert!(t.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn mixed_block_split_is_aligned() {
        // The long bands below sfb_lmax and the short bands from sfb_smin
        // must tile the spectrum without a gap.
        for (i, _) in SAMPLERATES.iter().enumerate() {
            let lmax = if i < 3 { 8 } else { 6 };
            if i == 8 {
                // 8 kHz long bands are twice as wide; the mixed split
                // lands mid-band and mixed blocks are not used there.
                continue;
            }
            assert_eq!(SFB_LONG[i][lmax], 3 * SFB_SHORT[i][3]);
        }
    }

    #[test]
    fn power_tables_invert_each_other() {
        for &gain in &[-100, 0, 140, 210, 255] {
            let step = pow20(gain);
            let inv = ipow20(gain);
            // ipow20 is the 3/4 power of the inverse step
            let expect = (1.0 / step).powf(0.75);
            assert!(((inv - expect) / expect).abs() < 1e-9);
        }
        assert!((POW43[8] - 16.0).abs() < 1e-9);
        assert_eq!(POW43[0], 0.0);
    }

    #[test]
    fn frame_geometry() {
        // 44.1 kHz 128 kbps MPEG-1: 417 bytes without padding
        assert_eq!(frame_bits(false, 128, 44100, 0), 417 * 8);
        assert_eq!(frame_bits(false, 128, 44100, 1), 418 * 8);
        // MPEG-2 64 kbps 22.05 kHz: 208 bytes
        assert_eq!(frame_bits(true, 64, 22050, 0), 208 * 8);
        assert_eq!(side_info_bytes(false, 2), 32);
        assert_eq!(side_info_bytes(true, 1), 9);
    }
}
