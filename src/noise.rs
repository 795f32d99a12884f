//! Quantization noise measurement and candidate comparison
//!
//! `calc_noise` reconstructs each band through the side-info quantizer
//! parameters exactly as a decoder would and relates the residual energy
//! to the psy model's allowed distortion. The comparator decides whether
//! a fresh measurement beats the best candidate seen so far; its nine
//! modes reproduce historical tunings, slack constants included.

use crate::tables::{pow20, Bands, POW43, PRETAB};
use crate::types::{BlockType, Distort, GranuleInfo, Scalefac, Xmin, GRANULE_SIZE, SBMAX_S};

/// Aggregate noise metrics of one candidate quantization, dB-like units
#[derive(Debug, Clone, Copy)]
pub struct NoiseResult {
    /// Bands whose noise exceeds the masking threshold
    pub over_count: u32,
    /// Sum of the excess over those bands
    pub over_noise: f64,
    /// Sum over all bands
    pub tot_noise: f64,
    /// Worst single band
    pub max_noise: f64,
    /// Scalar for comparator mode 8
    pub klemm_noise: f64,
}

impl Default for NoiseResult {
    fn default() -> Self {
        Self {
            over_count: u32::MAX,
            over_noise: f64::MAX,
            tot_noise: f64::MAX,
            max_noise: f64::MAX,
            klemm_noise: f64::MAX,
        }
    }
}

fn band_noise(xr: &[f64], ix: &[i32], step: f64) -> f64 {
    xr.iter()
        .zip(ix.iter())
        .map(|(&x, &i)| {
            let r = x.abs() - POW43[(i as usize).min(crate::types::IXMAX_VAL as usize)] * step;
            r * r
        })
        .sum()
}

struct Accum {
    tolerate_top: bool,
    result: NoiseResult,
}

impl Accum {
    fn new(tolerate_top: bool) -> Self {
        Self {
            tolerate_top,
            result: NoiseResult {
                over_count: 0,
                over_noise: 0.0,
                tot_noise: 0.0,
                max_noise: -200.0,
                klemm_noise: 0.0,
            },
        }
    }

    fn push(&mut self, distort: f64, top_band: bool) {
        let db = 10.0 * distort.max(1e-20).log10();
        self.result.tot_noise += db;
        self.result.klemm_noise += distort.max(1e-20).sqrt();
        if top_band && self.tolerate_top {
            return;
        }
        if db > 0.0 {
            self.result.over_count += 1;
            self.result.over_noise += db;
        }
        if db > self.result.max_noise {
            self.result.max_noise = db;
        }
    }
}

/// Effective gain of a long band under the current side info
#[inline]
fn long_band_gain(gi: &GranuleInfo, sf: &Scalefac, sfb: usize) -> i32 {
    let pre = if gi.preflag { PRETAB[sfb] } else { 0 };
    gi.global_gain - ((sf.l[sfb] + pre) << (gi.scalefac_scale + 1))
}

/// Effective gain of one window of a short band
#[inline]
fn short_band_gain(gi: &GranuleInfo, sf: &Scalefac, sfb: usize, w: usize) -> i32 {
    gi.global_gain - (sf.s[sfb][w] << (gi.scalefac_scale + 1)) - 8 * gi.subblock_gain[w]
}

/// Measure per-band distortion of the quantized spectrum.
///
/// `tolerate_top` keeps the uppermost band (which carries no scalefactor)
/// out of the over-threshold statistics; distortion there can only be
/// bought back with global bits.
pub fn calc_noise(
    xr: &[f64; GRANULE_SIZE],
    ix: &[i32; GRANULE_SIZE],
    gi: &GranuleInfo,
    xmin: &Xmin,
    sf: &Scalefac,
    bands: &Bands,
    tolerate_top: bool,
) -> (Distort, NoiseResult) {
    let mut distort = Distort::default();
    let mut acc = Accum::new(tolerate_top);

    let nlong = if gi.block_type == BlockType::Short {
        gi.sfb_lmax
    } else {
        crate::types::SBMAX_L
    };
    for sfb in 0..nlong {
        let step = pow20(long_band_gain(gi, sf, sfb));
        let r = bands.long_range(sfb);
        let noise = band_noise(&xr[r.clone()], &ix[r], step);
        let d = noise / xmin.l[sfb].max(1e-37);
        distort.l[sfb] = d;
        acc.push(d, sfb == nlong - 1 && gi.block_type != BlockType::Short);
    }

    if gi.block_type == BlockType::Short {
        for sfb in gi.sfb_smin..SBMAX_S {
            for w in 0..3 {
                let step = pow20(short_band_gain(gi, sf, sfb, w));
                let r = bands.short_range(sfb, w);
                let noise = band_noise(&xr[r.clone()], &ix[r], step);
                let d = noise / xmin.s[sfb][w].max(1e-37);
                distort.s[sfb][w] = d;
                acc.push(d, sfb == SBMAX_S - 1);
            }
        }
    }

    (distort, acc.result)
}

/// Candidate comparison strategy; the mode comes straight from the
/// configuration (`experimental_x`).
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    mode: u32,
}

impl Comparator {
    pub fn new(mode: u32) -> Self {
        Self { mode }
    }

    /// True when `calc` should replace `best`.
    pub fn better(&self, calc: &NoiseResult, best: &NoiseResult) -> bool {
        match self.mode {
            1 => calc.max_noise < best.max_noise,
            2 => calc.tot_noise < best.tot_noise,
            3 => calc.tot_noise < best.tot_noise && calc.max_noise < best.max_noise,
            4 => {
                // biased max-noise bands with composite tie-breakers; the
                // slack constants are historical and load-bearing
                (calc.max_noise <= 0.0 && best.max_noise > 2.0)
                    || (calc.max_noise <= 0.0
                        && best.max_noise < 0.0
                        && best.max_noise > calc.max_noise - 2.0
                        && calc.tot_noise < best.tot_noise)
                    || (calc.max_noise <= 0.0
                        && best.max_noise > 0.0
                        && best.max_noise > calc.max_noise - 2.0
                        && calc.tot_noise < best.tot_noise + best.over_noise)
                    || (calc.max_noise > 0.0
                        && best.max_noise > -0.5
                        && best.max_noise > calc.max_noise - 1.0
                        && calc.tot_noise + calc.over_noise < best.tot_noise + best.over_noise)
                    || (calc.max_noise > 0.0
                        && best.max_noise > -1.0
                        && best.max_noise > calc.max_noise - 1.5
                        && calc.tot_noise + calc.over_noise + calc.over_noise
                            < best.tot_noise + best.over_noise + best.over_noise)
            }
            5 => {
                calc.over_noise < best.over_noise
                    || (calc.over_noise == best.over_noise && calc.tot_noise < best.tot_noise)
            }
            6 => {
                calc.over_noise < best.over_noise
                    || (calc.over_noise == best.over_noise
                        && (calc.max_noise < best.max_noise
                            || (calc.max_noise == best.max_noise
                                && calc.tot_noise <= best.tot_noise)))
            }
            7 => calc.over_count < best.over_count || calc.over_noise < best.over_noise,
            8 => calc.klemm_noise < best.klemm_noise,
            // lexicographic default
            _ => {
                calc.over_count < best.over_count
                    || (calc.over_count == best.over_count && calc.over_noise < best.over_noise)
                    || (calc.over_count == best.over_count
                        && calc.over_noise == best.over_noise
                        && calc.tot_noise < best.tot_noise)
            }
        }
    }
}
