//! The perceptual quantization loops
//!
//! The inner loop buys bits with global gain; the outer loop buys local
//! accuracy with scalefactors, escalating to scalefac_scale and subblock
//! gain when the scalefactor fields saturate. Every candidate the
//! comparator likes is snapshotted (side info, scalefactors and the
//! amplified 3/4-power spectrum together) and the best one is restored on
//! exit, whatever path the iteration took.

use crate::bitcount::count_bits;
use crate::noise::{calc_noise, Comparator, NoiseResult};
use crate::scalefac::scale_bitcount_any;
use crate::tables::{ipow20, Bands, PRETAB};
use crate::types::{
    BlockType, Distort, GranuleInfo, GranulePsy, Scalefac, GRANULE_SIZE, SBMAX_S, SBPSY_L, SBPSY_S,
};
use log::trace;

/// Shared, read-only knobs of the quantization loops
#[derive(Debug, Clone, Copy)]
pub struct QuantizeCtx {
    pub bands: Bands,
    pub lsf: bool,
    pub comparator: Comparator,
    /// 0 = single pass, 1 = amplification, 2 = + scalefac_scale/subblock
    pub noise_shaping: u8,
    /// amplify only the worst band per pass when nonzero
    pub noise_shaping_amp: u8,
    /// extra stale iterations tolerated before stopping
    pub noise_shaping_stop: u8,
    /// keep the top band out of the over statistics
    pub tolerate_top: bool,
    /// VBR early exit when the top band is distorted
    pub sfb21_stop: bool,
    /// more eager subblock-gain promotion
    pub experimental_z: bool,
    pub vbr_active: bool,
}

/// Mutable spectral working set of one granule-channel
pub struct GranuleWork {
    pub xrpow: Box<[f64; GRANULE_SIZE]>,
    pub ix: Box<[i32; GRANULE_SIZE]>,
}

impl GranuleWork {
    pub fn new() -> Self {
        Self {
            xrpow: Box::new([0.0; GRANULE_SIZE]),
            ix: Box::new([0i32; GRANULE_SIZE]),
        }
    }
}

impl Default for GranuleWork {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary-search step memory, per channel, carried across granules
#[derive(Debug, Clone)]
pub struct SeedMemory {
    pub old_value: [i32; 2],
    pub current_step: [i32; 2],
}

impl Default for SeedMemory {
    fn default() -> Self {
        Self {
            old_value: [210; 2],
            current_step: [4; 2],
        }
    }
}

/// Fill the 3/4-power spectrum from fresh MDCT output. Returns false for
/// a granule with no usable energy.
pub fn init_xrpow(work: &mut GranuleWork, xr: &[f64; GRANULE_SIZE]) -> bool {
    let mut sum = 0.0;
    for (p, &x) in work.xrpow.iter_mut().zip(xr.iter()) {
        let v = x.abs().powf(0.75);
        *p = v;
        sum += v;
    }
    work.ix.fill(0);
    sum > 1e-20
}

/// Seed the global gain by an adaptive walk: step 4 or 2 from the prior
/// granule's result, halving on every direction reversal, done when the
/// step reaches one. The final gain roughly straddles `target_bits`.
fn bin_search_step_size(
    gi: &mut GranuleInfo,
    work: &mut GranuleWork,
    target_bits: u32,
    seed: &mut SeedMemory,
    ch: usize,
    bands: &Bands,
) -> u32 {
    const GONE_OVER: u8 = 1;
    const GONE_UNDER: u8 = 2;

    let start = seed.old_value[ch];
    let mut step = seed.current_step[ch];
    let mut flags = 0u8;
    gi.global_gain = start.clamp(0, 255);

    let mut bits;
    loop {
        bits = count_bits(gi, &work.xrpow, &mut work.ix, bands);
        if step == 1 || bits == target_bits {
            break;
        }
        if bits > target_bits {
            if flags & GONE_UNDER != 0 {
                step /= 2;
            }
            flags |= GONE_OVER;
            if gi.global_gain == 255 {
                break;
            }
            gi.global_gain = (gi.global_gain + step).min(255);
        } else {
            if flags & GONE_OVER != 0 {
                step /= 2;
            }
            flags |= GONE_UNDER;
            if gi.global_gain == 0 {
                break;
            }
            gi.global_gain = (gi.global_gain - step).max(0);
        }
        step = step.max(1);
    }

    seed.current_step[ch] = if (start - gi.global_gain).abs() >= 4 { 4 } else { 2 };
    seed.old_value[ch] = gi.global_gain;
    bits
}

/// Raise the global gain until the granule fits `huff_bits`. Never lowers
/// it; scalefactors are frozen for the duration of the call.
pub fn inner_loop(
    gi: &mut GranuleInfo,
    work: &mut GranuleWork,
    huff_bits: u32,
    bands: &Bands,
) -> u32 {
    let mut bits = count_bits(gi, &work.xrpow, &mut work.ix, bands);
    while bits > huff_bits && gi.global_gain < 255 {
        gi.global_gain += 1;
        bits = count_bits(gi, &work.xrpow, &mut work.ix, bands);
    }
    bits
}

/// Amplify one scalefactor step: the xrpow factor is step^(3/4) with
/// step = 2^(0.5) or 2^(1.0) depending on scalefac_scale.
#[inline]
fn amp_factor(scalefac_scale: u8) -> f64 {
    if scalefac_scale == 0 {
        2f64.powf(0.75 * 0.5)
    } else {
        2f64.powf(0.75)
    }
}

struct AmpOutcome {
    amplified: u32,
    eligible: u32,
}

/// Raise scalefactors of the bands whose distortion exceeds the
/// threshold, keeping xrpow consistent bin by bin.
fn amp_scalefac_bands(
    gi: &GranuleInfo,
    sf: &mut Scalefac,
    work: &mut GranuleWork,
    distort: &Distort,
    only_worst: bool,
    bands: &Bands,
) -> AmpOutcome {
    let factor = amp_factor(gi.scalefac_scale);

    let nlong = gi.sfb_lmax.min(SBPSY_L);
    let mut max_distort = 0.0f64;
    for sfb in 0..nlong {
        max_distort = max_distort.max(distort.l[sfb]);
    }
    if gi.block_type == BlockType::Short {
        for sfb in gi.sfb_smin..SBPSY_S {
            for w in 0..3 {
                max_distort = max_distort.max(distort.s[sfb][w]);
            }
        }
    }
    let threshold = 1.0f64.min(0.95 * max_distort);

    let mut out = AmpOutcome {
        amplified: 0,
        eligible: 0,
    };

    if only_worst {
        let mut worst_long: Option<(usize, f64)> = None;
        for sfb in 0..nlong {
            out.eligible += 1;
            if distort.l[sfb] > threshold
                && worst_long.map_or(true, |(_, d)| distort.l[sfb] > d)
            {
                worst_long = Some((sfb, distort.l[sfb]));
            }
        }
        if let Some((sfb, _)) = worst_long {
            sf.l[sfb] += 1;
            for i in bands.long_range(sfb) {
                work.xrpow[i] *= factor;
            }
            out.amplified += 1;
        }
        if gi.block_type == BlockType::Short {
            let mut worst_short: Option<(usize, usize, f64)> = None;
            for sfb in gi.sfb_smin..SBPSY_S {
                for w in 0..3 {
                    out.eligible += 1;
                    if distort.s[sfb][w] > threshold
                        && worst_short.map_or(true, |(_, _, d)| distort.s[sfb][w] > d)
                    {
                        worst_short = Some((sfb, w, distort.s[sfb][w]));
                    }
                }
            }
            if let Some((sfb, w, _)) = worst_short {
                sf.s[sfb][w] += 1;
                for i in bands.short_range(sfb, w) {
                    work.xrpow[i] *= factor;
                }
                out.amplified += 1;
            }
        }
        return out;
    }

    for sfb in 0..nlong {
        out.eligible += 1;
        if distort.l[sfb] > threshold {
            sf.l[sfb] += 1;
            for i in bands.long_range(sfb) {
                work.xrpow[i] *= factor;
            }
            out.amplified += 1;
        }
    }
    if gi.block_type == BlockType::Short {
        for sfb in gi.sfb_smin..SBPSY_S {
            for w in 0..3 {
                out.eligible += 1;
                if distort.s[sfb][w] > threshold {
                    sf.s[sfb][w] += 1;
                    for i in bands.short_range(sfb, w) {
                        work.xrpow[i] *= factor;
                    }
                    out.amplified += 1;
                }
            }
        }
    }
    out
}

/// Flip scalefac_scale from 0 to 1, halving every scalefactor. Odd values
/// round up, which amplifies the affected band by one extra half-step;
/// the parity fixup multiplies xrpow accordingly. Clears preflag.
fn inc_scalefac_scale(gi: &mut GranuleInfo, sf: &mut Scalefac, work: &mut GranuleWork, bands: &Bands) {
    let fixup = 2f64.powf(0.75 * 0.5);

    for sfb in 0..gi.sfb_lmax {
        let mut s = sf.l[sfb] + if gi.preflag { PRETAB[sfb] } else { 0 };
        if s & 1 != 0 {
            s += 1;
            for i in bands.long_range(sfb) {
                work.xrpow[i] *= fixup;
            }
        }
        sf.l[sfb] = s >> 1;
    }
    if gi.block_type == BlockType::Short {
        for sfb in gi.sfb_smin..SBMAX_S {
            for w in 0..3 {
                let mut s = sf.s[sfb][w];
                if s & 1 != 0 {
                    s += 1;
                    for i in bands.short_range(sfb, w) {
                        work.xrpow[i] *= fixup;
                    }
                }
                sf.s[sfb][w] = s >> 1;
            }
        }
    }
    gi.preflag = false;
    gi.scalefac_scale = 1;
}

/// Trade one step of subblock gain against `4 >> scalefac_scale` of every
/// scalefactor of the saturated window. Scalefactors that would go
/// negative are clamped to zero and the residual gain difference is
/// pushed into xrpow through the quarter-power-of-two table. Returns
/// false when a window is already at the gain cap of 7.
fn inc_subblock_gain(
    gi: &mut GranuleInfo,
    sf: &mut Scalefac,
    work: &mut GranuleWork,
    bands: &Bands,
    eager: bool,
) -> bool {
    debug_assert_eq!(gi.block_type, BlockType::Short);
    let (cap1, cap2) = if eager { (8, 4) } else { (16, 8) };

    for w in 0..3 {
        let mut s1 = 0;
        let mut s2 = 0;
        for sfb in gi.sfb_smin..SBPSY_S {
            if sfb < 6 {
                s1 = s1.max(sf.s[sfb][w]);
            } else {
                s2 = s2.max(sf.s[sfb][w]);
            }
        }
        if s1 < cap1 && s2 < cap2 {
            continue;
        }
        if gi.subblock_gain[w] >= 7 {
            return false;
        }
        gi.subblock_gain[w] += 1;

        let amount = 4 >> gi.scalefac_scale;
        for sfb in gi.sfb_smin..SBMAX_S {
            let s = sf.s[sfb][w] - amount;
            if s >= 0 {
                sf.s[sfb][w] = s;
            } else {
                sf.s[sfb][w] = 0;
                // the recorded attenuation outgrew the applied one
                let gain_up = (-s) << (gi.scalefac_scale + 1);
                let factor = ipow20(210 - gain_up);
                for i in bands.short_range(sfb, w) {
                    work.xrpow[i] *= factor;
                }
            }
        }
    }
    true
}

/// One amplification round plus whatever escalation it takes to keep the
/// scalefactors encodable. Returns false when the iteration has nothing
/// further to trade.
fn balance_noise(
    ctx: &QuantizeCtx,
    gi: &mut GranuleInfo,
    sf: &mut Scalefac,
    work: &mut GranuleWork,
    distort: &Distort,
) -> bool {
    let only_worst = ctx.noise_shaping_amp > 0 && !ctx.vbr_active;
    let outcome = amp_scalefac_bands(gi, sf, work, distort, only_worst, &ctx.bands);
    if outcome.amplified == 0 || outcome.amplified == outcome.eligible {
        return false;
    }

    if scale_bitcount_any(ctx.lsf, gi, sf) {
        return true;
    }
    if ctx.noise_shaping < 2 {
        return false;
    }

    if gi.scalefac_scale == 0 {
        inc_scalefac_scale(gi, sf, work, &ctx.bands);
    } else if gi.block_type == BlockType::Short {
        if !inc_subblock_gain(gi, sf, work, &ctx.bands, ctx.experimental_z) {
            return false;
        }
    } else {
        return false;
    }

    scale_bitcount_any(ctx.lsf, gi, sf)
}

struct Snapshot {
    gi: GranuleInfo,
    sf: Scalefac,
    xrpow: Box<[f64; GRANULE_SIZE]>,
    noise: NoiseResult,
}

/// The outer noise-shaping loop. On return the granule state holds the
/// best candidate seen: side info complete, `part2_3_length` final, and
/// `work.ix` re-quantized to match. Returns the candidate's count of
/// over-threshold bands.
#[allow(clippy::too_many_arguments)]
pub fn outer_loop(
    ctx: &QuantizeCtx,
    gi: &mut GranuleInfo,
    sf: &mut Scalefac,
    work: &mut GranuleWork,
    psy: &GranulePsy,
    xmin: &crate::types::Xmin,
    target_bits: u32,
    seed: &mut SeedMemory,
    ch: usize,
) -> u32 {
    bin_search_step_size(gi, work, target_bits, seed, ch, &ctx.bands);

    if !scale_bitcount_any(ctx.lsf, gi, sf) {
        // freshly zeroed scalefactors always fit; keep going regardless
        gi.part2_length = 0;
    }

    let mut best: Option<Snapshot> = None;
    let mut age = 0u32;
    let mut iteration = 0u32;

    loop {
        iteration += 1;
        let huff_bits = match (target_bits as i32 - gi.part2_length as i32).try_into() {
            Ok(v) => v,
            Err(_) => break,
        };

        let real_bits = inner_loop(gi, work, huff_bits, &ctx.bands);
        gi.part2_3_length = real_bits + gi.part2_length;

        let (distort, noise) = calc_noise(
            &psy.xr,
            &work.ix,
            gi,
            xmin,
            sf,
            &ctx.bands,
            ctx.tolerate_top,
        );

        if ctx.noise_shaping == 0 {
            best = Some(Snapshot {
                gi: gi.clone(),
                sf: sf.clone(),
                xrpow: work.xrpow.clone(),
                noise,
            });
            break;
        }

        let improved = match &best {
            None => true,
            Some(s) => ctx.comparator.better(&noise, &s.noise),
        };
        if improved {
            best = Some(Snapshot {
                gi: gi.clone(),
                sf: sf.clone(),
                xrpow: work.xrpow.clone(),
                noise,
            });
            age = 0;
        } else {
            age += 1;
        }

        let best_noise = &best.as_ref().unwrap().noise;
        let stale_limit = 3 + ctx.noise_shaping_stop as u32;
        if best_noise.over_count == 0 && age >= stale_limit {
            break;
        }
        if iteration > 7 && noise.over_count == 0 {
            break;
        }
        if ctx.vbr_active && ctx.sfb21_stop {
            let top_distorted = if gi.block_type == BlockType::Short {
                (0..3).any(|w| distort.s[SBMAX_S - 1][w] > 1.0)
            } else {
                distort.l[crate::types::SBMAX_L - 1] > 1.0
            };
            if top_distorted {
                trace!("outer loop: top band distorted, leaving bits to the driver");
                break;
            }
        }

        if !balance_noise(ctx, gi, sf, work, &distort) {
            break;
        }
    }

    let snap = best.unwrap_or_else(|| Snapshot {
        gi: gi.clone(),
        sf: sf.clone(),
        xrpow: work.xrpow.clone(),
        noise: NoiseResult::default(),
    });
    *gi = snap.gi;
    *sf = snap.sf;
    *work.xrpow = *snap.xrpow;

    // re-derive the quantized spectrum and region state of the winner
    let huff = count_bits(gi, &work.xrpow, &mut work.ix, &ctx.bands);
    gi.part2_3_length = huff + gi.part2_length;
    snap.noise.over_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::bands;
    use crate::types::Xmin;

    fn ctx() -> QuantizeCtx {
        QuantizeCtx {
            bands: bands(0),
            lsf: false,
            comparator: Comparator::new(0),
            noise_shaping: 1,
            noise_shaping_amp: 0,
            noise_shaping_stop: 0,
            tolerate_top: true,
            sfb21_stop: false,
            experimental_z: false,
            vbr_active: false,
        }
    }

    fn tone_psy() -> GranulePsy {
        let mut xr = Box::new([0.0f64; GRANULE_SIZE]);
        for i in 0..40 {
            xr[i] = if i % 2 == 0 { 1.0 } else { -1.0 } * 30.0 / (1.0 + i as f64);
        }
        let mut xmin = Xmin::default();
        for v in xmin.l.iter_mut() {
            *v = 1e-4;
        }
        GranulePsy {
            xr,
            xmin,
            pe: 400.0,
            block_type: BlockType::Norm,
            mixed_block: false,
        }
    }

    #[test]
    fn inner_loop_meets_its_budget() {
        let psy = tone_psy();
        let mut work = GranuleWork::new();
        assert!(init_xrpow(&mut work, &psy.xr));
        let b = bands(0);
        let mut gi = GranuleInfo {
            global_gain: 140,
            ..Default::default()
        };
        let bits = inner_loop(&mut gi, &mut work, 400, &b);
        assert!(bits <= 400);
        // and it never lowered the gain below the start
        assert!(gi.global_gain >= 140);
    }

    #[test]
    fn outer_loop_respects_target() {
        let ctx = ctx();
        let psy = tone_psy();
        let xmin = psy.xmin.clone();
        let mut work = GranuleWork::new();
        assert!(init_xrpow(&mut work, &psy.xr));
        let mut gi = GranuleInfo::reset_for(BlockType::Norm, false, false);
        let mut sf = Scalefac::default();
        let mut seed = SeedMemory::default();

        let target = 800;
        outer_loop(&ctx, &mut gi, &mut sf, &mut work, &psy, &xmin, target, &mut seed, 0);
        assert!(gi.part2_3_length <= target || gi.global_gain == 255);
        assert!(gi.global_gain <= 255);
        assert!(gi.part2_3_length >= gi.part2_length);
    }

    #[test]
    fn amplification_keeps_xrpow_consistent() {
        let ctx = ctx();
        let psy = tone_psy();
        let mut work = GranuleWork::new();
        init_xrpow(&mut work, &psy.xr);
        let reference = work.xrpow.clone();

        let gi = GranuleInfo::reset_for(BlockType::Norm, false, false);
        let mut sf = Scalefac::default();
        let mut distort = Distort::default();
        distort.l[2] = 2.0; // only band 2 is over
        let out = amp_scalefac_bands(&gi, &mut sf, &mut work, &distort, false, &ctx.bands);
        assert_eq!(out.amplified, 1);
        assert_eq!(sf.l[2], 1);

        let factor = amp_factor(0);
        for (i, (&now, &before)) in work.xrpow.iter().zip(reference.iter()).enumerate() {
            let expect = if ctx.bands.long_range(2).contains(&i) {
                before * factor
            } else {
                before
            };
            assert!((now - expect).abs() <= 1e-12 * expect.abs().max(1.0), "bin {}", i);
        }
    }

    #[test]
    fn scalefac_scale_promotion_halves_factors() {
        let ctx = ctx();
        let psy = tone_psy();
        let mut work = GranuleWork::new();
        init_xrpow(&mut work, &psy.xr);

        let mut gi = GranuleInfo::reset_for(BlockType::Norm, false, false);
        let mut sf = Scalefac::default();
        sf.l[0] = 5;
        sf.l[1] = 4;
        inc_scalefac_scale(&mut gi, &mut sf, &mut work, &ctx.bands);
        assert_eq!(gi.scalefac_scale, 1);
        assert!(!gi.preflag);
        assert_eq!(sf.l[0], 3); // odd: rounded up
        assert_eq!(sf.l[1], 2);
    }

    #[test]
    fn subblock_gain_caps_at_seven() {
        let ctx = ctx();
        let mut work = GranuleWork::new();
        let psy = GranulePsy::silent(BlockType::Short);
        init_xrpow(&mut work, &psy.xr);

        let mut gi = GranuleInfo::reset_for(BlockType::Short, false, false);
        gi.subblock_gain = [7, 0, 0];
        let mut sf = Scalefac::default();
        sf.s[0][0] = 16; // saturated window 0
        assert!(!inc_subblock_gain(&mut gi, &mut sf, &mut work, &ctx.bands, false));

        gi.subblock_gain = [0, 0, 0];
        assert!(inc_subblock_gain(&mut gi, &mut sf, &mut work, &ctx.bands, false));
        assert_eq!(gi.subblock_gain[0], 1);
        assert_eq!(sf.s[0][0], 12); // reduced by 4 >> scalefac_scale
        assert_eq!(sf.s[1][0], 0); // clamped, not negative
    }

    #[test]
    fn zero_energy_granule_short_circuits() {
        let mut work = GranuleWork::new();
        let xr = [0.0f64; GRANULE_SIZE];
        assert!(!init_xrpow(&mut work, &xr));
        assert!(work.ix.iter().all(|&v| v == 0));
    }
}
