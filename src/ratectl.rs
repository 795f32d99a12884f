//! Rate-control drivers: CBR, ABR and VBR
//!
//! Three concrete strategies over one contract: compute per-granule
//! target bits, run the outer loop for every granule-channel in order
//! (granule 0 before granule 1, left before right), and reconcile the
//! bit reservoir inline so each granule sees the post-predecessor state.

use crate::config::EncoderConfig;
use crate::quantize::{init_xrpow, outer_loop, GranuleWork, QuantizeCtx, SeedMemory};
use crate::reservoir::BitReservoir;
use crate::scalefac::scale_bitcount_any;
use crate::tables::{frame_bits, side_info_bytes};
use crate::types::{FrameInput, GranuleInfo, GranulePsy, Scalefac, Xmin, GRANULE_SIZE, MAX_PART23_BITS};
use log::debug;

/// Quantized output of one granule-channel
pub struct GranuleOut {
    pub info: GranuleInfo,
    pub scalefac: Scalefac,
    pub work: GranuleWork,
    /// Granule skipped as analog silence
    pub silent: bool,
}

impl GranuleOut {
    pub fn new() -> Self {
        Self {
            info: GranuleInfo::default(),
            scalefac: Scalefac::default(),
            work: GranuleWork::new(),
            silent: true,
        }
    }
}

impl Default for GranuleOut {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared mutable state the drivers operate on
pub struct DriverEnv<'a> {
    pub ctx: &'a QuantizeCtx,
    pub resv: &'a mut BitReservoir,
    pub seed: &'a mut SeedMemory,
    pub cfg: &'a EncoderConfig,
    pub granules: usize,
    pub channels: usize,
}

impl DriverEnv<'_> {
    /// Main-data bits of one whole frame at `kbps`, header and side info
    /// already deducted.
    pub fn data_bits_at(&self, kbps: u32) -> u32 {
        let lsf = self.ctx.lsf;
        frame_bits(lsf, kbps, self.cfg.samplerate, 0)
            - 32
            - 8 * side_info_bytes(lsf, self.channels) as u32
    }

    fn granule_channels(&self) -> u32 {
        (self.granules * self.channels) as u32
    }
}

/// Zero-energy shortcut: all-zero spectrum at the neutral gain, minimum
/// scalefactor cost.
fn encode_silent(env: &DriverEnv<'_>, psy: &GranulePsy, out: &mut GranuleOut) {
    out.info = GranuleInfo::reset_for(psy.block_type, psy.mixed_block, env.ctx.lsf);
    out.scalefac = Scalefac::default();
    out.silent = true;
    scale_bitcount_any(env.ctx.lsf, &mut out.info, &mut out.scalefac);
    out.info.part2_3_length = out.info.part2_length;
}

/// Quantize one granule-channel against `target_bits`; returns the best
/// candidate's over-threshold band count.
fn encode_one(
    env: &mut DriverEnv<'_>,
    psy: &GranulePsy,
    xmin: &Xmin,
    target_bits: u32,
    ch: usize,
    out: &mut GranuleOut,
) -> u32 {
    out.info = GranuleInfo::reset_for(psy.block_type, psy.mixed_block, env.ctx.lsf);
    out.scalefac = Scalefac::default();
    if !init_xrpow(&mut out.work, &psy.xr) {
        encode_silent(env, psy, out);
        return 0;
    }
    out.silent = false;
    outer_loop(
        env.ctx,
        &mut out.info,
        &mut out.scalefac,
        &mut out.work,
        psy,
        xmin,
        target_bits.min(MAX_PART23_BITS),
        env.seed,
        ch,
    )
}

/// pe-driven per-channel targets for one granule of a CBR frame
fn on_pe(env: &DriverEnv<'_>, input: &FrameInput, gr: usize, mean_bits_gr: u32) -> Vec<u32> {
    let channels = env.channels;
    let mean_gc = mean_bits_gr / channels as u32;
    let mut targ = Vec::with_capacity(channels);
    let mut max_total = 0u32;

    for ch in 0..channels {
        let pe = input.granules[gr][ch].pe;
        let max_gc = env.resv.max_granule_bits(pe, mean_gc);
        max_total += max_gc;
        let mut bits = mean_gc;
        if pe > 700.0 {
            let surge = (((pe - 750.0) / 1.4) as u32).min(mean_gc * 3 / 4);
            bits += surge;
        }
        targ.push(bits.min(max_gc).min(MAX_PART23_BITS));
    }

    let total: u32 = targ.iter().sum();
    if total > max_total && total > 0 {
        for t in targ.iter_mut() {
            *t = (*t as u64 * max_total as u64 / total as u64) as u32;
        }
    }
    targ
}

/// Shift bits from the side channel to the mid channel when the side
/// energy share is low.
fn reduce_side(targ: &mut [u32], ms_ener_ratio: f64) {
    if targ.len() < 2 {
        return;
    }
    let fac = (0.33 * (0.5 - ms_ener_ratio) / 0.5).clamp(0.0, 0.5);
    let moved = (fac * targ[1] as f64) as u32;
    targ[0] = (targ[0] + moved).min(MAX_PART23_BITS);
    targ[1] -= moved;
}

/// Constant bitrate: fixed frame budget, pe-steered distribution.
/// Returns the frame's bitrate index (fixed by configuration).
pub fn cbr_frame(env: &mut DriverEnv<'_>, input: &FrameInput, out: &mut [Vec<GranuleOut>]) -> usize {
    let mean_bits = env.data_bits_at(env.cfg.bitrate);
    env.resv.frame_begin(env.ctx.lsf, mean_bits);
    let mean_gr = mean_bits / env.granules as u32;
    let mean_gc = mean_bits / env.granule_channels();

    for gr in 0..env.granules {
        let mut targ = on_pe(env, input, gr, mean_gr);
        if input.ms_stereo {
            reduce_side(&mut targ, input.ms_ener_ratio[gr]);
        }
        for ch in 0..env.channels {
            let psy = &input.granules[gr][ch];
            let xmin = psy.xmin.clone();
            encode_one(env, psy, &xmin, targ[ch], ch, &mut out[gr][ch]);
            env.resv.adjust(mean_gc, out[gr][ch].info.part2_3_length);
        }
    }

    env.cfg
        .bitrate_index_of(env.cfg.bitrate)
        .expect("validated configuration")
}

/// Allowed bitrate index range of the configuration
fn index_bounds(env: &DriverEnv<'_>) -> (usize, usize) {
    let table = env.cfg.bitrate_table();
    let min_idx = table
        .iter()
        .position(|&b| b >= env.cfg.vbr_min_kbps && b > 0)
        .unwrap_or(1);
    let max_idx = table
        .iter()
        .rposition(|&b| b <= env.cfg.vbr_max_kbps && b > 0)
        .unwrap_or(14)
        .max(min_idx);
    (min_idx, max_idx)
}

/// Smallest bitrate index whose frame capacity plus the banked reservoir
/// covers `total` main-data bits.
fn pick_index(env: &DriverEnv<'_>, total: u32, min_idx: usize, max_idx: usize) -> usize {
    let table = env.cfg.bitrate_table();
    for idx in min_idx..=max_idx {
        let capacity = env.data_bits_at(table[idx]) + env.resv.size() as u32;
        if capacity >= total {
            return idx;
        }
    }
    max_idx
}

/// Average bitrate: per-granule targets around the requested mean,
/// encoded first, frame bitrate chosen afterwards.
pub fn abr_frame(env: &mut DriverEnv<'_>, input: &FrameInput, out: &mut [Vec<GranuleOut>]) -> usize {
    let (min_idx, max_idx) = index_bounds(env);
    let mean_bits = env.data_bits_at(env.abr_clamped_mean());
    let base_gc = mean_bits / env.granule_channels();

    // compression-ratio factor keeps easy material below the mean
    let cr = env.cfg.samplerate as f64 * 16.0 * env.channels as f64
        / (1e3 * env.cfg.abr_mean_kbps as f64);
    let res_factor = (0.93 + 0.07 * (11.0 - cr) / (11.0 - 5.5)).clamp(0.9, 1.0);

    let mut targ = vec![vec![0u32; env.channels]; env.granules];
    let mut total = 0u32;
    for gr in 0..env.granules {
        for ch in 0..env.channels {
            let pe = input.granules[gr][ch].pe;
            let mut bits = (res_factor * base_gc as f64) as u32;
            if pe > 700.0 {
                bits += (((pe - 750.0) / 1.4) as u32).min(base_gc * 3 / 4);
            }
            let bits = bits.min(MAX_PART23_BITS);
            targ[gr][ch] = bits;
            total += bits;
        }
    }

    // rescale an overload proportionally into the largest legal frame
    let frame_max = env.data_bits_at(env.cfg.bitrate_table()[max_idx]) + env.resv.size() as u32;
    if total > frame_max {
        debug!("abr targets {} exceed frame capacity {}, rescaling", total, frame_max);
        for row in targ.iter_mut() {
            for t in row.iter_mut() {
                *t = (*t as u64 * frame_max as u64 / total as u64) as u32;
            }
        }
    }

    for gr in 0..env.granules {
        for ch in 0..env.channels {
            let psy = &input.granules[gr][ch];
            let xmin = psy.xmin.clone();
            encode_one(env, psy, &xmin, targ[gr][ch], ch, &mut out[gr][ch]);
        }
    }

    let used: u32 = out
        .iter()
        .flatten()
        .map(|g| g.info.part2_3_length)
        .sum();
    let idx = pick_index(env, used, min_idx, max_idx);
    settle_reservoir(env, out, idx);
    idx
}

impl DriverEnv<'_> {
    fn abr_clamped_mean(&self) -> u32 {
        let table = self.cfg.bitrate_table();
        if table.contains(&self.cfg.abr_mean_kbps) {
            self.cfg.abr_mean_kbps
        } else {
            self.cfg.bitrate
        }
    }
}

/// Frame-begin plus per-granule adjust at the finally chosen bitrate
fn settle_reservoir(env: &mut DriverEnv<'_>, out: &[Vec<GranuleOut>], idx: usize) {
    let mean_bits = env.data_bits_at(env.cfg.bitrate_table()[idx]);
    env.resv.frame_begin(env.ctx.lsf, mean_bits);
    let mean_gc = mean_bits / env.granule_channels();
    for row in out.iter() {
        for g in row.iter() {
            env.resv.adjust(mean_gc, g.info.part2_3_length);
        }
    }
}

/// Binary search for the cheapest clean quantization of one granule.
/// Every probe restarts the outer loop from scratch; the last candidate
/// with no over-threshold band is restored on exit.
fn vbr_encode_granule(
    env: &mut DriverEnv<'_>,
    psy: &GranulePsy,
    xmin: &Xmin,
    min_bits: u32,
    max_bits: u32,
    ch: usize,
    out: &mut GranuleOut,
) {
    let mut lo = min_bits;
    let mut hi = max_bits;
    let mut best: Option<(GranuleInfo, Scalefac, Box<[i32; GRANULE_SIZE]>)> = None;

    loop {
        let this_bits = (lo + hi) / 2;
        let over = encode_one(env, psy, xmin, this_bits, ch, out);
        if out.silent {
            return;
        }
        if over == 0 {
            best = Some((out.info.clone(), out.scalefac.clone(), out.work.ix.clone()));
            hi = this_bits.saturating_sub(32).max(min_bits);
        } else {
            lo = (this_bits + 32).min(max_bits);
        }
        if hi <= lo || hi - lo <= 8 {
            break;
        }
    }

    if let Some((gi, sf, ix)) = best {
        out.info = gi;
        out.scalefac = sf;
        *out.work.ix = *ix;
    }
}

/// True variable bitrate: each granule binary-searches its cheapest clean
/// bit budget, then the frame takes the smallest bitrate index that
/// covers the sum, re-quantizing proportionally when even the largest
/// frame cannot.
pub fn vbr_frame(env: &mut DriverEnv<'_>, input: &FrameInput, out: &mut [Vec<GranuleOut>]) -> usize {
    let (min_idx, max_idx) = index_bounds(env);
    let masking_lower = env.cfg.masking_lower();
    let gc = env.granule_channels();
    let mean_min_gc = env.data_bits_at(env.cfg.bitrate_table()[min_idx]) / gc;
    let mean_max_gc = env.data_bits_at(env.cfg.bitrate_table()[max_idx]) / gc;

    // VBR_prepare: widen or tighten the allowed distortion per vbr_q
    let mut xmins: Vec<Vec<Xmin>> = Vec::with_capacity(env.granules);
    for gr in 0..env.granules {
        let mut row = Vec::with_capacity(env.channels);
        for ch in 0..env.channels {
            let mut xmin = input.granules[gr][ch].xmin.clone();
            for v in xmin.l.iter_mut() {
                *v *= masking_lower;
            }
            for ws in xmin.s.iter_mut() {
                for v in ws.iter_mut() {
                    *v *= masking_lower;
                }
            }
            row.push(xmin);
        }
        xmins.push(row);
    }

    for gr in 0..env.granules {
        for ch in 0..env.channels {
            let psy = &input.granules[gr][ch];
            let pe = psy.pe;

            let mut min_bits = 125u32.max(mean_min_gc);
            if pe > 700.0 {
                min_bits += (((pe - 750.0) / 1.4) as u32).min(mean_max_gc / 2);
            }
            if input.ms_stereo && ch == 1 {
                // the side channel rarely deserves its arithmetic share
                min_bits = min_bits * 3 / 4;
            }
            let max_bits = (mean_max_gc + env.resv.size() as u32 / gc).min(MAX_PART23_BITS);
            let min_bits = min_bits.min(max_bits.saturating_sub(32)).max(1);

            vbr_encode_granule(env, psy, &xmins[gr][ch], min_bits, max_bits, ch, &mut out[gr][ch]);
        }
    }

    let mut used: u32 = out.iter().flatten().map(|g| g.info.part2_3_length).sum();
    let mut idx = pick_index(env, used, min_idx, max_idx);

    let capacity = env.data_bits_at(env.cfg.bitrate_table()[idx]) + env.resv.size() as u32;
    if used > capacity {
        debug!("vbr frame needs {} bits, capacity {}; re-quantizing", used, capacity);
        for gr in 0..env.granules {
            for ch in 0..env.channels {
                let g = &mut out[gr][ch];
                if g.silent {
                    continue;
                }
                let reduced =
                    (g.info.part2_3_length as u64 * capacity as u64 / used as u64) as u32;
                let psy = &input.granules[gr][ch];
                encode_one(env, psy, &xmins[gr][ch], reduced.max(1), ch, g);
            }
        }
        used = out.iter().flatten().map(|g| g.info.part2_3_length).sum();
        idx = pick_index(env, used, min_idx, max_idx);
    }

    settle_reservoir(env, out, idx);
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_side_moves_bits_toward_mid() {
        let mut targ = vec![1000u32, 1000];
        reduce_side(&mut targ, 0.1); // quiet side channel
        assert!(targ[0] > 1000);
        assert!(targ[1] < 1000);
        assert_eq!(targ[0] + targ[1], 2000);

        let mut even = vec![1000u32, 1000];
        reduce_side(&mut even, 0.5); // balanced: nothing moves
        assert_eq!(even, vec![1000, 1000]);
    }
}
