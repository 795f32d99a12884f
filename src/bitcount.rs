//! Huffman bit counting for candidate quantizations
//!
//! `count_bits` is the cost function of the whole rate-control stack: it
//! quantizes the (already scalefactor-amplified) 3/4-power spectrum at the
//! current global gain, partitions the result into the big-value, count1
//! and zero regions, selects codebooks, and reports the exact number of
//! bits the granule would occupy. It never mutates `xrpow` or the
//! scalefactors; everything it derives lands in the `GranuleInfo`.

use crate::huffman::{HUFFMAN_TABLES, TABLE_COUNT1_A, TABLE_COUNT1_B};
use crate::tables::{ipow20, Bands, QUANT_ROUND, SUBDV_TABLE};
use crate::types::{BlockType, GranuleInfo, GRANULE_SIZE, IXMAX_VAL, LARGE_BITS, SBMAX_L};

/// Quantize the 3/4-power spectrum at `istep`, returning the largest index.
/// The scalefactor and subblock-gain history is already folded into
/// `xrpow`, so the global gain alone positions the quantizer.
fn quantize_xrpow(xrpow: &[f64; GRANULE_SIZE], ix: &mut [i32; GRANULE_SIZE], istep: f64) -> i32 {
    let mut max = 0;
    for (out, &x) in ix.iter_mut().zip(xrpow.iter()) {
        let v = (x * istep + QUANT_ROUND) as i32;
        *out = v;
        if v > max {
            max = v;
        }
    }
    max
}

/// Split the spectrum into the three Huffman regions: trailing zero pairs,
/// then quadruples of |ix| <= 1, then big values.
fn calc_runlen(ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) {
    let mut i = GRANULE_SIZE;
    while i > 1 {
        if ix[i - 1] != 0 || ix[i - 2] != 0 {
            break;
        }
        i -= 2;
    }

    gi.count1 = 0;
    while i > 3 {
        if ix[i - 1] > 1 || ix[i - 2] > 1 || ix[i - 3] > 1 || ix[i - 4] > 1 {
            break;
        }
        gi.count1 += 1;
        i -= 4;
    }

    gi.big_values = (i >> 1) as u32;
}

/// Bit cost of the count1 region under both dedicated tables; selects the
/// cheaper one. Sign bits are folded into the table lengths.
fn count1_bitcount(ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) -> u32 {
    let hlen_a = HUFFMAN_TABLES[TABLE_COUNT1_A].hlen;
    let hlen_b = HUFFMAN_TABLES[TABLE_COUNT1_B].hlen;

    let mut sum_a = 0u32;
    let mut sum_b = 0u32;
    let mut i = (gi.big_values * 2) as usize;
    for _ in 0..gi.count1 {
        let p = (ix[i] + (ix[i + 1] << 1) + (ix[i + 2] << 2) + (ix[i + 3] << 3)) as usize;
        sum_a += hlen_a[p] as u32;
        sum_b += hlen_b[p] as u32;
        i += 4;
    }

    if sum_a < sum_b {
        gi.count1table_select = 0;
        gi.count1bits = sum_a;
    } else {
        gi.count1table_select = 1;
        gi.count1bits = sum_b;
    }
    gi.count1bits
}

/// Bit cost of `ix[begin..end]` pairs under one codebook
fn count_bit_region(ix: &[i32], begin: usize, end: usize, table: usize) -> u32 {
    if table == 0 || begin >= end {
        return 0;
    }
    let h = &HUFFMAN_TABLES[table];
    let ylen = h.ylen as usize;
    let mut sum = 0u32;

    if h.linbits > 0 {
        // ESC codebook: magnitudes above 14 escape to a linbits field
        let mut i = begin;
        while i < end {
            let mut x = ix[i] as usize;
            let mut y = ix[i + 1] as usize;
            if x > 14 {
                x = 15;
                sum += h.linbits;
            }
            if y > 14 {
                y = 15;
                sum += h.linbits;
            }
            sum += h.hlen[x * ylen + y] as u32;
            i += 2;
        }
    } else {
        let mut i = begin;
        while i < end {
            let x = ix[i] as usize;
            let y = ix[i + 1] as usize;
            sum += h.hlen[x * ylen + y] as u32;
            i += 2;
        }
    }
    sum
}

fn ix_max(ix: &[i32], begin: usize, end: usize) -> i32 {
    ix[begin..end].iter().copied().max().unwrap_or(0)
}

/// Cheapest codebook for `ix[begin..end]`
fn choose_table(ix: &[i32], begin: usize, end: usize) -> usize {
    let max = ix_max(ix, begin, end);
    if max == 0 {
        return 0;
    }

    if max <= 14 {
        // smallest codebook that can represent the region
        let mut choice = 0;
        for (i, t) in HUFFMAN_TABLES.iter().enumerate().take(16).skip(1) {
            if i == 4 || i == 14 {
                continue;
            }
            if t.xlen as i32 > max {
                choice = i;
                break;
            }
        }
        let mut best_bits = count_bit_region(ix, begin, end, choice);

        // sibling codebooks with the same value range may code shorter
        let siblings: &[usize] = match choice {
            2 => &[3],
            5 => &[6],
            7 => &[8, 9],
            10 => &[11, 12],
            13 => &[15],
            _ => &[],
        };
        for &alt in siblings {
            let bits = count_bit_region(ix, begin, end, alt);
            if bits <= best_bits {
                best_bits = bits;
                choice = alt;
            }
        }
        choice
    } else {
        // ESC codebooks: smallest sufficient linbits from each family
        let linmax = (max - 15) as u32;
        let pick = |range: std::ops::Range<usize>| {
            range
                .clone()
                .find(|&i| HUFFMAN_TABLES[i].linmax >= linmax)
                .unwrap_or(range.end - 1)
        };
        let t_a = pick(16..24);
        let t_b = pick(24..32);
        if count_bit_region(ix, begin, end, t_b) < count_bit_region(ix, begin, end, t_a) {
            t_b
        } else {
            t_a
        }
    }
}

/// Choose region0/region1 band counts for the big-value region.
/// Window-switching granules use the fixed 36-bin split of the IS.
fn subdivide(gi: &mut GranuleInfo, bands: &Bands) {
    if gi.big_values == 0 {
        gi.region0_count = 0;
        gi.region1_count = 0;
        gi.region_bound = [0, 0];
        return;
    }

    let bigv2 = (gi.big_values * 2) as usize;
    if gi.window_switching() {
        gi.region0_count = if gi.block_type == BlockType::Short && !gi.mixed_block_flag {
            8
        } else {
            7
        };
        gi.region1_count = 0;
        gi.region_bound = [bigv2.min(36), bigv2];
        return;
    }

    let mut nbands = 0;
    while nbands < SBMAX_L && bands.l[nbands] < bigv2 {
        nbands += 1;
    }

    let (mut r0, table_r1) = SUBDV_TABLE[nbands];
    while r0 > 0 && bands.l[r0 as usize + 1] > bigv2 {
        r0 -= 1;
    }
    let mut r1 = table_r1;
    while r1 > 0 && bands.l[(r0 + r1) as usize + 2] > bigv2 {
        r1 -= 1;
    }

    gi.region0_count = r0;
    gi.region1_count = r1;
    gi.region_bound = [
        bands.l[r0 as usize + 1].min(bigv2),
        bands.l[(r0 + r1) as usize + 2].min(bigv2),
    ];
}

/// Select codebooks for the populated big-value regions
fn bigv_tab_select(ix: &[i32; GRANULE_SIZE], gi: &mut GranuleInfo) {
    let bigv2 = (gi.big_values * 2) as usize;
    let [b0, b1] = gi.region_bound;

    gi.table_select = [0; 3];
    if b0 > 0 {
        gi.table_select[0] = choose_table(ix, 0, b0);
    }
    if b1 > b0 {
        gi.table_select[1] = choose_table(ix, b0, b1);
    }
    if bigv2 > b1 {
        gi.table_select[2] = choose_table(ix, b1, bigv2);
    }
}

/// Bit cost of the big-value region under the current selections
fn bigv_bitcount(ix: &[i32; GRANULE_SIZE], gi: &GranuleInfo) -> u32 {
    let bigv2 = (gi.big_values * 2) as usize;
    let [b0, b1] = gi.region_bound;
    count_bit_region(ix, 0, b0, gi.table_select[0])
        + count_bit_region(ix, b0, b1, gi.table_select[1])
        + count_bit_region(ix, b1, bigv2, gi.table_select[2])
}

/// Quantize at the current global gain and return the exact Huffman bit
/// cost, or [`LARGE_BITS`] when an index overflows the codebooks.
///
/// Populates `big_values`, `count1`, `count1bits`, the region bounds and
/// every table selection as a side effect.
pub fn count_bits(
    gi: &mut GranuleInfo,
    xrpow: &[f64; GRANULE_SIZE],
    ix: &mut [i32; GRANULE_SIZE],
    bands: &Bands,
) -> u32 {
    let istep = ipow20(gi.global_gain);
    let max = quantize_xrpow(xrpow, ix, istep);
    if max > IXMAX_VAL {
        return LARGE_BITS;
    }

    calc_runlen(ix, gi);
    let count1 = count1_bitcount(ix, gi);
    subdivide(gi, bands);
    bigv_tab_select(ix, gi);
    count1 + bigv_bitcount(ix, gi)
}

/// Re-divide the big-value region of a long-block granule, keeping the
/// split only when it codes strictly fewer bits. Quantized values are
/// untouched, so running this twice is a no-op. `part2_3_length` shrinks
/// by whatever the better split saves.
pub fn best_huffman_divide(gi: &mut GranuleInfo, ix: &[i32; GRANULE_SIZE], bands: &Bands) {
    if gi.window_switching() || gi.big_values == 0 {
        return;
    }
    let bigv2 = (gi.big_values * 2) as usize;

    let entry_bits = bigv_bitcount(ix, gi);
    let mut best_bits = entry_bits;
    for r0 in 0u32..16 {
        let b0 = bands.l[r0 as usize + 1];
        if b0 > bigv2 {
            break;
        }
        for r1 in 0u32..8 {
            let i1 = (r0 + r1) as usize + 2;
            if i1 > SBMAX_L {
                break;
            }
            let b1 = bands.l[i1];
            if b1 > bigv2 {
                break;
            }
            let t0 = choose_table(ix, 0, b0);
            let t1 = choose_table(ix, b0, b1);
            let t2 = choose_table(ix, b1, bigv2);
            let bits = count_bit_region(ix, 0, b0, t0)
                + count_bit_region(ix, b0, b1, t1)
                + count_bit_region(ix, b1, bigv2, t2);
            if bits < best_bits {
                best_bits = bits;
                gi.region0_count = r0;
                gi.region1_count = r1;
                gi.region_bound = [b0, b1];
                gi.table_select = [t0, t1, t2];
            }
        }
    }
    gi.part2_3_length -= entry_bits - best_bits;
}
