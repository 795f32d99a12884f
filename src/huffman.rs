//! Layer III Huffman code-length tables
//!
//! The quantization loops never emit Huffman codes; they only need to know
//! how many bits each candidate quantization would cost. The tables here
//! carry, for every codebook of the IS, the code length of each (x, y)
//! value pair with the sign bits already folded in. ESC tables additionally
//! charge `linbits` per escaped component.

/// Bit-cost metadata for one codebook
#[derive(Debug, Clone, Copy)]
pub struct HuffCodeTab {
    /// Values per dimension (max representable magnitude + 1)
    pub xlen: u32,
    pub ylen: u32,
    /// Extra bits per escaped component (tables 16..=31 only)
    pub linbits: u32,
    /// Largest representable magnitude: xlen - 1 for plain tables, the
    /// linbits field reach above 14 for ESC tables
    pub linmax: u32,
    /// Code length including sign bits, indexed `x * ylen + y`
    pub hlen: &'static [u8],
}

const T1L: [u8; 4] = [1, 4, 3, 5];
const T2L: [u8; 9] = [1, 4, 7, 4, 5, 7, 6, 7, 8];
const T3L: [u8; 9] = [2, 3, 7, 4, 4, 7, 6, 7, 8];
const T5L: [u8; 16] = [1, 4, 7, 8, 4, 5, 8, 9, 7, 8, 9, 10, 8, 8, 9, 10];
const T6L: [u8; 16] = [3, 4, 6, 8, 4, 4, 6, 7, 5, 6, 7, 8, 7, 7, 8, 9];

#[rustfmt::skip]
const T7L: [u8; 36] = [
     1,  4,  7,  9,  9, 10,
     4,  6,  8,  9,  9, 10,
     7,  7,  9, 10, 10, 11,
     8,  9, 10, 11, 11, 11,
     8,  9, 10, 11, 11, 12,
     9, 10, 11, 12, 12, 12,
];

#[rustfmt::skip]
const T8L: [u8; 36] = [
     2,  4,  7,  9,  9, 10,
     4,  4,  6, 10, 10, 10,
     7,  6,  8, 10, 10, 11,
     9, 10, 10, 11, 11, 12,
     9,  9, 10, 11, 12, 12,
    10, 10, 11, 11, 13, 13,
];

#[rustfmt::skip]
const T9L: [u8; 36] = [
     3,  4,  6,  7,  9, 10,
     4,  5,  6,  7,  8, 10,
     5,  6,  7,  8,  9, 10,
     7,  7,  8,  9,  9, 10,
     8,  8,  9,  9, 10, 11,
     9,  9, 10, 10, 11, 11,
];

#[rustfmt::skip]
const T10L: [u8; 64] = [
     1,  4,  7,  9, 10, 10, 10, 11,
     4,  6,  8,  9, 10, 11, 10, 10,
     7,  8,  9, 10, 11, 12, 11, 11,
     8,  9, 10, 11, 12, 12, 11, 12,
     9, 10, 11, 12, 12, 12, 12, 12,
    10, 11, 12, 12, 13, 13, 12, 13,
     9, 10, 11, 12, 12, 12, 13, 13,
    10, 10, 11, 12, 12, 13, 13, 13,
];

#[rustfmt::skip]
const T11L: [u8; 64] = [
     2,  4,  6,  8,  9, 10,  9, 10,
     4,  5,  6,  8, 10, 10,  9, 10,
     6,  7,  8,  9, 10, 11, 10, 10,
     8,  8,  9, 11, 10, 12, 10, 11,
     9, 10, 10, 11, 11, 12, 11, 12,
     9, 10, 11, 12, 12, 13, 12, 13,
     9,  9,  9, 10, 11, 12, 12, 12,
     9,  9, 10, 11, 12, 12, 12, 12,
];

#[rustfmt::skip]
const T12L: [u8; 64] = [
     4,  4,  6,  8,  9, 10, 10, 10,
     4,  5,  6,  7,  9,  9, 10, 10,
     6,  6,  7,  8,  9, 10,  9, 10,
     7,  7,  8,  8,  9, 10, 10, 10,
     8,  8,  9,  9, 10, 10, 10, 11,
     9,  9, 10, 10, 10, 11, 11, 11,
     9,  9,  9, 10, 10, 11, 11, 12,
    10, 10, 10, 11, 11, 11, 11, 12,
];

#[rustfmt::skip]
const T13L: [u8; 256] = [
     1,  5,  7,  8,  9, 10, 10, 11, 10, 11, 12, 12, 13, 13, 14, 14,
     4,  6,  8,  9, 10, 10, 11, 11, 11, 11, 12, 12, 13, 14, 14, 14,
     7,  8,  9, 10, 11, 11, 12, 12, 11, 12, 12, 13, 13, 14, 15, 15,
     8,  9, 10, 11, 11, 12, 12, 12, 12, 13, 13, 13, 13, 14, 15, 15,
     9,  9, 11, 11, 12, 12, 13, 13, 12, 13, 13, 14, 14, 15, 15, 16,
    10, 10, 11, 11, 12, 13, 13, 13, 13, 13, 14, 14, 15, 15, 16, 16,
    10, 11, 12, 12, 13, 13, 13, 13, 13, 14, 14, 14, 15, 15, 16, 16,
    11, 11, 12, 13, 13, 13, 14, 14, 14, 14, 15, 15, 15, 16, 18, 18,
    10, 10, 11, 12, 12, 13, 13, 14, 14, 14, 14, 15, 15, 16, 17, 17,
    11, 11, 12, 12, 13, 13, 13, 15, 14, 15, 15, 16, 16, 16, 18, 17,
    11, 12, 12, 13, 13, 14, 14, 15, 14, 15, 16, 15, 16, 17, 18, 19,
    12, 12, 12, 13, 14, 14, 14, 14, 15, 15, 15, 16, 17, 17, 17, 18,
    12, 13, 13, 14, 14, 15, 14, 15, 16, 16, 17, 17, 17, 18, 18, 18,
    13, 13, 14, 15, 15, 15, 16, 16, 16, 16, 16, 17, 18, 17, 18, 18,
    14, 14, 14, 15, 15, 15, 17, 16, 16, 19, 17, 17, 17, 19, 18, 18,
    13, 14, 15, 16, 16, 16, 17, 16, 17, 17, 18, 18, 21, 20, 21, 18,
];

#[rustfmt::skip]
const T15L: [u8; 256] = [
     3,  5,  6,  8,  8,  9, 10, 10, 10, 11, 11, 12, 12, 12, 13, 14,
     5,  5,  7,  8,  9,  9, 10, 10, 10, 11, 11, 12, 12, 12, 13, 13,
     6,  7,  7,  8,  9,  9, 10, 10, 10, 11, 11, 12, 12, 12, 13, 13,
     7,  8,  8,  9,  9, 10, 10, 11, 11, 11, 12, 12, 12, 13, 13, 13,
     8,  8,  9,  9, 10, 10, 11, 11, 11, 11, 12, 12, 12, 13, 13, 13,
     9,  9,  9, 10, 10, 10, 11, 11, 11, 11, 12, 12, 13, 13, 13, 14,
    10, 10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 12, 13, 13, 13, 14,
    10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 12, 12, 13, 13, 13, 14,
    10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 12, 13, 13, 14, 14, 14,
    10, 11, 11, 11, 11, 12, 12, 12, 12, 13, 13, 13, 13, 14, 14, 14,
    11, 11, 11, 11, 12, 12, 12, 12, 12, 13, 13, 13, 13, 14, 15, 14,
    11, 11, 11, 11, 12, 12, 12, 13, 13, 13, 13, 14, 14, 14, 15, 15,
    12, 12, 11, 12, 12, 12, 13, 13, 13, 13, 13, 14, 14, 15, 15, 15,
    12, 12, 12, 12, 12, 13, 13, 13, 13, 14, 14, 14, 15, 15, 15, 15,
    13, 13, 13, 13, 13, 13, 13, 14, 14, 14, 14, 14, 15, 15, 15, 15,
    13, 13, 13, 13, 13, 14, 14, 14, 14, 14, 15, 15, 15, 15, 16, 16,
];

#[rustfmt::skip]
const T16L: [u8; 256] = [
     1,  5,  7,  9, 10, 10, 11, 11, 12, 12, 12, 13, 13, 13, 14, 11,
     4,  6,  8,  9, 10, 11, 11, 11, 12, 12, 12, 13, 14, 13, 14, 11,
     7,  8,  9, 10, 11, 11, 12, 12, 13, 13, 13, 13, 14, 14, 14, 12,
     9,  9, 10, 11, 11, 12, 12, 12, 13, 13, 14, 14, 14, 15, 15, 13,
    10, 10, 11, 11, 12, 12, 13, 13, 13, 14, 14, 14, 15, 15, 15, 12,
    10, 10, 11, 11, 12, 13, 13, 14, 14, 14, 14, 15, 15, 15, 16, 13,
    11, 11, 11, 12, 13, 13, 13, 13, 14, 14, 14, 14, 15, 15, 16, 13,
    11, 11, 12, 12, 13, 13, 14, 14, 14, 15, 15, 15, 15, 16, 18, 13,
    11, 12, 12, 13, 13, 13, 14, 14, 15, 15, 15, 16, 16, 16, 17, 13,
    12, 12, 12, 13, 13, 14, 14, 15, 15, 15, 15, 16, 16, 16, 17, 13,
    12, 12, 13, 13, 14, 14, 15, 14, 15, 16, 16, 16, 17, 17, 17, 13,
    12, 13, 13, 13, 14, 15, 15, 15, 16, 16, 16, 16, 17, 17, 18, 14,
    13, 13, 14, 14, 14, 15, 15, 15, 15, 16, 16, 17, 17, 17, 18, 14,
    13, 14, 14, 14, 15, 15, 15, 15, 16, 17, 17, 17, 18, 18, 18, 14,
    15, 14, 14, 14, 15, 15, 16, 16, 17, 17, 17, 18, 18, 18, 18, 14,
    11, 11, 11, 12, 12, 13, 13, 13, 14, 14, 14, 14, 15, 15, 15, 12,
];

#[rustfmt::skip]
const T24L: [u8; 256] = [
     4,  5,  7,  8,  9, 10, 10, 11, 11, 12, 12, 12, 12, 12, 13, 10,
     5,  6,  7,  8,  9, 10, 10, 11, 11, 11, 12, 12, 12, 12, 13, 10,
     7,  7,  8,  9,  9, 10, 10, 11, 11, 11, 11, 12, 12, 12, 13,  9,
     8,  8,  9,  9, 10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 13,  9,
     9,  9,  9, 10, 10, 10, 10, 10, 11, 11, 11, 11, 12, 12, 13,  9,
    10,  9, 10, 10, 10, 10, 11, 11, 11, 11, 11, 11, 12, 12, 12,  9,
    10, 10, 10, 10, 10, 11, 11, 11, 11, 11, 11, 12, 12, 12, 13,  9,
    11, 10, 10, 10, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 13,  9,
    11, 11, 11, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 12, 13,  9,
    11, 11, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 12, 13, 13,  9,
    12, 11, 11, 11, 11, 11, 12, 12, 12, 12, 12, 12, 13, 13, 13, 10,
    12, 12, 11, 11, 11, 12, 12, 12, 12, 12, 12, 13, 13, 13, 13, 10,
    12, 12, 12, 11, 12, 12, 12, 12, 12, 13, 13, 13, 13, 13, 13, 10,
    12, 12, 12, 12, 12, 12, 13, 13, 13, 13, 13, 13, 13, 13, 13, 10,
    13, 12, 12, 12, 12, 12, 13, 13, 13, 13, 13, 13, 13, 13, 13, 10,
     9,  9,  9,  9,  9,  9,  9,  9, 10, 10, 10, 10, 10, 10, 10,  6,
];

/// count1 table A: code length plus one sign bit per nonzero component
const T32L: [u8; 16] = [1, 5, 5, 7, 5, 8, 7, 9, 5, 7, 7, 9, 7, 9, 9, 10];
/// count1 table B: 4-bit codes plus sign bits
const T33L: [u8; 16] = [4, 5, 5, 6, 5, 6, 6, 7, 5, 6, 6, 7, 6, 7, 7, 8];

const EMPTY: [u8; 0] = [];

macro_rules! tab {
    ($xy:expr, $lin:expr, $linmax:expr, $hlen:expr) => {
        HuffCodeTab {
            xlen: $xy,
            ylen: $xy,
            linbits: $lin,
            linmax: $linmax,
            hlen: &$hlen,
        }
    };
}

/// All 34 codebooks; entries 0, 4 and 14 are unused placeholders.
/// Tables 16..=23 share the table-16 lengths and 24..=31 the table-24
/// lengths, differing only in linbits.
pub static HUFFMAN_TABLES: [HuffCodeTab; 34] = [
    tab!(0, 0, 0, EMPTY),
    tab!(2, 0, 1, T1L),
    tab!(3, 0, 2, T2L),
    tab!(3, 0, 2, T3L),
    tab!(0, 0, 0, EMPTY),
    tab!(4, 0, 3, T5L),
    tab!(4, 0, 3, T6L),
    tab!(6, 0, 5, T7L),
    tab!(6, 0, 5, T8L),
    tab!(6, 0, 5, T9L),
    tab!(8, 0, 7, T10L),
    tab!(8, 0, 7, T11L),
    tab!(8, 0, 7, T12L),
    tab!(16, 0, 15, T13L),
    tab!(0, 0, 0, EMPTY),
    tab!(16, 0, 15, T15L),
    tab!(16, 1, 1, T16L),
    tab!(16, 2, 3, T16L),
    tab!(16, 3, 7, T16L),
    tab!(16, 4, 15, T16L),
    tab!(16, 6, 63, T16L),
    tab!(16, 8, 255, T16L),
    tab!(16, 10, 1023, T16L),
    tab!(16, 13, 8191, T16L),
    tab!(16, 4, 15, T24L),
    tab!(16, 5, 31, T24L),
    tab!(16, 6, 63, T24L),
    tab!(16, 7, 127, T24L),
    tab!(16, 8, 255, T24L),
    tab!(16, 9, 511, T24L),
    tab!(16, 11, 2047, T24L),
    tab!(16, 13, 8191, T24L),
    tab!(16, 0, 0, T32L),
    tab!(16, 0, 0, T33L),
];

/// First ESC codebook
pub const FIRST_ESC_TABLE: usize = 16;
/// count1 codebooks
pub const TABLE_COUNT1_A: usize = 32;
pub const TABLE_COUNT1_B: usize = 33;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_shapes() {
        for (i, t) in HUFFMAN_TABLES.iter().enumerate() {
            match i {
                0 | 4 | 14 => assert!(t.hlen.is_empty()),
                32 | 33 => assert_eq!(t.hlen.len(), 16),
                _ => assert_eq!(t.hlen.len(), (t.xlen * t.xlen) as usize),
            }
        }
    }

    #[test]
    fn esc_linmax_monotone() {
        for i in FIRST_ESC_TABLE..24 {
            assert!(HUFFMAN_TABLES[i].linmax < HUFFMAN_TABLES[i + 1].linmax || i == 23);
        }
        assert_eq!(HUFFMAN_TABLES[23].linmax, 8191);
        assert_eq!(HUFFMAN_TABLES[31].linmax, 8191);
    }

    #[test]
    fn count1_lengths_track_sign_count() {
        // Table B is a fixed 4-bit code; every length is 4 + popcount.
        for p in 0..16usize {
            assert_eq!(T33L[p] as u32, 4 + (p as u32).count_ones());
        }
        // Table A lengths always cover at least the sign bits.
        for p in 0..16usize {
            assert!(T32L[p] as u32 > (p as u32).count_ones());
        }
    }
}
