//! Bit reservoir management, C.1.5.4.2.2 of the IS
//!
//! Granules that encode under budget leave their spare bits in the
//! reservoir; later granules may borrow them, within the reach of the
//! main_data_begin field. Credit and debit are both clamped so that
//! `0 <= size <= max` holds at every frame boundary.

use crate::types::{FrameSideInfo, MAX_PART23_BITS};
use log::debug;

/// Reservoir reach in bits: the main_data_begin field spans 511 bytes for
/// MPEG-1 and 255 bytes for MPEG-2/2.5.
fn reservoir_limit(lsf: bool) -> i32 {
    if lsf {
        255 * 8
    } else {
        511 * 8
    }
}

#[derive(Debug, Default)]
pub struct BitReservoir {
    size: i32,
    max: i32,
}

impl BitReservoir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits currently banked
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    /// Bytes of previous main data the decoder must keep buffered when
    /// this frame's header arrives.
    pub fn main_data_begin(&self) -> u32 {
        (self.size / 8) as u32
    }

    /// Establish the reservoir ceiling for this frame and return how many
    /// main-data bits the frame may consume in total.
    pub fn frame_begin(&mut self, lsf: bool, mean_bits: u32) -> u32 {
        self.max = reservoir_limit(lsf);
        // a frame smaller than the field reach cannot refill what the
        // next header is allowed to address
        if self.max > mean_bits as i32 * 8 {
            self.max = mean_bits as i32 * 8;
        }
        self.max = self.max.max(0);
        if self.size > self.max {
            self.size = self.max;
        }
        mean_bits + self.size as u32
    }

    /// Bits one granule-channel may spend, pe-weighted borrow included.
    pub fn max_granule_bits(&self, pe: f64, mean_bits_gc: u32) -> u32 {
        let mean = mean_bits_gc as i32;
        let max_bits = mean.min(MAX_PART23_BITS as i32);

        if self.max == 0 {
            return max_bits.max(0) as u32;
        }

        // demanding granules may dip into the reservoir, but never drain
        // more than six tenths of it at once
        let more_bits = (pe * 3.1) as i32 - mean;
        let mut add_bits = 0;
        if more_bits > 100 {
            add_bits = more_bits.min(self.size * 6 / 10);
        }

        // spill credit the reservoir cannot hold anyway
        let over = self.size - self.max * 8 / 10 - add_bits;
        if over > 0 {
            add_bits += over;
        }

        ((max_bits + add_bits).min(MAX_PART23_BITS as i32)).max(0) as u32
    }

    /// Settle one granule-channel: credit its unused share or debit the
    /// borrowed bits.
    pub fn adjust(&mut self, mean_bits_gc: u32, part2_3_length: u32) {
        self.size += mean_bits_gc as i32 - part2_3_length as i32;
        if self.size < 0 {
            debug!("reservoir overdrawn by {} bits, clamping", -self.size);
            self.size = 0;
        }
    }

    /// Return bits the finalization pass clawed back after the granules
    /// were already settled.
    pub fn credit(&mut self, bits: u32) {
        self.size += bits as i32;
    }

    /// Close the frame: realign to a byte boundary, spill overflow, and
    /// park the stuffing bits inside the granules' part2_3 budgets where
    /// they fit (first granule preferred, then distributed).
    pub fn frame_end(&mut self, side: &mut FrameSideInfo, channels: usize, mean_bits: u32) -> u32 {
        // odd frame bit budgets leave one bit that no granule pair owns
        if channels == 2 && mean_bits & 1 != 0 {
            self.size += 1;
        }

        let mut stuffing = 0i32;
        let over = self.size - self.max;
        if over > 0 {
            self.size -= over;
            stuffing += over;
        }

        let misaligned = self.size % 8;
        if misaligned != 0 {
            self.size -= misaligned;
            stuffing += misaligned;
        }

        let mut remaining = stuffing as u32;
        if remaining == 0 {
            return 0;
        }

        let first = &mut side.gr[0][0];
        if first.part2_3_length + remaining < MAX_PART23_BITS {
            first.part2_3_length += remaining;
            return stuffing as u32;
        }

        'outer: for granule in side.gr.iter_mut() {
            for gi in granule.iter_mut() {
                if remaining == 0 {
                    break 'outer;
                }
                let room = MAX_PART23_BITS - gi.part2_3_length;
                let take = room.min(remaining);
                gi.part2_3_length += take;
                remaining -= take;
            }
        }
        if remaining > 0 {
            // written as zero-fill ancillary data instead
            debug!("{} stuffing bits overflow into ancillary data", remaining);
        }
        stuffing as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GranuleInfo;
    use proptest::prelude::*;

    fn side(granules: usize, channels: usize) -> FrameSideInfo {
        FrameSideInfo {
            gr: (0..granules)
                .map(|_| (0..channels).map(|_| GranuleInfo::default()).collect())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn reach_depends_on_version() {
        let mut r = BitReservoir::new();
        r.frame_begin(false, 10_000);
        assert_eq!(r.max(), 511 * 8);
        let mut r = BitReservoir::new();
        r.frame_begin(true, 10_000);
        assert_eq!(r.max(), 255 * 8);
    }

    #[test]
    fn small_frames_limit_the_reach() {
        let mut r = BitReservoir::new();
        r.frame_begin(false, 300);
        assert_eq!(r.max(), 2400);
    }

    #[test]
    fn credit_debit_balance() {
        let mut r = BitReservoir::new();
        r.frame_begin(false, 2000);
        r.adjust(1000, 700); // +300
        r.adjust(1000, 1200); // -200
        assert_eq!(r.size(), 100);
    }

    #[test]
    fn frame_end_aligns_and_stuffs() {
        let mut r = BitReservoir::new();
        r.frame_begin(false, 2000);
        r.adjust(1000, 897); // size 103: 12 bytes + 7 bits
        let mut s = side(2, 1);
        let stuffed = r.frame_end(&mut s, 1, 2000);
        assert_eq!(r.size() % 8, 0);
        assert_eq!(stuffed, 7);
        assert_eq!(s.gr[0][0].part2_3_length, 7);
    }

    proptest! {
        #[test]
        fn invariants_hold_over_random_traffic(
            uses in prop::collection::vec((500u32..3000, 0u32..4000), 1..40)
        ) {
            let mut r = BitReservoir::new();
            for (mean, used) in uses {
                r.frame_begin(false, mean * 2);
                r.adjust(mean, used);
                let mut s = side(2, 1);
                r.frame_end(&mut s, 1, mean * 2);
                prop_assert!(r.size() >= 0);
                prop_assert!(r.size() <= r.max());
                prop_assert_eq!(r.size() % 8, 0);
            }
        }
    }
}
