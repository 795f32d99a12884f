//! Frame image assembly: header and side information
//!
//! The serializer boundary of the crate. The 32-bit header and the
//! MPEG-1 (17/32 byte) or MPEG-2/2.5 (9/17 byte) side info images are
//! packed here, bit-exact to 2.4.1 of the IS; the Huffman-coded main
//! data stays behind the boundary and is represented by the
//! `part2_3_length` totals the rate control produced.

use crate::types::{ChannelMode, FrameSideInfo, GranuleInfo, MpegVersion, GRANULE_SIZE};

/// MSB-first bit packer with a 32-bit cache
#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    cache: u32,
    /// free bits remaining in the cache
    free: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            out: Vec::new(),
            cache: 0,
            free: 32,
        }
    }

    /// Write the low `n` bits of `val`, most significant first.
    pub fn put_bits(&mut self, val: u32, n: u32) {
        debug_assert!(n <= 32);
        debug_assert!(n == 32 || val >> n == 0, "val 0x{:x} wider than {} bits", val, n);
        if n == 0 {
            return;
        }
        if self.free > n {
            self.free -= n;
            self.cache |= val << self.free;
        } else {
            let spill = n - self.free;
            self.cache |= if spill < 32 { val >> spill } else { 0 };
            self.out.extend_from_slice(&self.cache.to_be_bytes());
            self.free = 32 - spill;
            self.cache = if spill == 0 || self.free == 0 {
                0
            } else {
                val << self.free
            };
        }
    }

    /// Bits written so far
    pub fn len_bits(&self) -> usize {
        self.out.len() * 8 + (32 - self.free) as usize
    }

    /// Flush, zero-padding the final byte
    pub fn into_bytes(mut self) -> Vec<u8> {
        let used = 32 - self.free;
        let whole = used.div_ceil(8);
        let bytes = self.cache.to_be_bytes();
        self.out.extend_from_slice(&bytes[..whole as usize]);
        self.out
    }
}

/// Everything the header needs beyond the side info
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_index: usize,
    pub samplerate: u32,
    pub padding: bool,
    pub mode: ChannelMode,
    /// mid/side flag of the mode extension field
    pub ms_stereo: bool,
    pub copyright: bool,
    pub original: bool,
}

fn version_field(v: MpegVersion) -> u32 {
    match v {
        MpegVersion::Mpeg1 => 3,
        MpegVersion::Mpeg2 => 2,
        MpegVersion::Mpeg25 => 0,
    }
}

fn samplerate_field(hz: u32) -> u32 {
    match hz {
        44100 | 22050 | 11025 => 0,
        48000 | 24000 | 12000 => 1,
        _ => 2,
    }
}

fn write_header(bw: &mut BitWriter, h: &FrameHeader) {
    bw.put_bits(0x7ff, 11); // sync
    bw.put_bits(version_field(h.version), 2);
    bw.put_bits(1, 2); // Layer III
    bw.put_bits(1, 1); // no CRC
    bw.put_bits(h.bitrate_index as u32, 4);
    bw.put_bits(samplerate_field(h.samplerate), 2);
    bw.put_bits(u32::from(h.padding), 1);
    bw.put_bits(0, 1); // private
    bw.put_bits(h.mode.header_bits(), 2);
    bw.put_bits(if h.ms_stereo { 2 } else { 0 }, 2);
    bw.put_bits(u32::from(h.copyright), 1);
    bw.put_bits(u32::from(h.original), 1);
    bw.put_bits(0, 2); // no emphasis
}

fn write_granule_info(bw: &mut BitWriter, gi: &GranuleInfo, lsf: bool) {
    bw.put_bits(gi.part2_3_length, 12);
    bw.put_bits(gi.big_values, 9);
    bw.put_bits(gi.global_gain as u32, 8);
    bw.put_bits(gi.scalefac_compress, if lsf { 9 } else { 4 });
    bw.put_bits(u32::from(gi.window_switching()), 1);

    if gi.window_switching() {
        bw.put_bits(gi.block_type as u32, 2);
        bw.put_bits(u32::from(gi.mixed_block_flag), 1);
        for r in 0..2 {
            bw.put_bits(gi.table_select[r] as u32, 5);
        }
        for w in 0..3 {
            bw.put_bits(gi.subblock_gain[w] as u32, 3);
        }
    } else {
        for r in 0..3 {
            bw.put_bits(gi.table_select[r] as u32, 5);
        }
        bw.put_bits(gi.region0_count, 4);
        bw.put_bits(gi.region1_count, 3);
    }

    if !lsf {
        bw.put_bits(u32::from(gi.preflag), 1);
    }
    bw.put_bits(gi.scalefac_scale as u32, 1);
    bw.put_bits(gi.count1table_select, 1);
}

/// Pack header plus side info into the frame image.
pub fn assemble_frame(h: &FrameHeader, side: &FrameSideInfo, channels: usize) -> Vec<u8> {
    let lsf = h.version.is_lsf();
    let mut bw = BitWriter::new();
    write_header(&mut bw, h);

    if lsf {
        bw.put_bits(side.main_data_begin, 8);
        bw.put_bits(side.private_bits, if channels == 1 { 1 } else { 2 });
    } else {
        bw.put_bits(side.main_data_begin, 9);
        bw.put_bits(side.private_bits, if channels == 1 { 5 } else { 3 });
        for ch in 0..channels {
            for class in 0..4 {
                bw.put_bits(side.scfsi[ch][class] as u32, 1);
            }
        }
    }

    for granule in side.gr.iter() {
        for gi in granule.iter() {
            write_granule_info(&mut bw, gi, lsf);
        }
    }

    let expected = 32 + 8 * crate::tables::side_info_bytes(lsf, channels);
    debug_assert_eq!(bw.len_bits(), expected);
    bw.into_bytes()
}

/// Move the signs of the source spectrum onto the quantized magnitudes.
pub fn apply_signs(xr: &[f64; GRANULE_SIZE], ix: &mut [i32; GRANULE_SIZE]) {
    for (v, &x) in ix.iter_mut().zip(xr.iter()) {
        if x < 0.0 {
            *v = -*v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameSideInfo, MAX_CHANNELS};

    fn header() -> FrameHeader {
        FrameHeader {
            version: MpegVersion::Mpeg1,
            bitrate_index: 9,
            samplerate: 44100,
            padding: false,
            mode: ChannelMode::Mono,
            ms_stereo: false,
            copyright: false,
            original: true,
        }
    }

    fn side(granules: usize, channels: usize) -> FrameSideInfo {
        FrameSideInfo {
            gr: (0..granules)
                .map(|_| (0..channels).map(|_| GranuleInfo::default()).collect())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn bit_writer_packs_msb_first() {
        let mut bw = BitWriter::new();
        bw.put_bits(0b101, 3);
        bw.put_bits(0b00001, 5);
        assert_eq!(bw.into_bytes(), vec![0b1010_0001]);

        let mut bw = BitWriter::new();
        bw.put_bits(0xffff_ffff, 32);
        bw.put_bits(0xA, 4);
        assert_eq!(bw.into_bytes(), vec![0xff, 0xff, 0xff, 0xff, 0xA0]);
    }

    #[test]
    fn bit_writer_survives_cache_boundaries() {
        let mut bw = BitWriter::new();
        for _ in 0..13 {
            bw.put_bits(0b10110, 5); // 65 bits, crosses two words
        }
        let bytes = bw.into_bytes();
        assert_eq!(bytes.len(), 9); // ceil(65 / 8)
        assert_eq!(bytes[0], 0b1011_0101);
    }

    #[test]
    fn mono_mpeg1_frame_image_is_21_bytes() {
        let bytes = assemble_frame(&header(), &side(2, 1), 1);
        assert_eq!(bytes.len(), 4 + 17);
        // sync must be aligned at the very start
        assert_eq!(bytes[0], 0xff);
        assert_eq!(bytes[1] & 0xe0, 0xe0);
    }

    #[test]
    fn stereo_lsf_frame_image_is_21_bytes() {
        let h = FrameHeader {
            version: MpegVersion::Mpeg2,
            samplerate: 22050,
            mode: ChannelMode::JointStereo,
            ..header()
        };
        let bytes = assemble_frame(&h, &side(1, MAX_CHANNELS), 2);
        assert_eq!(bytes.len(), 4 + 17);
    }

    #[test]
    fn header_version_and_mode_fields() {
        let bytes = assemble_frame(&header(), &side(2, 1), 1);
        // version bits for MPEG-1 are 11, layer III is 01, no CRC
        assert_eq!(bytes[1], 0xfb);
        // bitrate index 9, samplerate index 0, no padding
        assert_eq!(bytes[2] & 0xf0, 0x90);
        // mono mode in the top bits of byte 3
        assert_eq!(bytes[3] >> 6, 0b11);
    }

    #[test]
    fn signs_follow_the_source() {
        let mut xr = [0.0f64; GRANULE_SIZE];
        let mut ix = [0i32; GRANULE_SIZE];
        xr[0] = -1.0;
        xr[1] = 1.0;
        xr[2] = -0.5;
        ix[0] = 3;
        ix[1] = 2;
        ix[2] = 0;
        apply_signs(&xr, &mut ix);
        assert_eq!(&ix[..3], &[-3, 2, 0]);
    }
}
