//! Core type definitions for the Layer III quantization pipeline
//!
//! A frame holds one or two granules (MPEG-1 vs MPEG-2/2.5), each granule
//! one or two channels, each granule-channel 576 MDCT coefficients. The
//! structures here mirror the side-information layout of the IS so the
//! serializer can consume them field by field.

/// MDCT coefficients per granule and channel
pub const GRANULE_SIZE: usize = 576;

/// Scalefactor band counts for long and short blocks
pub const SBMAX_L: usize = 22;
pub const SBMAX_S: usize = 13;

/// Bands carrying a transmitted scalefactor; the last band of each kind
/// shares the quantizer of its neighbour ("sfb21" / "sfb12")
pub const SBPSY_L: usize = 21;
pub const SBPSY_S: usize = 12;

pub const MAX_CHANNELS: usize = 2;
pub const MAX_GRANULES: usize = 2;

/// Largest quantized magnitude the Huffman tables can represent
pub const IXMAX_VAL: i32 = 8206;

/// Hard ceiling of the part2_3_length side-info field (12 bits)
pub const MAX_PART23_BITS: u32 = 4095;

/// Sentinel bit count returned when a quantization does not fit the tables
pub const LARGE_BITS: u32 = 100_000;

/// Window sequence of a granule, 2.4.2.7 of the IS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockType {
    #[default]
    Norm = 0,
    Start = 1,
    Short = 2,
    Stop = 3,
}

/// MPEG version, derived from the sample rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    /// Low sampling frequency profile (MPEG-2 and MPEG-2.5)
    pub fn is_lsf(self) -> bool {
        !matches!(self, MpegVersion::Mpeg1)
    }

    /// Granules per frame
    pub fn granules(self) -> usize {
        if self.is_lsf() {
            1
        } else {
            2
        }
    }
}

/// Channel mode written into the frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    pub fn channels(self) -> usize {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }

    /// 2-bit header field
    pub fn header_bits(self) -> u32 {
        match self {
            ChannelMode::Stereo => 0,
            ChannelMode::JointStereo => 1,
            ChannelMode::DualChannel => 2,
            ChannelMode::Mono => 3,
        }
    }
}

/// Per granule-channel encoding state, one-to-one with the side info
/// fields of the IS plus the derived bookkeeping the loops maintain.
#[derive(Debug, Clone)]
pub struct GranuleInfo {
    pub part2_3_length: u32,
    pub part2_length: u32,
    pub big_values: u32,
    pub count1: u32,
    pub count1bits: u32,
    pub global_gain: i32,
    pub scalefac_compress: u32,
    pub block_type: BlockType,
    pub mixed_block_flag: bool,
    pub table_select: [usize; 3],
    pub subblock_gain: [i32; 3],
    pub region0_count: u32,
    pub region1_count: u32,
    pub preflag: bool,
    pub scalefac_scale: u8,
    pub count1table_select: u32,
    /// Bin indices ending the two big-value regions
    pub region_bound: [usize; 2],
    /// Number of long scalefactor bands in use (lower under mixed blocks)
    pub sfb_lmax: usize,
    /// First short scalefactor band in use
    pub sfb_smin: usize,
    pub slen: [u32; 4],
}

impl Default for GranuleInfo {
    fn default() -> Self {
        Self {
            part2_3_length: 0,
            part2_length: 0,
            big_values: 0,
            count1: 0,
            count1bits: 0,
            global_gain: 210,
            scalefac_compress: 0,
            block_type: BlockType::Norm,
            mixed_block_flag: false,
            table_select: [0; 3],
            subblock_gain: [0; 3],
            region0_count: 0,
            region1_count: 0,
            preflag: false,
            scalefac_scale: 0,
            count1table_select: 0,
            region_bound: [0; 2],
            sfb_lmax: SBPSY_L,
            sfb_smin: 0,
            slen: [0; 4],
        }
    }
}

impl GranuleInfo {
    /// Fresh state for a granule about to enter the outer loop.
    pub fn reset_for(block_type: BlockType, mixed_block: bool, lsf: bool) -> Self {
        let mut gi = GranuleInfo {
            block_type,
            mixed_block_flag: mixed_block && block_type == BlockType::Short,
            ..Default::default()
        };
        if gi.block_type == BlockType::Short {
            if gi.mixed_block_flag {
                gi.sfb_lmax = if lsf { 6 } else { 8 };
                gi.sfb_smin = 3;
            } else {
                gi.sfb_lmax = 0;
                gi.sfb_smin = 0;
            }
        }
        gi
    }

    /// True when the side info carries the window-switching variant
    /// (block_type != NORM) of the region fields.
    pub fn window_switching(&self) -> bool {
        self.block_type != BlockType::Norm
    }
}

/// Integer scalefactors, long bands and short-window bands
#[derive(Debug, Clone, Default)]
pub struct Scalefac {
    pub l: [i32; SBMAX_L],
    pub s: [[i32; 3]; SBMAX_S],
}

/// Allowed distortion per scalefactor band, from the psy model
#[derive(Debug, Clone)]
pub struct Xmin {
    pub l: [f64; SBMAX_L],
    pub s: [[f64; 3]; SBMAX_S],
}

impl Default for Xmin {
    fn default() -> Self {
        Self {
            l: [0.0; SBMAX_L],
            s: [[0.0; 3]; SBMAX_S],
        }
    }
}

/// Quantization-noise over masking-threshold ratios, linear units
#[derive(Debug, Clone)]
pub struct Distort {
    pub l: [f64; SBMAX_L],
    pub s: [[f64; 3]; SBMAX_S],
}

impl Default for Distort {
    fn default() -> Self {
        Self {
            l: [0.0; SBMAX_L],
            s: [[0.0; 3]; SBMAX_S],
        }
    }
}

/// Psychoacoustic inputs for one granule-channel, already delayed by the
/// driver so that block_type matches the coefficients.
#[derive(Debug, Clone)]
pub struct GranulePsy {
    /// Signed MDCT output; short blocks arrive band-major per window
    pub xr: Box<[f64; GRANULE_SIZE]>,
    /// Allowed noise energy per scalefactor band
    pub xmin: Xmin,
    /// Perceptual entropy estimate
    pub pe: f64,
    pub block_type: BlockType,
    pub mixed_block: bool,
}

impl GranulePsy {
    pub fn silent(block_type: BlockType) -> Self {
        Self {
            xr: Box::new([0.0; GRANULE_SIZE]),
            xmin: Xmin::default(),
            pe: 0.0,
            block_type,
            mixed_block: false,
        }
    }
}

/// One frame worth of psy-model output, indexed `[granule][channel]`
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub granules: Vec<Vec<GranulePsy>>,
    /// Mid/side energy balance per granule, 0.5 = even split
    pub ms_ener_ratio: [f64; MAX_GRANULES],
    /// Mid/side coding active for this frame
    pub ms_stereo: bool,
}

/// Frame-level side information handed to the serializer
#[derive(Debug, Clone, Default)]
pub struct FrameSideInfo {
    pub main_data_begin: u32,
    pub private_bits: u32,
    pub scfsi: [[u8; 4]; MAX_CHANNELS],
    pub gr: Vec<Vec<GranuleInfo>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granule_info_defaults() {
        let gi = GranuleInfo::default();
        assert_eq!(gi.global_gain, 210);
        assert_eq!(gi.sfb_lmax, SBPSY_L);
        assert_eq!(gi.block_type, BlockType::Norm);
        assert!(!gi.window_switching());
    }

    #[test]
    fn short_block_geometry() {
        let gi = GranuleInfo::reset_for(BlockType::Short, false, false);
        assert_eq!(gi.sfb_lmax, 0);
        assert_eq!(gi.sfb_smin, 0);
        assert!(gi.window_switching());

        let gi = GranuleInfo::reset_for(BlockType::Short, true, false);
        assert_eq!(gi.sfb_lmax, 8);
        assert_eq!(gi.sfb_smin, 3);
        assert!(gi.mixed_block_flag);

        let gi = GranuleInfo::reset_for(BlockType::Short, true, true);
        assert_eq!(gi.sfb_lmax, 6);

        // mixed flag is meaningless outside short blocks
        let gi = GranuleInfo::reset_for(BlockType::Norm, true, false);
        assert!(!gi.mixed_block_flag);
    }

    #[test]
    fn version_geometry() {
        assert_eq!(MpegVersion::Mpeg1.granules(), 2);
        assert_eq!(MpegVersion::Mpeg2.granules(), 1);
        assert!(MpegVersion::Mpeg25.is_lsf());
    }
}
