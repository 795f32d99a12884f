//! The encoder instance: configuration, shared tables, reservoir and the
//! per-frame drive.
//!
//! A frame is processed start to finish on the calling thread: rate
//! control quantizes every granule-channel in order, the finalization
//! pass claws back storage bits, the reservoir settles, and the header
//! plus side info image is packed. The caller feeds already-delayed psy
//! data (`block_type` matching the coefficients) and receives everything
//! the main-data serializer needs.

use crate::config::{EncoderConfig, VbrMode};
use crate::error::{ConfigResult, EncodeError, EncodeResult};
use crate::frame::{apply_signs, assemble_frame, FrameHeader};
use crate::noise::Comparator;
use crate::quantize::{QuantizeCtx, SeedMemory};
use crate::ratectl::{abr_frame, cbr_frame, vbr_frame, DriverEnv, GranuleOut};
use crate::reservoir::BitReservoir;
use crate::scalefac::{best_scalefac_store, try_scfsi};
use crate::tables::{bands, frame_bits, samplerate_index, side_info_bytes};
use crate::types::{
    FrameInput, FrameSideInfo, MpegVersion, Scalefac, GRANULE_SIZE, MAX_PART23_BITS,
};
use log::debug;

/// One encoded frame: the wire-facing image (header + side info) plus
/// everything the main-data serializer consumes.
pub struct EncodedFrame {
    /// Header and side info bytes, sync-aligned
    pub image: Vec<u8>,
    pub side_info: FrameSideInfo,
    /// Signed quantized spectra, `[granule][channel]`
    pub l3enc: Vec<Vec<Box<[i32; GRANULE_SIZE]>>>,
    pub scalefac: Vec<Vec<Scalefac>>,
    pub bitrate_index: usize,
    pub bitrate_kbps: u32,
    pub padding: bool,
    /// Whole frame size in bits at the chosen rate
    pub frame_bits: u32,
    /// Sum of part2_3_length over the frame
    pub data_bits: u32,
    pub stuffing_bits: u32,
    /// Reservoir level after the frame settled
    pub reservoir_size: i32,
}

pub struct Encoder {
    cfg: EncoderConfig,
    version: MpegVersion,
    channels: usize,
    granules: usize,
    ctx: QuantizeCtx,
    resv: BitReservoir,
    seed: SeedMemory,
    /// fractional-slot accumulator deciding CBR padding
    slot_lag: f64,
    frames_encoded: u64,
}

impl Encoder {
    pub fn new(cfg: EncoderConfig) -> ConfigResult<Self> {
        cfg.validate()?;
        let version = cfg.version();
        let sr_idx = samplerate_index(cfg.samplerate).expect("validated samplerate");

        let ctx = QuantizeCtx {
            bands: bands(sr_idx),
            lsf: version.is_lsf(),
            comparator: Comparator::new(cfg.experimental_x),
            noise_shaping: if cfg.quality >= 9 { 0 } else { cfg.noise_shaping },
            noise_shaping_amp: cfg.noise_shaping_amp,
            noise_shaping_stop: cfg.noise_shaping_stop,
            tolerate_top: !cfg.experimental_y,
            sfb21_stop: cfg.sfb21_extra,
            experimental_z: cfg.experimental_z,
            vbr_active: cfg.vbr_mode == VbrMode::Rh,
        };

        Ok(Self {
            channels: cfg.channels(),
            granules: version.granules(),
            version,
            ctx,
            cfg,
            resv: BitReservoir::new(),
            seed: SeedMemory::default(),
            slot_lag: 0.0,
            frames_encoded: 0,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    /// PCM samples one frame consumes per channel
    pub fn samples_per_frame(&self) -> usize {
        self.granules * GRANULE_SIZE
    }

    pub fn granules(&self) -> usize {
        self.granules
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn reservoir_size(&self) -> i32 {
        self.resv.size()
    }

    fn check_shape(&self, input: &FrameInput) -> EncodeResult<()> {
        if input.granules.len() != self.granules {
            return Err(EncodeError::GranuleCountMismatch {
                expected: self.granules,
                actual: input.granules.len(),
            });
        }
        for row in &input.granules {
            if row.len() != self.channels {
                return Err(EncodeError::ChannelCountMismatch {
                    expected: self.channels,
                    actual: row.len(),
                });
            }
        }
        Ok(())
    }

    /// CBR padding cadence: accumulate the fractional slot per frame and
    /// pad whenever it rolls over.
    fn take_padding(&mut self, kbps: u32) -> bool {
        let per_frame = if self.version.is_lsf() { 72_000.0 } else { 144_000.0 };
        let slots = per_frame * kbps as f64 / self.cfg.samplerate as f64;
        let frac = slots - slots.floor();
        if frac == 0.0 {
            return false;
        }
        self.slot_lag += frac;
        if self.slot_lag >= 1.0 {
            self.slot_lag -= 1.0;
            true
        } else {
            false
        }
    }

    /// Encode one frame worth of psy-model output. Granule 0 is encoded
    /// before granule 1 and left before right; the reservoir state each
    /// granule sees is the post-predecessor state.
    pub fn encode_frame(&mut self, input: &FrameInput) -> EncodeResult<EncodedFrame> {
        self.check_shape(input)?;
        let main_data_begin = self.resv.main_data_begin();

        let mut out: Vec<Vec<GranuleOut>> = (0..self.granules)
            .map(|_| (0..self.channels).map(|_| GranuleOut::new()).collect())
            .collect();

        let bitrate_index = {
            let mut env = DriverEnv {
                ctx: &self.ctx,
                resv: &mut self.resv,
                seed: &mut self.seed,
                cfg: &self.cfg,
                granules: self.granules,
                channels: self.channels,
            };
            match self.cfg.vbr_mode {
                VbrMode::Off => cbr_frame(&mut env, input, &mut out),
                VbrMode::Abr => abr_frame(&mut env, input, &mut out),
                VbrMode::Rh => vbr_frame(&mut env, input, &mut out),
            }
        };
        let bitrate_kbps = self.cfg.bitrate_table()[bitrate_index];

        // finalization: cheaper region splits and scalefactor storage
        let settled: u32 = out.iter().flatten().map(|g| g.info.part2_3_length).sum();
        for row in out.iter_mut() {
            for g in row.iter_mut() {
                if !g.silent && self.cfg.use_best_huffman() {
                    crate::bitcount::best_huffman_divide(&mut g.info, &g.work.ix, &self.ctx.bands);
                }
                best_scalefac_store(
                    self.ctx.lsf,
                    &mut g.info,
                    &mut g.scalefac,
                    &g.work.ix,
                    &self.ctx.bands,
                );
                debug_assert!(g.info.part2_3_length <= MAX_PART23_BITS);
                debug_assert!((0..=255).contains(&g.info.global_gain));
            }
        }

        let mut side = FrameSideInfo {
            main_data_begin,
            private_bits: 0,
            scfsi: [[0; 4]; 2],
            gr: out
                .iter()
                .map(|row| row.iter().map(|g| g.info.clone()).collect())
                .collect(),
        };

        let scalefacs: Vec<Vec<Scalefac>> = out
            .iter()
            .map(|row| row.iter().map(|g| g.scalefac.clone()).collect())
            .collect();
        if !self.ctx.lsf && self.granules == 2 {
            for ch in 0..self.channels {
                try_scfsi(&mut side, &scalefacs, ch);
            }
        }

        let finalized: u32 = side.gr.iter().flatten().map(|gi| gi.part2_3_length).sum();
        if settled > finalized {
            self.resv.credit(settled - finalized);
        }

        let padding = match self.cfg.vbr_mode {
            VbrMode::Off => self.take_padding(bitrate_kbps),
            _ => false,
        };

        let mean_bits = frame_bits(self.ctx.lsf, bitrate_kbps, self.cfg.samplerate, 0)
            - 32
            - 8 * side_info_bytes(self.ctx.lsf, self.channels) as u32;
        let stuffing_bits = self.resv.frame_end(&mut side, self.channels, mean_bits);

        let l3enc: Vec<Vec<Box<[i32; GRANULE_SIZE]>>> = out
            .iter()
            .enumerate()
            .map(|(gr, row)| {
                row.iter()
                    .enumerate()
                    .map(|(ch, g)| {
                        let mut ix = g.work.ix.clone();
                        apply_signs(&input.granules[gr][ch].xr, &mut ix);
                        ix
                    })
                    .collect()
            })
            .collect();

        let header = FrameHeader {
            version: self.version,
            bitrate_index,
            samplerate: self.cfg.samplerate,
            padding,
            mode: self.cfg.mode,
            ms_stereo: input.ms_stereo && self.cfg.mode == crate::types::ChannelMode::JointStereo,
            copyright: self.cfg.copyright,
            original: self.cfg.original,
        };
        let image = assemble_frame(&header, &side, self.channels);

        self.frames_encoded += 1;
        let data_bits: u32 = side.gr.iter().flatten().map(|gi| gi.part2_3_length).sum();
        debug!(
            "frame {}: {} kbps, {} data bits, reservoir {}",
            self.frames_encoded,
            bitrate_kbps,
            data_bits,
            self.resv.size()
        );

        Ok(EncodedFrame {
            image,
            l3enc,
            scalefac: scalefacs,
            bitrate_index,
            bitrate_kbps,
            padding,
            frame_bits: frame_bits(
                self.ctx.lsf,
                bitrate_kbps,
                self.cfg.samplerate,
                u32::from(padding),
            ),
            data_bits,
            stuffing_bits,
            reservoir_size: self.resv.size(),
            side_info: side,
        })
    }
}
