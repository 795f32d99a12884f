//! # quaver-mp3
//!
//! Perceptual quantization and rate-control core for MPEG-1/2/2.5 Layer
//! III encoding: given MDCT spectra and psychoacoustic masking data, it
//! chooses scalefactors, global gains, Huffman codebook selections and
//! per-granule bit budgets under CBR, ABR or VBR rate control, with a
//! correctly maintained bit reservoir, and packs the frame header and
//! side information for the bitstream serializer.
//!
//! The polyphase filterbank, MDCT and the psychoacoustic model proper are
//! external collaborators: callers feed [`types::FrameInput`] bundles of
//! `(xr, l3_xmin, pe, block_type)` per granule-channel and receive an
//! [`encoder::EncodedFrame`].

pub mod bitcount;
pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod huffman;
pub mod noise;
pub mod quantize;
pub mod ratectl;
pub mod reservoir;
pub mod scalefac;
pub mod tables;
pub mod types;

pub use config::{EncoderConfig, VbrMode};
pub use encoder::{EncodedFrame, Encoder};
pub use error::{ConfigError, ConfigResult, EncodeError, EncodeResult};
pub use types::{BlockType, ChannelMode, FrameInput, GranulePsy, MpegVersion, Xmin, GRANULE_SIZE};
