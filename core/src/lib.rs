//! Core types, codec parsing, and the staged inference pipeline for a
//! multi-stream video analytics cascade: H.264/H.265 Annex-B bitstreams in,
//! decoded frames through a detector and a three-stage attribute classifier
//! cascade, overlaid and written back out.
//!
//! Everything this crate calls out to — the video decoder, the
//! scaler/pre-processor, the DPU inference engine, the frame allocator, the
//! overlay renderer, and the sink — is reached through the trait seams in
//! [`external`]; concrete backends live outside this crate and are supplied
//! by a caller such as `video-cascade`'s own launcher.

pub mod au;
pub mod bitstream;
pub mod codecs;
pub mod config;
pub mod error;
pub mod external;
pub mod pipeline;
pub mod pool;
pub mod prediction;
pub(crate) mod thread_utils;
pub mod types;
