//! Trait shapes for every collaborator reached only as an opaque handle:
//! the hardware/software scaler, the video decoder, the DPU inference
//! engine, and the frame allocator. Their actual implementations live
//! outside this crate — this module is the Rust seam a real backend plugs
//! into, one trait per external-backend kind.

use crate::pool::{VideoBuffer, VideoFrame, VideoInfo};
use crate::prediction::PredictionTree;
use crate::types::{Codec, Framerate, Resolution};

/// `alloc_type` passed to [`FrameAlloc::alloc`]: `Cma` for
/// physically contiguous device-visible memory, `NonCma` for ordinary host
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocType {
    Cma,
    NonCma,
}

/// Allocates the pixel memory backing a [`VideoFrame`]. A [`BufferPool`][1]
/// calls this once per buffer it grows by, never per-frame in the hot
/// path — pools only grow up to their configured `max`.
///
/// [1]: crate::pool::BufferPool
pub trait FrameAlloc: Send + Sync {
    fn alloc(
        &self,
        alloc_type: AllocType,
        alloc_flag: u32,
        mem_bank: u32,
        info: VideoInfo,
    ) -> Result<VideoFrame, ExternalError>;
}

pub use crate::error::ExternalError;

/// Serializes construction of DPU handles. Held only around the construction call
/// itself, never across inference — construction is O(1) outside any
/// stage hot path. A factory building a [`DpuHandle`] should lock this
/// for the duration of its own `create` call.
pub static DPU_CREATION_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Sidecar produced by the access-unit assembler whenever stream
/// parameters change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecoderInCfg {
    pub codec: Codec,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub bit_depth_luma_minus8: u32,
    pub resolution: Resolution,
    pub framerate: Option<Framerate>,
}

/// What [`DecoderHandle::configure`] reports back: the
/// decoder dictates its own minimum output-buffer count and the geometry
/// the pipeline's own pool must allocate to.
#[derive(Debug, Clone, Copy)]
pub struct DecoderOutCfg {
    pub min_out_buf: usize,
    pub video_info: VideoInfo,
    pub mem_bank_id: u32,
}

/// Outcome of [`DecoderHandle::submit`]. Ownership of the donated output
/// buffers moves across this call by value — there is no hash map of
/// bare frame pointers back to pool buffers to maintain, because a trait
/// object can simply hand the same `VideoBuffer` back out of
/// [`DecoderHandle::get_decoded`] once it holds decoded pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// The decoder has no free output buffer right now; the caller should
    /// wait for a buffer pool release and retry.
    SendAgain,
    Eos,
}

/// Outcome of [`DecoderHandle::get_decoded`].
pub enum DecodedOutcome {
    Frame(VideoBuffer),
    NeedMoreData,
    Eos,
}

/// The video decoder. One instance per
/// stream, owned by that stream's decoder stage.
pub trait DecoderHandle: Send {
    fn configure(&mut self, cfg: &DecoderInCfg) -> Result<DecoderOutCfg, ExternalError>;

    /// `au` is `None` on a pure resubmit-with-no-new-input retry after
    /// `SendAgain`. `free_buffers` donates pool-acquired output buffers
    /// the decoder may fill and later return via `get_decoded`.
    fn submit(
        &mut self,
        au: Option<&[u8]>,
        free_buffers: Vec<VideoBuffer>,
    ) -> Result<SubmitOutcome, ExternalError>;

    fn get_decoded(&mut self) -> Result<DecodedOutcome, ExternalError>;
}

/// A rectangular region in pixel coordinates, used both as a scaler
/// channel's source/destination and as a detection bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Per-channel mean/scale preprocessing parameters applied by the scaler
/// ahead of inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ppe {
    pub mean: [f32; 3],
    pub scale: [f32; 3],
}

/// The hardware/software scaler. Channels are
/// queued with `channel_add` and all run together on `process_frame`, so a
/// caller that needs several crops out of one source frame
/// adds one channel per crop before committing once.
pub trait ScalerHandle: Send {
    fn channel_add(
        &mut self,
        src: Rect,
        dst: Rect,
        ppe: Option<Ppe>,
    ) -> Result<(), ExternalError>;

    fn process_frame(&mut self) -> Result<(), ExternalError>;
}

/// `kernel.config.model-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Rgb,
    Bgr,
    Gray8,
}

/// Static configuration a DPU handle is constructed with.
#[derive(Debug, Clone)]
pub struct DpuConfig {
    pub model_path: std::path::PathBuf,
    pub model_name: String,
    pub model_format: ModelFormat,
    pub model_class: String,
    pub batch_size: usize,
    pub need_preprocess: bool,
    pub objs_detection_max: usize,
    pub filter_labels: Vec<String>,
    pub float_feature: bool,
    pub seg_out_fmt: Option<String>,
    pub seg_out_factor: Option<f32>,
}

/// Runtime facts reported back by [`DpuHandle::get_config`]: the
/// resolution and PPE the caller (scaler stage or crop-scaler stage) must
/// produce input at.
#[derive(Debug, Clone, Copy)]
pub struct DpuRuntimeConfig {
    pub model_width: u32,
    pub model_height: u32,
    pub batch_size: usize,
    pub mean_rgb: [f32; 3],
    pub scale_rgb: [f32; 3],
}

/// A single attribute classification, returned in the same order as the input crops were submitted.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub class_id: i32,
    pub class_prob: f32,
    pub class_label: String,
}

/// The DPU inference engine. The
/// detector stage uses `process_detections` (batch in, one `PredictionTree`
/// root per input frame, out); the classifier cascade uses
/// `process_classifications` (batch in, one label per crop, out, in
/// input order) — split into two methods because their result shapes
/// differ and nothing benefits from forcing one signature to serve both.
pub trait DpuHandle: Send {
    fn get_config(&self) -> DpuRuntimeConfig;

    fn process_detections(
        &mut self,
        inputs: &[VideoFrame],
    ) -> Result<Vec<PredictionTree>, ExternalError>;

    fn process_classifications(
        &mut self,
        inputs: &[VideoFrame],
    ) -> Result<Vec<ClassificationResult>, ExternalError>;
}

/// Converts a finished prediction tree into renderable primitives and
/// burns them into the main frame. Mask-by-class
/// and label layout live entirely on the other side of this trait; this
/// crate only owns when the tree is handed over and freed.
pub trait OverlayRenderer: Send {
    fn render(&mut self, tree: &PredictionTree, frame: &mut VideoFrame) -> Result<(), ExternalError>;
}

/// Where a stream's main frame ends up.
pub enum SinkTarget {
    File(std::path::PathBuf),
    Screen,
    Null,
}

/// Writes (or discards) a finished main frame.
pub trait FrameSink: Send {
    fn write(&mut self, frame: &VideoFrame) -> Result<(), ExternalError>;
}
