//! Placeholder backends for every opaque handle `video-cascade-core`
//! expects (§1: decoder, scaler, DPU, frame allocator, overlay renderer,
//! sink — all "called through opaque handles", implementations out of
//! scope). These exist so the launcher's wiring can be exercised end to
//! end without a real hardware/software stack plugged in; a production
//! deployment swaps every type in this module for one backed by the actual
//! decode/scale/inference library and leaves `main.rs`'s wiring untouched.

use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use video_cascade_core::config::{DpuModelConfig, SinkType};
use video_cascade_core::error::ExternalError;
use video_cascade_core::external::{
    AllocType, ClassificationResult, DecodedOutcome, DecoderHandle, DecoderInCfg, DecoderOutCfg,
    DpuConfig, DpuHandle, DpuRuntimeConfig, FrameAlloc, FrameSink, OverlayRenderer, Ppe, Rect,
    ScalerHandle, SubmitOutcome,
};
use video_cascade_core::pool::{PixelFormat, Plane, VideoBuffer, VideoFrame, VideoInfo};
use video_cascade_core::prediction::PredictionTree;

/// Zero-fills whatever plane layout `info.format` calls for. Real hardware
/// allocators return device/CMA memory here instead of heap `Bytes`.
pub struct NullFrameAlloc;

impl FrameAlloc for NullFrameAlloc {
    fn alloc(
        &self,
        _alloc_type: AllocType,
        _alloc_flag: u32,
        _mem_bank: u32,
        info: VideoInfo,
    ) -> Result<VideoFrame, ExternalError> {
        let (w, h) = (info.width, info.height);
        let planes = match info.format {
            PixelFormat::Nv12 => vec![
                plane(w, h, (w * h) as usize),
                plane(w, h / 2, (w * h / 2) as usize),
            ],
            PixelFormat::Nv12_10Bit => vec![
                plane(w, h, (w * h * 2) as usize),
                plane(w, h / 2, (w * h) as usize),
            ],
            PixelFormat::I420 => vec![
                plane(w, h, (w * h) as usize),
                plane(w / 2, h / 2, (w * h / 4) as usize),
                plane(w / 2, h / 2, (w * h / 4) as usize),
            ],
            PixelFormat::Rgb | PixelFormat::Bgr => vec![plane(w, h, (w * h * 3) as usize)],
            PixelFormat::Gray8 => vec![plane(w, h, (w * h) as usize)],
            PixelFormat::Gray10Le32 => vec![plane(w, h, (w * h * 4) as usize)],
        };
        Ok(VideoFrame { info, planes })
    }
}

fn plane(stride: u32, elevation: u32, byte_len: usize) -> Plane {
    Plane {
        stride,
        elevation,
        data: bytes::Bytes::from(vec![0u8; byte_len]),
    }
}

/// Accepts every access unit immediately and hands decoded buffers straight
/// back out in submission order, without touching pixel data. Stands in
/// for whatever hardware or software decoder a real deployment drives.
pub struct NullDecoder {
    backlog: usize,
    available: VecDeque<VideoBuffer>,
    ready: VecDeque<VideoBuffer>,
}

impl NullDecoder {
    pub fn new() -> Self {
        Self {
            backlog: 0,
            available: VecDeque::new(),
            ready: VecDeque::new(),
        }
    }
}

impl DecoderHandle for NullDecoder {
    fn configure(&mut self, cfg: &DecoderInCfg) -> Result<DecoderOutCfg, ExternalError> {
        Ok(DecoderOutCfg {
            min_out_buf: 2,
            video_info: VideoInfo {
                width: cfg.resolution.width,
                height: cfg.resolution.height,
                format: PixelFormat::Nv12,
                alignment: 1,
            },
            mem_bank_id: 0,
        })
    }

    fn submit(
        &mut self,
        au: Option<&[u8]>,
        free_buffers: Vec<VideoBuffer>,
    ) -> Result<SubmitOutcome, ExternalError> {
        self.available.extend(free_buffers);
        if au.is_some() {
            self.backlog += 1;
        }
        if self.backlog == 0 {
            return Ok(SubmitOutcome::Accepted);
        }
        match self.available.pop_front() {
            Some(buf) => {
                self.backlog -= 1;
                self.ready.push_back(buf);
                Ok(SubmitOutcome::Accepted)
            }
            None => Ok(SubmitOutcome::SendAgain),
        }
    }

    fn get_decoded(&mut self) -> Result<DecodedOutcome, ExternalError> {
        match self.ready.pop_front() {
            Some(buf) => Ok(DecodedOutcome::Frame(buf)),
            None => Ok(DecodedOutcome::NeedMoreData),
        }
    }
}

/// Records the channels it was asked to produce without moving any pixels —
/// the real scaler binds each channel's source/destination rectangles to
/// physical buffer addresses outside this trait's surface.
pub struct NullScaler {
    channels: Vec<(Rect, Rect, Option<Ppe>)>,
}

impl NullScaler {
    pub fn new() -> Self {
        Self { channels: Vec::new() }
    }
}

impl ScalerHandle for NullScaler {
    fn channel_add(&mut self, src: Rect, dst: Rect, ppe: Option<Ppe>) -> Result<(), ExternalError> {
        self.channels.push((src, dst, ppe));
        Ok(())
    }

    fn process_frame(&mut self) -> Result<(), ExternalError> {
        self.channels.clear();
        Ok(())
    }
}

/// Reports back the static config it was built from and produces empty
/// results — no detections, no classifications. A real DPU backend
/// replaces this with a call into the vendor's inference runtime under
/// [`video_cascade_core::external::DPU_CREATION_LOCK`].
pub struct NullDpu {
    runtime: DpuRuntimeConfig,
}

impl NullDpu {
    pub fn new(_config: DpuConfig, model_width: u32, model_height: u32) -> Self {
        let _guard = video_cascade_core::external::DPU_CREATION_LOCK.lock().unwrap();
        Self {
            runtime: DpuRuntimeConfig {
                model_width,
                model_height,
                batch_size: _config.batch_size.max(1),
                mean_rgb: [0.0, 0.0, 0.0],
                scale_rgb: [1.0, 1.0, 1.0],
            },
        }
    }

    /// Loads a per-model JSON file (§6 `kernel.config.*`) into a
    /// [`DpuConfig`] plus this stub's fixed model geometry.
    pub fn from_model_config_path(
        path: &std::path::Path,
        model_width: u32,
        model_height: u32,
    ) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let model: DpuModelConfig = serde_json::from_slice(&bytes)?;
        let kernel = model.kernel.config;
        let config = DpuConfig {
            model_path: kernel.model_path,
            model_name: kernel.model_name,
            model_format: kernel.model_format,
            model_class: kernel.model_class,
            batch_size: kernel.batch_size,
            need_preprocess: kernel.vitis_ai_preprocess,
            objs_detection_max: kernel.max_objects,
            filter_labels: kernel.filter_labels,
            float_feature: kernel.float_feature,
            seg_out_fmt: kernel.seg_out_format,
            seg_out_factor: kernel.seg_out_factor,
        };
        Ok(Self::new(config, model_width, model_height))
    }
}

impl DpuHandle for NullDpu {
    fn get_config(&self) -> DpuRuntimeConfig {
        self.runtime
    }

    fn process_detections(&mut self, inputs: &[VideoFrame]) -> Result<Vec<PredictionTree>, ExternalError> {
        Ok(inputs.iter().map(|_| PredictionTree::new_image_root()).collect())
    }

    fn process_classifications(
        &mut self,
        inputs: &[VideoFrame],
    ) -> Result<Vec<ClassificationResult>, ExternalError> {
        Ok(inputs
            .iter()
            .map(|_| ClassificationResult {
                class_id: -1,
                class_prob: 0.0,
                class_label: "unknown".to_string(),
            })
            .collect())
    }
}

/// Discards every prediction tree without drawing anything.
pub struct NullOverlay;

impl OverlayRenderer for NullOverlay {
    fn render(&mut self, _tree: &PredictionTree, _frame: &mut VideoFrame) -> Result<(), ExternalError> {
        Ok(())
    }
}

/// Writes, logs, or discards the main frame per `sink-type` (§6).
pub enum CascadeSink {
    File(File),
    Screen,
    Null,
}

impl CascadeSink {
    pub fn new(kind: SinkType, stream_index: u32) -> Result<Self, ExternalError> {
        match kind {
            SinkType::File => {
                let path = format!("stream-{stream_index}.raw");
                let file = File::create(&path).map_err(|e| ExternalError::Error(e.to_string()))?;
                Ok(CascadeSink::File(file))
            }
            SinkType::Screen => Ok(CascadeSink::Screen),
            SinkType::Null => Ok(CascadeSink::Null),
        }
    }
}

impl FrameSink for CascadeSink {
    fn write(&mut self, frame: &VideoFrame) -> Result<(), ExternalError> {
        match self {
            CascadeSink::File(file) => {
                for plane in &frame.planes {
                    file.write_all(&plane.data)
                        .map_err(|e| ExternalError::Error(e.to_string()))?;
                }
                Ok(())
            }
            CascadeSink::Screen => {
                tracing::trace!(width = frame.width(), height = frame.height(), "render frame");
                Ok(())
            }
            CascadeSink::Null => Ok(()),
        }
    }
}

pub fn null_frame_alloc() -> Arc<dyn FrameAlloc> {
    Arc::new(NullFrameAlloc)
}
