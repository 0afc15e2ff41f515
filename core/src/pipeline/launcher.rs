//! Launcher: wires one whole pipeline together from a [`PipelineConfig`],
//! spawns every stage thread, joins them, aggregates a single
//! [`PipelineError`] outcome, and periodically reports per-stream FPS.
//!
//! The opaque external collaborators (decoder, scaler, DPU, overlay,
//! sink, frame allocator) are supplied by the caller as already-built
//! trait objects/factories via [`PipelineDeps`] — this core has no way to
//! construct them itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, StageRunError};
use crate::external::{DecoderHandle, DpuHandle, FrameAlloc, FrameSink, OverlayRenderer, Ppe, ScalerHandle};
use crate::pipeline::classifier_stage::{ClassifierStage, ClassifierStageOptions};
use crate::pipeline::crop_scaler_stage::{CropScalerStage, CropScalerStageOptions};
use crate::pipeline::decoder_stage::{DecoderStage, DecoderStageOptions};
use crate::pipeline::detector_stage::{DetectorStage, DetectorStageOptions};
use crate::pipeline::funnel::{DeFunnel, DeFunnelOptions, Funnel, FunnelOptions};
use crate::pipeline::overlay_stage::{OverlayStage, OverlayStageOptions};
use crate::pipeline::parser_stage::{ParserStage, ParserStageOptions};
use crate::pipeline::scaler_stage::{ScalerStage, ScalerStageOptions};
use crate::pipeline::sink_stage::{SinkStage, SinkStageOptions};
use crate::pool::{BufferPool, BufferPoolConfig};
use crate::thread_utils::InitializableThread;
use crate::types::StreamId;

/// Every opaque collaborator the pipeline needs constructed, supplied by
/// the caller (the `cli` launcher's model-loading code).
pub struct PipelineDeps {
    pub frame_alloc: Arc<dyn FrameAlloc>,
    pub make_decoder: Box<dyn Fn(StreamId) -> Box<dyn DecoderHandle> + Send + Sync>,
    pub make_scaler: Box<dyn Fn(StreamId) -> Box<dyn ScalerHandle> + Send + Sync>,
    pub make_crop_scaler: Box<dyn Fn(StreamId) -> Box<dyn ScalerHandle> + Send + Sync>,
    pub detector: Box<dyn DpuHandle>,
    /// color, make, type, in that order.
    pub classifiers: [Box<dyn DpuHandle>; 3],
    pub make_overlay: Box<dyn Fn(StreamId) -> Box<dyn OverlayRenderer> + Send + Sync>,
    pub make_sink: Box<dyn Fn(StreamId) -> Box<dyn FrameSink> + Send + Sync>,
}

struct StreamRuntime {
    stream_id: StreamId,
    render_count: Arc<AtomicU64>,
    started_at: Instant,
}

/// Runs one pipeline to completion. Blocks the calling thread until every stream
/// has reached end-of-stream or the pipeline is cancelled via `interrupt`.
pub fn run(config: &PipelineConfig, deps: PipelineDeps, interrupt: Arc<AtomicBool>) -> Result<(), PipelineError> {
    let detector_cfg = deps.detector.get_config();
    let classifier_cfg = deps.classifiers[0].get_config();

    let level1_pool = BufferPool::new(
        BufferPoolConfig {
            min: 2,
            max: 2 + config.input_streams.len(),
            video_info: crate::pool::VideoInfo {
                width: detector_cfg.model_width,
                height: detector_cfg.model_height,
                format: crate::pool::PixelFormat::Rgb,
                alignment: 1,
            },
            memory_bank: 0,
            block_on_empty: true,
        },
        Arc::clone(&deps.frame_alloc),
    )
    .map_err(|source| PipelineError::SharedStageFailed(StageRunError::Engine {
        stream_id: StreamId(u32::MAX),
        source: crate::error::ExternalError::AllocError(source.to_string()),
    }))?;

    let crop_pool = BufferPool::new(
        BufferPoolConfig {
            min: classifier_cfg.batch_size,
            max: classifier_cfg.batch_size * 4,
            video_info: crate::pool::VideoInfo {
                width: classifier_cfg.model_width,
                height: classifier_cfg.model_height,
                format: crate::pool::PixelFormat::Rgb,
                alignment: 1,
            },
            memory_bank: 0,
            block_on_empty: true,
        },
        Arc::clone(&deps.frame_alloc),
    )
    .map_err(|source| PipelineError::SharedStageFailed(StageRunError::Engine {
        stream_id: StreamId(u32::MAX),
        source: crate::error::ExternalError::AllocError(source.to_string()),
    }))?;

    let mut stream_threads: Vec<(StreamId, JoinHandle<Result<(), StageRunError>>)> = Vec::new();
    let mut funnel_inputs = Vec::new();
    let mut defunnel_outputs = Vec::new();
    let mut per_stream_sinks: Vec<(StreamId, std::thread::JoinHandle<Result<(), StageRunError>>)> = Vec::new();
    let mut reporters = Vec::new();

    for (index, stream_cfg) in config.input_streams.iter().enumerate() {
        let stream_id = StreamId(index as u32);
        let codec = match stream_cfg.codec {
            crate::config::CodecKind::H264 => crate::types::Codec::H264,
            crate::config::CodecKind::H265 => crate::types::Codec::H265,
        };

        let (parser_rx, parser_handle) = ParserStage::spawn(
            stream_id,
            ParserStageOptions {
                stream_id,
                path: stream_cfg.path.clone(),
                codec,
                repeat_count: config.repeat_count,
                queue_capacity: Some(8),
                interrupt: Arc::clone(&interrupt),
            },
        )
        .map_err(|err| PipelineError::StreamFailed(stream_id, err))?;
        stream_threads.push((stream_id, parser_handle));

        let (decoder_rx, decoder_handle) = DecoderStage::spawn(
            stream_id,
            DecoderStageOptions {
                stream_id,
                codec,
                input: parser_rx,
                decoder: (deps.make_decoder)(stream_id),
                allocator: Arc::clone(&deps.frame_alloc),
                additional_decoder_buffers: config.additional_decoder_buffers,
                queue_capacity: Some(8),
            },
        )
        .map_err(|err| PipelineError::StreamFailed(stream_id, err))?;
        stream_threads.push((stream_id, decoder_handle));

        let (scaler_rx, scaler_handle) = ScalerStage::spawn(
            stream_id,
            ScalerStageOptions {
                stream_id,
                input: decoder_rx,
                scaler: (deps.make_scaler)(stream_id),
                pool: Arc::clone(&level1_pool),
                dst_width: detector_cfg.model_width,
                dst_height: detector_cfg.model_height,
                ppe: Some(Ppe {
                    mean: detector_cfg.mean_rgb,
                    scale: detector_cfg.scale_rgb,
                }),
                queue_capacity: Some(8),
            },
        )
        .map_err(|err| PipelineError::StreamFailed(stream_id, err))?;
        stream_threads.push((stream_id, scaler_handle));

        funnel_inputs.push((stream_id, scaler_rx));

        let (defunnel_tx, defunnel_rx) = crate::pipeline::make_queue(Some(8));
        defunnel_outputs.push((stream_id, defunnel_tx));

        let (overlay_rx, overlay_handle) = OverlayStage::spawn(
            stream_id,
            OverlayStageOptions {
                stream_id,
                input: defunnel_rx,
                renderer: (deps.make_overlay)(stream_id),
                queue_capacity: Some(8),
            },
        )
        .map_err(|err| PipelineError::StreamFailed(stream_id, err))?;
        stream_threads.push((stream_id, overlay_handle));

        let render_count = Arc::new(AtomicU64::new(0));
        let ((), sink_handle) = SinkStage::spawn(
            stream_id,
            SinkStageOptions {
                stream_id,
                input: overlay_rx,
                sink: (deps.make_sink)(stream_id),
                render_count: Arc::clone(&render_count),
            },
        )
        .map_err(|err| PipelineError::StreamFailed(stream_id, err))?;
        per_stream_sinks.push((stream_id, sink_handle));

        reporters.push(StreamRuntime {
            stream_id,
            render_count,
            started_at: Instant::now(),
        });
    }

    let (funnel_rx, funnel_handle) = Funnel::spawn(
        "shared",
        FunnelOptions {
            inputs: funnel_inputs,
            queue_capacity: Some(16),
        },
    )
    .map_err(PipelineError::SharedStageFailed)?;

    let (detector_rx, detector_handle) = DetectorStage::spawn(
        "shared",
        DetectorStageOptions {
            dpu: deps.detector,
            batch_size: detector_cfg.batch_size,
            batch_timeout: if config.batch_timeout == 0 {
                None
            } else {
                Some(Duration::from_millis(config.batch_timeout))
            },
            input: funnel_rx,
            queue_capacity: Some(16),
        },
    )
    .map_err(PipelineError::SharedStageFailed)?;

    let (crop_rx, crop_handle) = CropScalerStage::spawn(
        "shared",
        CropScalerStageOptions {
            scaler: (deps.make_crop_scaler)(StreamId(u32::MAX)),
            pool: Arc::clone(&crop_pool),
            crop_width: classifier_cfg.model_width,
            crop_height: classifier_cfg.model_height,
            ppe: Some(Ppe {
                mean: classifier_cfg.mean_rgb,
                scale: classifier_cfg.scale_rgb,
            }),
            input: detector_rx,
            queue_capacity: Some(16),
        },
    )
    .map_err(PipelineError::SharedStageFailed)?;

    let mut classifier_input = crop_rx;
    let mut shared_handles = vec![funnel_handle, detector_handle, crop_handle];
    let [color, make, kind] = deps.classifiers;
    for (index, dpu) in [color, make, kind].into_iter().enumerate() {
        let batch_size = dpu.get_config().batch_size;
        let (next_rx, handle) = ClassifierStage::spawn(
            format!("shared-{index}"),
            ClassifierStageOptions {
                dpu,
                batch_size,
                is_last: index == 2,
                input: classifier_input,
                queue_capacity: Some(16),
            },
        )
        .map_err(PipelineError::SharedStageFailed)?;
        classifier_input = next_rx;
        shared_handles.push(handle);
    }

    let (_, defunnel_handle) = DeFunnel::spawn(
        "shared",
        DeFunnelOptions {
            input: classifier_input,
            outputs: defunnel_outputs,
        },
    )
    .map_err(PipelineError::SharedStageFailed)?;
    shared_handles.push(defunnel_handle);

    report_until_done(&reporters, &interrupt, Duration::from_secs(config.fps_display_interval.max(1)), &per_stream_sinks);

    let mut first_error: Option<PipelineError> = None;
    for (stream_id, handle) in stream_threads.into_iter().chain(per_stream_sinks) {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(%stream_id, %err, "stream stage failed");
                first_error.get_or_insert(PipelineError::StreamFailed(stream_id, err));
            }
            Err(_) => {
                first_error.get_or_insert(PipelineError::ThreadPanicked);
            }
        }
    }
    for handle in shared_handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(%err, "shared stage failed");
                first_error.get_or_insert(PipelineError::SharedStageFailed(err));
            }
            Err(_) => {
                first_error.get_or_insert(PipelineError::ThreadPanicked);
            }
        }
    }

    for runtime in &reporters {
        let frames = runtime.render_count.load(Ordering::Relaxed);
        let elapsed = runtime.started_at.elapsed().as_secs_f64();
        let avg_fps = if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 };
        info!(stream = %runtime.stream_id, frames, avg_fps, "stream finished");
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Blocks until every sink thread has finished, logging per-stream FPS
/// every `interval`.
fn report_until_done(
    reporters: &[StreamRuntime],
    interrupt: &Arc<AtomicBool>,
    interval: Duration,
    sinks: &[(StreamId, JoinHandle<Result<(), StageRunError>>)],
) {
    let mut last_counts: Vec<u64> = vec![0; reporters.len()];
    loop {
        std::thread::sleep(interval);
        let all_finished = sinks.iter().all(|(_, handle)| handle.is_finished());
        for (i, runtime) in reporters.iter().enumerate() {
            let count = runtime.render_count.load(Ordering::Relaxed);
            let delta = count.saturating_sub(last_counts[i]);
            let fps = delta as f64 / interval.as_secs_f64();
            info!(stream = %runtime.stream_id, fps, "rolling fps");
            last_counts[i] = count;
        }
        if all_finished || interrupt.load(Ordering::SeqCst) {
            return;
        }
    }
}
