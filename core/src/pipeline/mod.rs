//! The staged inference graph: parser → decoder →
//! scaler → funnel → detector → crop-scaler → 3× classifier → de-funnel →
//! overlay → sink, one OS thread per stage per stream for the per-stream
//! stages and one thread for each shared stage, wired together with
//! `crossbeam_channel` queues.

use crossbeam_channel::{Receiver, Sender};

use crate::pool::VideoBuffer;
use crate::types::StreamId;

pub mod classifier_stage;
pub mod crop_scaler_stage;
pub mod decoder_stage;
pub mod detector_stage;
pub mod funnel;
pub mod launcher;
pub mod overlay_stage;
pub mod parser_stage;
pub mod scaler_stage;
pub mod sink_stage;

/// `PipelineBuffer`: the per-frame envelope carried from the
/// decoder through to the sink. The three buffer slots are progressively
/// deeper work products; end-of-stream is not a field here because it is
/// carried by the channel's item type instead
/// (`PipelineEvent<PipelineBuffer>` per-stream, [`SharedEvent`] between the
/// funnel and de-funnel) — see the module doc on [`crate::types::PipelineEvent`].
pub struct PipelineBuffer {
    pub stream_id: StreamId,
    pub main_buffer: VideoBuffer,
    pub level_1_scaled_buffer: Option<VideoBuffer>,
    pub level_2_cropped_buffers: Vec<VideoBuffer>,
}

impl PipelineBuffer {
    pub fn new(stream_id: StreamId, main_buffer: VideoBuffer) -> Self {
        Self {
            stream_id,
            main_buffer,
            level_1_scaled_buffer: None,
            level_2_cropped_buffers: Vec::new(),
        }
    }
}

/// What flows between the funnel and de-funnel: ordinary
/// payload, a single stream's end marker, or the whole-pipeline end marker
/// broadcast once every stream has finished. Kept as its own type rather
/// than folding a third state into [`crate::types::PipelineEvent`] so a
/// shared stage can never mistake one stream ending for the whole pipeline
/// ending.
pub enum SharedEvent {
    Data(PipelineBuffer),
    StreamEos(StreamId),
    PipelineEos,
}

/// Builds a stage-to-stage queue: `None` capacity is an
/// unbounded queue, `Some(n)` a bounded one
/// that blocks `send` when full.
pub(crate) fn make_queue<T>(capacity: Option<usize>) -> (Sender<T>, Receiver<T>) {
    match capacity {
        Some(n) => crossbeam_channel::bounded(n),
        None => crossbeam_channel::unbounded(),
    }
}
