//! Error taxonomy for the crate: control-flow outcomes
//! (`NeedMoreData`/`SendAgain`/`Eos`) are modeled as plain enum variants
//! returned in `Ok(..)`, never as an `Err`, while only genuine failures
//! derive `thiserror::Error`, one enum per module boundary rather than one
//! crate-wide catch-all.

use crate::types::StreamId;

/// Failures from an opaque external engine (decoder, scaler, DPU, frame
/// allocator) reached through the traits in [`crate::external`]. `Error` is
/// the generic bucket; `AllocError` and `InvalidArgs` get their own variants
/// because stages branch on them specifically (an alloc failure is
/// stage-fatal, an invalid-args call is a caller bug).
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("invalid arguments passed to external engine: {0}")]
    InvalidArgs(String),

    #[error("external engine failed to allocate a resource: {0}")]
    AllocError(String),

    #[error("external engine error: {0}")]
    Error(String),
}

/// Raised by [`crate::pool::BufferPool::new`] when the allocator can't
/// satisfy the pool's `min` buffers up front.
#[derive(Debug, thiserror::Error)]
pub enum PoolInitError {
    #[error("failed to pre-allocate buffer {index} of {min}")]
    Prefill {
        index: usize,
        min: usize,
        #[source]
        source: ExternalError,
    },
}

/// Failure surfaced while a stage's `init` runs, before its thread starts
/// processing. Reported
/// synchronously to the caller of `InitializableThread::spawn` rather than
/// only observable once the thread is already running.
#[derive(Debug, thiserror::Error)]
pub enum StageInitError {
    #[error("failed to open input stream file {path}")]
    OpenInput {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to construct buffer pool")]
    Pool(#[from] PoolInitError),

    #[error("failed to construct external engine handle")]
    Engine(#[from] ExternalError),

    #[error("failed to load DPU model config at {path}")]
    ModelConfig {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure surfaced while a stage's `run` loop is live: `AllocError`/`Error`
/// (from [`ExternalError`]) and I/O failures propagate as a failed stage —
/// the stage sets its error flag, drains and frees its input queue, and
/// forwards a synthetic EOS so downstream stages terminate cleanly rather
/// than hang on a channel that will never receive again.
#[derive(Debug, thiserror::Error)]
pub enum StageRunError {
    #[error("stream {stream_id}: I/O error reading input")]
    Io {
        stream_id: StreamId,
        #[source]
        source: std::io::Error,
    },

    #[error("stream {stream_id}: external engine failure")]
    Engine {
        stream_id: StreamId,
        #[source]
        source: ExternalError,
    },

    #[error("stream {stream_id}: output channel disconnected")]
    OutputClosed { stream_id: StreamId },
}

impl StageRunError {
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            StageRunError::Io { stream_id, .. } => Some(*stream_id),
            StageRunError::Engine { stream_id, .. } => Some(*stream_id),
            StageRunError::OutputClosed { stream_id } => Some(*stream_id),
        }
    }
}

/// Aggregated at the launcher: every stage thread
/// returns `Result<(), StageRunError>`, joined into one process exit
/// status. A shared-stage failure (detector or any classifier) is promoted
/// to a whole-pipeline failure; a per-stream stage failure is scoped to
/// that stream only.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stream {0} failed")]
    StreamFailed(StreamId, #[source] StageRunError),

    #[error("a shared stage failed, tearing down the whole pipeline")]
    SharedStageFailed(#[source] StageRunError),

    #[error("stage thread panicked")]
    ThreadPanicked,
}
