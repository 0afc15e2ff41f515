//! Sink stage: one per input stream, the terminal stage.
//! Writes the main frame to its configured target, releases the main
//! buffer back to its pool, and increments a per-stream render counter the
//! launcher samples periodically for FPS reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::error::StageRunError;
use crate::external::FrameSink;
use crate::pipeline::PipelineBuffer;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{PipelineEvent, StreamId};

pub struct SinkStageOptions {
    pub stream_id: StreamId,
    pub input: Receiver<PipelineEvent<PipelineBuffer>>,
    pub sink: Box<dyn FrameSink>,
    /// Shared with the launcher; the
    /// launcher reads this alongside the stream's start timestamp to
    /// report rolling/average FPS.
    pub render_count: Arc<AtomicU64>,
}

pub struct SinkStage {
    stream_id: StreamId,
    input: Receiver<PipelineEvent<PipelineBuffer>>,
    sink: Box<dyn FrameSink>,
    render_count: Arc<AtomicU64>,
}

impl InitializableThread for SinkStage {
    type InitOptions = SinkStageOptions;
    type SpawnOutput = ();
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let stage = SinkStage {
            stream_id: options.stream_id,
            input: options.input,
            sink: options.sink,
            render_count: options.render_count,
        };
        Ok((stage, ()))
    }

    fn run(mut self) -> Result<(), Self::RunError> {
        loop {
            let event = match self.input.recv() {
                Ok(event) => event,
                Err(_) => return Ok(()),
            };
            match event {
                PipelineEvent::EOS => return Ok(()),
                PipelineEvent::Data(buffer) => {
                    self.sink
                        .write(buffer.main_buffer.frame())
                        .map_err(|source| StageRunError::Engine {
                            stream_id: self.stream_id,
                            source,
                        })?;
                    self.render_count.fetch_add(1, Ordering::Relaxed);
                    // `buffer` drops here: the main buffer returns to its
                    // pool and any leftover crop buffers (there should be
                    // none past the last classifier) with it.
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "sink".to_string(),
            thread_instance_name: "stream".to_string(),
        }
    }
}
