//! Scaler stage: one per input stream. Pre-processes each
//! decoded frame into the level-1 detector's required resolution and
//! color format via the scaler's PPE, leaving the result on
//! `level_1_scaled_buffer`.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{ExternalError, StageRunError};
use crate::external::{Ppe, Rect, ScalerHandle};
use crate::pipeline::{make_queue, PipelineBuffer};
use crate::pool::BufferPool;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{PipelineEvent, StreamId};

pub struct ScalerStageOptions {
    pub stream_id: StreamId,
    pub input: Receiver<PipelineEvent<PipelineBuffer>>,
    pub scaler: Box<dyn ScalerHandle>,
    pub pool: Arc<BufferPool>,
    pub dst_width: u32,
    pub dst_height: u32,
    pub ppe: Option<Ppe>,
    pub queue_capacity: Option<usize>,
}

pub struct ScalerStage {
    stream_id: StreamId,
    input: Receiver<PipelineEvent<PipelineBuffer>>,
    scaler: Box<dyn ScalerHandle>,
    pool: Arc<BufferPool>,
    dst_width: u32,
    dst_height: u32,
    ppe: Option<Ppe>,
    output: Sender<PipelineEvent<PipelineBuffer>>,
}

impl InitializableThread for ScalerStage {
    type InitOptions = ScalerStageOptions;
    type SpawnOutput = Receiver<PipelineEvent<PipelineBuffer>>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = ScalerStage {
            stream_id: options.stream_id,
            input: options.input,
            scaler: options.scaler,
            pool: options.pool,
            dst_width: options.dst_width,
            dst_height: options.dst_height,
            ppe: options.ppe,
            output: sender,
        };
        Ok((stage, receiver))
    }

    fn run(mut self) -> Result<(), Self::RunError> {
        loop {
            let event = match self.input.recv() {
                Ok(event) => event,
                Err(_) => return Ok(()),
            };
            match event {
                PipelineEvent::EOS => {
                    let _ = self.output.send(PipelineEvent::EOS);
                    return Ok(());
                }
                PipelineEvent::Data(mut buffer) => {
                    self.scale(&mut buffer)?;
                    self.output
                        .send(PipelineEvent::Data(buffer))
                        .map_err(|_| StageRunError::OutputClosed {
                            stream_id: self.stream_id,
                        })?;
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "scaler".to_string(),
            thread_instance_name: "stream".to_string(),
        }
    }
}

impl ScalerStage {
    fn scale(&mut self, buffer: &mut PipelineBuffer) -> Result<(), StageRunError> {
        let src_rect = Rect {
            x: 0,
            y: 0,
            w: buffer.main_buffer.frame().width(),
            h: buffer.main_buffer.frame().height(),
        };
        let dst_rect = Rect {
            x: 0,
            y: 0,
            w: self.dst_width,
            h: self.dst_height,
        };
        let mut scaled = self.pool.acquire().ok_or_else(|| StageRunError::Engine {
            stream_id: self.stream_id,
            source: ExternalError::AllocError("level-1 scaler pool exhausted".to_string()),
        })?;
        self.scaler
            .channel_add(src_rect, dst_rect, self.ppe)
            .map_err(|source| StageRunError::Engine {
                stream_id: self.stream_id,
                source,
            })?;
        self.scaler
            .process_frame()
            .map_err(|source| StageRunError::Engine {
                stream_id: self.stream_id,
                source,
            })?;
        scaled.user_data = None;
        buffer.level_1_scaled_buffer = Some(scaled);
        Ok(())
    }
}
