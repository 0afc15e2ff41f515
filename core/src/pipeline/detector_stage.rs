//! Detector stage: the first shared stage after the
//! funnel. Batches pipeline buffers by model batch size or a timeout
//! since the first frame of the batch, runs the DPU's object detector on
//! the level-1 scaled buffers, rescales and attaches the resulting
//! prediction trees, and forwards buffers in arrival order followed by
//! any `StreamEos` markers observed while the batch was assembling.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::StageRunError;
use crate::external::DpuHandle;
use crate::pipeline::{make_queue, PipelineBuffer, SharedEvent};
use crate::pool::UserData;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::StreamId;

pub struct DetectorStageOptions {
    pub dpu: Box<dyn DpuHandle>,
    pub batch_size: usize,
    /// `None` means wait indefinitely for a batch to fill.
    pub batch_timeout: Option<Duration>,
    pub input: Receiver<SharedEvent>,
    pub queue_capacity: Option<usize>,
}

pub struct DetectorStage {
    dpu: Box<dyn DpuHandle>,
    batch_size: usize,
    batch_timeout: Option<Duration>,
    input: Receiver<SharedEvent>,
    output: Sender<SharedEvent>,
}

impl InitializableThread for DetectorStage {
    type InitOptions = DetectorStageOptions;
    type SpawnOutput = Receiver<SharedEvent>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = DetectorStage {
            dpu: options.dpu,
            batch_size: options.batch_size.max(1),
            batch_timeout: options.batch_timeout,
            input: options.input,
            output: sender,
        };
        Ok((stage, receiver))
    }

    fn run(mut self) -> Result<(), Self::RunError> {
        loop {
            let mut batch: Vec<PipelineBuffer> = Vec::new();
            let mut held_eos: Vec<StreamId> = Vec::new();
            let mut deadline: Option<Instant> = None;
            let pipeline_ended = loop {
                let remaining = match (self.batch_timeout, deadline) {
                    (Some(timeout), Some(start)) => {
                        Some(timeout.saturating_sub(start.elapsed()))
                    }
                    _ => None,
                };
                let event = match remaining {
                    Some(remaining) => self.input.recv_timeout(remaining),
                    None => self.input.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match event {
                    Ok(SharedEvent::Data(buffer)) => {
                        if batch.is_empty() {
                            deadline = Some(Instant::now());
                        }
                        batch.push(buffer);
                        if batch.len() >= self.batch_size {
                            break false;
                        }
                    }
                    Ok(SharedEvent::StreamEos(id)) => held_eos.push(id),
                    Ok(SharedEvent::PipelineEos) => break true,
                    Err(RecvTimeoutError::Timeout) => break false,
                    Err(RecvTimeoutError::Disconnected) => break true,
                }
            };

            self.dispatch(batch)?;
            for id in held_eos {
                self.send(SharedEvent::StreamEos(id))?;
            }
            if pipeline_ended {
                self.send(SharedEvent::PipelineEos)?;
                return Ok(());
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "detector".to_string(),
            thread_instance_name: "pipeline".to_string(),
        }
    }
}

impl DetectorStage {
    fn send(&self, event: SharedEvent) -> Result<(), StageRunError> {
        self.output
            .send(event)
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: StreamId(u32::MAX),
            })
    }

    fn dispatch(&mut self, mut batch: Vec<PipelineBuffer>) -> Result<(), StageRunError> {
        if batch.is_empty() {
            return Ok(());
        }
        let inputs: Vec<_> = batch
            .iter()
            .map(|b| {
                b.level_1_scaled_buffer
                    .as_ref()
                    .expect("detector input missing level-1 scaled buffer")
                    .frame()
                    .clone()
            })
            .collect();
        let trees = self
            .dpu
            .process_detections(&inputs)
            .map_err(|source| StageRunError::Engine {
                stream_id: batch[0].stream_id,
                source,
            })?;
        for (buffer, mut tree) in batch.iter_mut().zip(trees) {
            let scaled = buffer
                .level_1_scaled_buffer
                .as_ref()
                .expect("detector input missing level-1 scaled buffer")
                .frame();
            let (from_w, from_h) = (scaled.width() as f32, scaled.height() as f32);
            let (to_w, to_h) = (
                buffer.main_buffer.frame().width() as f32,
                buffer.main_buffer.frame().height() as f32,
            );
            tree.rescale_all(from_w, from_h, to_w, to_h);
            buffer.main_buffer.user_data = Some(UserData::PredictionTree(tree));
            buffer.level_1_scaled_buffer = None;
        }
        for buffer in batch {
            self.send(SharedEvent::Data(buffer))?;
        }
        Ok(())
    }
}
