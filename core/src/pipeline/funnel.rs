//! Funnel and de-funnel: fair N-to-1 merge ahead of the
//! shared detector/classifier stages, and 1-to-N demultiplex by
//! `stream_id` afterwards.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::StageRunError;
use crate::pipeline::{make_queue, PipelineBuffer, SharedEvent};
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{PipelineEvent, StreamId};

/// Chosen to roughly match 30fps frame cadence.
pub const FUNNEL_WAIT_TIME: Duration = Duration::from_millis(36);

pub struct FunnelOptions {
    pub inputs: Vec<(StreamId, Receiver<PipelineEvent<PipelineBuffer>>)>,
    pub queue_capacity: Option<usize>,
}

pub struct Funnel {
    inputs: Vec<(StreamId, Receiver<PipelineEvent<PipelineBuffer>>)>,
    output: Sender<SharedEvent>,
}

impl InitializableThread for Funnel {
    type InitOptions = FunnelOptions;
    type SpawnOutput = Receiver<SharedEvent>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = Funnel {
            inputs: options.inputs,
            output: sender,
        };
        Ok((stage, receiver))
    }

    fn run(mut self) -> Result<(), Self::RunError> {
        let mut index = 0usize;
        while !self.inputs.is_empty() {
            index %= self.inputs.len();
            let (stream_id, recv_result) = {
                let (stream_id, rx) = &self.inputs[index];
                let recv_result = match rx.try_recv() {
                    Ok(event) => Ok(event),
                    Err(crossbeam_channel::TryRecvError::Empty) => {
                        rx.recv_timeout(FUNNEL_WAIT_TIME)
                    }
                    Err(crossbeam_channel::TryRecvError::Disconnected) => {
                        Err(RecvTimeoutError::Disconnected)
                    }
                };
                (*stream_id, recv_result)
            };
            match recv_result {
                Ok(PipelineEvent::Data(buffer)) => {
                    self.send(SharedEvent::Data(buffer))?;
                    index += 1;
                }
                Ok(PipelineEvent::EOS) | Err(RecvTimeoutError::Disconnected) => {
                    self.inputs.remove(index);
                    if self.inputs.is_empty() {
                        self.send(SharedEvent::PipelineEos)?;
                        return Ok(());
                    }
                    self.send(SharedEvent::StreamEos(stream_id))?;
                }
                Err(RecvTimeoutError::Timeout) => {
                    index += 1;
                }
            }
        }
        Ok(())
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "funnel".to_string(),
            thread_instance_name: "pipeline".to_string(),
        }
    }
}

impl Funnel {
    fn send(&self, event: SharedEvent) -> Result<(), StageRunError> {
        self.output
            .send(event)
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: StreamId(u32::MAX),
            })
    }
}

pub struct DeFunnelOptions {
    pub input: Receiver<SharedEvent>,
    pub outputs: Vec<(StreamId, Sender<PipelineEvent<PipelineBuffer>>)>,
}

pub struct DeFunnel {
    input: Receiver<SharedEvent>,
    outputs: Vec<(StreamId, Sender<PipelineEvent<PipelineBuffer>>)>,
}

impl InitializableThread for DeFunnel {
    type InitOptions = DeFunnelOptions;
    type SpawnOutput = ();
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let stage = DeFunnel {
            input: options.input,
            outputs: options.outputs,
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
                SharedEvent::Data(buffer) => {
                    let stream_id = buffer.stream_id;
                    if let Some((_, tx)) = self.outputs.iter().find(|(id, _)| *id == stream_id) {
                        let _ = tx.send(PipelineEvent::Data(buffer));
                    }
                }
                SharedEvent::StreamEos(stream_id) => {
                    self.outputs.retain(|(id, tx)| {
                        if *id == stream_id {
                            let _ = tx.send(PipelineEvent::EOS);
                            false
                        } else {
                            true
                        }
                    });
                }
                SharedEvent::PipelineEos => {
                    for (_, tx) in &self.outputs {
                        let _ = tx.send(PipelineEvent::EOS);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "de-funnel".to_string(),
            thread_instance_name: "pipeline".to_string(),
        }
    }
}
