//! Overlay stage: one per input stream, downstream of the
//! de-funnel. Converts a finished prediction tree into overlay primitives
//! and rasterizes them onto the main frame via an external renderer, then
//! frees the tree — the last reader of a tree is always this stage.

use crossbeam_channel::{Receiver, Sender};

use crate::error::StageRunError;
use crate::external::OverlayRenderer;
use crate::pipeline::{make_queue, PipelineBuffer};
use crate::pool::UserData;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{PipelineEvent, StreamId};

pub struct OverlayStageOptions {
    pub stream_id: StreamId,
    pub input: Receiver<PipelineEvent<PipelineBuffer>>,
    pub renderer: Box<dyn OverlayRenderer>,
    pub queue_capacity: Option<usize>,
}

pub struct OverlayStage {
    stream_id: StreamId,
    input: Receiver<PipelineEvent<PipelineBuffer>>,
    renderer: Box<dyn OverlayRenderer>,
    output: Sender<PipelineEvent<PipelineBuffer>>,
}

impl InitializableThread for OverlayStage {
    type InitOptions = OverlayStageOptions;
    type SpawnOutput = Receiver<PipelineEvent<PipelineBuffer>>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = OverlayStage {
            stream_id: options.stream_id,
            input: options.input,
            renderer: options.renderer,
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
                    if let Some(UserData::PredictionTree(tree)) = buffer.main_buffer.user_data.take()
                    {
                        self.renderer
                            .render(&tree, buffer.main_buffer.frame_mut())
                            .map_err(|source| StageRunError::Engine {
                                stream_id: self.stream_id,
                                source,
                            })?;
                    }
                    self.output.send(PipelineEvent::Data(buffer)).map_err(|_| {
                        StageRunError::OutputClosed {
                            stream_id: self.stream_id,
                        }
                    })?;
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "overlay".to_string(),
            thread_instance_name: "stream".to_string(),
        }
    }
}
