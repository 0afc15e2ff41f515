//! Crop-scaler stage: for every level-1 detection on an
//! arriving pipeline buffer, crops the object's bbox out of the main
//! frame and scales it to the classifier cascade's input resolution,
//! attaching the source prediction node to the crop buffer's `user_data`
//! so the classifiers can write attributes back without a side table.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::error::{ExternalError, StageRunError};
use crate::external::{Ppe, Rect, ScalerHandle};
use crate::pipeline::{make_queue, SharedEvent};
use crate::pool::{BufferPool, UserData};
use crate::prediction::BBox;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::StreamId;

pub struct CropScalerStageOptions {
    pub scaler: Box<dyn ScalerHandle>,
    pub pool: Arc<BufferPool>,
    pub crop_width: u32,
    pub crop_height: u32,
    pub ppe: Option<Ppe>,
    pub input: Receiver<SharedEvent>,
    pub queue_capacity: Option<usize>,
}

pub struct CropScalerStage {
    scaler: Box<dyn ScalerHandle>,
    pool: Arc<BufferPool>,
    crop_width: u32,
    crop_height: u32,
    ppe: Option<Ppe>,
    input: Receiver<SharedEvent>,
    output: Sender<SharedEvent>,
}

impl InitializableThread for CropScalerStage {
    type InitOptions = CropScalerStageOptions;
    type SpawnOutput = Receiver<SharedEvent>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = CropScalerStage {
            scaler: options.scaler,
            pool: options.pool,
            crop_width: options.crop_width,
            crop_height: options.crop_height,
            ppe: options.ppe,
            input: options.input,
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
                SharedEvent::Data(mut buffer) => {
                    let stream_id = buffer.stream_id;
                    self.crop(&mut buffer, stream_id)?;
                    self.send(SharedEvent::Data(buffer))?;
                }
                other => self.send(other)?,
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "crop-scaler".to_string(),
            thread_instance_name: "pipeline".to_string(),
        }
    }
}

impl CropScalerStage {
    fn send(&self, event: SharedEvent) -> Result<(), StageRunError> {
        self.output
            .send(event)
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: StreamId(u32::MAX),
            })
    }

    fn crop(
        &mut self,
        buffer: &mut crate::pipeline::PipelineBuffer,
        stream_id: StreamId,
    ) -> Result<(), StageRunError> {
        let nodes: Vec<(usize, BBox)> = buffer
            .main_buffer
            .user_data
            .as_ref()
            .and_then(UserData::as_tree)
            .map(|tree| {
                tree.level_1_nodes()
                    .iter()
                    .map(|&idx| (idx, tree.node(idx).bbox))
                    .collect()
            })
            .unwrap_or_default();

        if nodes.is_empty() {
            return Ok(());
        }

        for (node_idx, bbox) in nodes {
            let src_rect = Rect {
                x: bbox.x.max(0.0) as u32,
                y: bbox.y.max(0.0) as u32,
                w: bbox.w.max(0.0) as u32,
                h: bbox.h.max(0.0) as u32,
            };
            let dst_rect = Rect {
                x: 0,
                y: 0,
                w: self.crop_width,
                h: self.crop_height,
            };
            let mut crop = self.pool.acquire().ok_or_else(|| StageRunError::Engine {
                stream_id,
                source: ExternalError::AllocError("crop buffer pool exhausted".to_string()),
            })?;
            self.scaler
                .channel_add(src_rect, dst_rect, self.ppe)
                .map_err(|source| StageRunError::Engine { stream_id, source })?;
            crop.user_data = Some(UserData::CropSourceNode(node_idx));
            buffer.level_2_cropped_buffers.push(crop);
        }

        self.scaler
            .process_frame()
            .map_err(|source| StageRunError::Engine { stream_id, source })
    }
}
