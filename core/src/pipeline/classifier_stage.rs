//! One stage of the three-stage classifier cascade: color,
//! make, and type classifiers run in sequence as three instances of this
//! same stage, each wired to its own DPU handle. Crop buffers are batched
//! across adjacent pipeline buffers up to the model's batch size; a
//! pipeline buffer whose crops don't all fit in one batch straddles into
//! the next. Order of pipeline buffers is preserved: a buffer only
//! forwards once every one of its crops has been classified by this
//! stage, so a pipeline buffer with no detections at all still waits
//! behind an older buffer whose crops are still being batched.
//!
//! The "no-object forwards" piling up behind a slow-to-fill batch is
//! exactly the hazard the early-flush safety margin below guards
//! against: those waiting buffers hold no crop buffers themselves, but the
//! buffer *ahead* of them in the queue does, and that buffer's crops were
//! drawn from the crop-scaler's pool. If nothing ever forces a partial
//! batch to flush, buffers queue up indefinitely while the crop pool — a
//! small fixed-size pool shared by every stream — never gets its buffers
//! back, so the crop-scaler stage's own `pool.acquire()` eventually blocks
//! forever. Flushing early once enough buffers are waiting purely on
//! order (not on having crops of their own) breaks that cycle at the cost
//! of an occasional under-full batch.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender};

use crate::error::StageRunError;
use crate::external::DpuHandle;
use crate::pipeline::{make_queue, PipelineBuffer, SharedEvent};
use crate::pool::UserData;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::StreamId;

struct PendingBuffer {
    buffer: PipelineBuffer,
    next_crop: usize,
}

pub struct ClassifierStageOptions {
    pub dpu: Box<dyn DpuHandle>,
    pub batch_size: usize,
    /// Set only on the last classifier in the cascade (type): it frees a
    /// pipeline buffer's crop-buffer list once every crop has been
    /// classified.
    pub is_last: bool,
    pub input: Receiver<SharedEvent>,
    pub queue_capacity: Option<usize>,
}

pub struct ClassifierStage {
    dpu: Box<dyn DpuHandle>,
    batch_size: usize,
    is_last: bool,
    input: Receiver<SharedEvent>,
    output: Sender<SharedEvent>,
    queue: VecDeque<PendingBuffer>,
    held_eos: Vec<SharedEvent>,
}

impl InitializableThread for ClassifierStage {
    type InitOptions = ClassifierStageOptions;
    type SpawnOutput = Receiver<SharedEvent>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = ClassifierStage {
            dpu: options.dpu,
            batch_size: options.batch_size.max(1),
            is_last: options.is_last,
            input: options.input,
            output: sender,
            queue: VecDeque::new(),
            held_eos: Vec::new(),
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
                SharedEvent::Data(buffer) => {
                    self.queue.push_back(PendingBuffer {
                        buffer,
                        next_crop: 0,
                    });
                    while self.try_dispatch_batch()? {}
                    self.flush_ready_front()?;
                }
                SharedEvent::StreamEos(id) => {
                    self.held_eos.push(SharedEvent::StreamEos(id));
                    self.flush_ready_front()?;
                }
                SharedEvent::PipelineEos => {
                    loop {
                        if self.pending_crops() == 0 {
                            break;
                        }
                        self.dispatch_now()?;
                        self.flush_ready_front()?;
                    }
                    for eos in self.held_eos.drain(..) {
                        self.send(eos)?;
                    }
                    self.send(SharedEvent::PipelineEos)?;
                    return Ok(());
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "classifier".to_string(),
            thread_instance_name: "pipeline".to_string(),
        }
    }
}

impl ClassifierStage {
    fn send(&self, event: SharedEvent) -> Result<(), StageRunError> {
        self.output
            .send(event)
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: StreamId(u32::MAX),
            })
    }

    fn pending_crops(&self) -> usize {
        self.queue
            .iter()
            .map(|p| p.buffer.level_2_cropped_buffers.len().saturating_sub(p.next_crop))
            .sum()
    }

    /// Buffers other than the one currently being straddled that are
    /// waiting purely on order, not on having crops left themselves.
    fn cached_no_object_count(&self) -> usize {
        self.queue
            .iter()
            .skip(1)
            .filter(|p| p.buffer.level_2_cropped_buffers.is_empty())
            .count()
    }

    fn try_dispatch_batch(&mut self) -> Result<bool, StageRunError> {
        let pending = self.pending_crops();
        if pending == 0 {
            return Ok(false);
        }
        if pending < self.batch_size && self.cached_no_object_count() < self.batch_size {
            return Ok(false);
        }
        self.dispatch_now()?;
        Ok(true)
    }

    fn dispatch_now(&mut self) -> Result<(), StageRunError> {
        let mut frames = Vec::new();
        let mut targets: Vec<(usize, usize)> = Vec::new();
        'outer: for (qi, pending) in self.queue.iter().enumerate() {
            for ci in pending.next_crop..pending.buffer.level_2_cropped_buffers.len() {
                if frames.len() >= self.batch_size {
                    break 'outer;
                }
                frames.push(pending.buffer.level_2_cropped_buffers[ci].frame().clone());
                targets.push((qi, ci));
            }
        }
        if frames.is_empty() {
            return Ok(());
        }
        let stream_id = self.queue[targets[0].0].buffer.stream_id;
        let results = self
            .dpu
            .process_classifications(&frames)
            .map_err(|source| StageRunError::Engine { stream_id, source })?;

        for ((qi, ci), result) in targets.into_iter().zip(results) {
            let pending = &mut self.queue[qi];
            let node_idx = pending.buffer.level_2_cropped_buffers[ci]
                .user_data
                .as_ref()
                .and_then(UserData::as_crop_source_node)
                .expect("crop buffer missing its source prediction node");
            if let Some(tree) = pending
                .buffer
                .main_buffer
                .user_data
                .as_mut()
                .and_then(UserData::as_tree_mut)
            {
                tree.push_classification(
                    node_idx,
                    result.class_id,
                    result.class_prob,
                    result.class_label,
                );
            }
            pending.next_crop = ci + 1;
        }

        if self.is_last {
            for pending in &mut self.queue {
                if pending.next_crop >= pending.buffer.level_2_cropped_buffers.len() {
                    pending.buffer.level_2_cropped_buffers.clear();
                    pending.next_crop = 0;
                }
            }
        }
        Ok(())
    }

    fn flush_ready_front(&mut self) -> Result<(), StageRunError> {
        while let Some(front) = self.queue.front() {
            if front.next_crop >= front.buffer.level_2_cropped_buffers.len() {
                let pending = self.queue.pop_front().expect("front just checked");
                self.send(SharedEvent::Data(pending.buffer))?;
            } else {
                break;
            }
        }
        if self.queue.is_empty() {
            for eos in self.held_eos.drain(..) {
                self.send(eos)?;
            }
        }
        Ok(())
    }
}
