//! Decoder stage: one per input stream. Owns the decoder
//! handle and a second buffer pool sized from the decoder's own reported
//! minimum. Configures on the first access unit (or whenever `dec_cfg`
//! arrives), submits access units paired with free output buffers, and
//! collects decoded frames into [`PipelineBuffer`]s.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::error::StageRunError;
use crate::external::{
    DecodedOutcome, DecoderHandle, DecoderInCfg, FrameAlloc, SubmitOutcome,
};
use crate::pipeline::parser_stage::ParsedAccessUnit;
use crate::pipeline::{make_queue, PipelineBuffer};
use crate::pool::{BufferPool, BufferPoolConfig};
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{Codec, PipelineEvent, StreamId};

/// 4K @ 60fps, the reference pixel rate the resubmit-wait formula scales against.
const REFERENCE_PIXEL_RATE: u64 = 3840 * 2160 * 60;
const BASE_RESUBMIT_US: u64 = 15_000_000;
const MIN_RESUBMIT_US: u64 = 1_000;
const MAX_RESUBMIT_US: u64 = 100_000;

fn resubmit_timeout(resolution: crate::types::Resolution, framerate: Option<crate::types::Framerate>) -> Duration {
    let fps = framerate
        .filter(|fr| fr.den != 0)
        .map(|fr| fr.num as f64 / fr.den as f64)
        .unwrap_or(30.0);
    let pixel_rate = (resolution.width as f64) * (resolution.height as f64) * fps;
    if pixel_rate <= 0.0 {
        return Duration::from_micros(BASE_RESUBMIT_US / 1000);
    }
    let us = (BASE_RESUBMIT_US as f64 * pixel_rate / REFERENCE_PIXEL_RATE as f64) as u64;
    Duration::from_micros(us.clamp(MIN_RESUBMIT_US, MAX_RESUBMIT_US))
}

pub struct DecoderStageOptions {
    pub stream_id: StreamId,
    pub codec: Codec,
    pub input: Receiver<PipelineEvent<ParsedAccessUnit>>,
    pub decoder: Box<dyn DecoderHandle>,
    pub allocator: Arc<dyn FrameAlloc>,
    pub additional_decoder_buffers: usize,
    pub queue_capacity: Option<usize>,
}

pub struct DecoderStage {
    stream_id: StreamId,
    codec: Codec,
    input: Receiver<PipelineEvent<ParsedAccessUnit>>,
    decoder: Box<dyn DecoderHandle>,
    allocator: Arc<dyn FrameAlloc>,
    additional_decoder_buffers: usize,
    output: Sender<PipelineEvent<PipelineBuffer>>,
    pool: Option<Arc<BufferPool>>,
    release_rx: Option<crossbeam_channel::Receiver<()>>,
    last_resolution: crate::types::Resolution,
    last_framerate: Option<crate::types::Framerate>,
}

impl InitializableThread for DecoderStage {
    type InitOptions = DecoderStageOptions;
    type SpawnOutput = Receiver<PipelineEvent<PipelineBuffer>>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = DecoderStage {
            stream_id: options.stream_id,
            codec: options.codec,
            input: options.input,
            decoder: options.decoder,
            allocator: options.allocator,
            additional_decoder_buffers: options.additional_decoder_buffers,
            output: sender,
            pool: None,
            release_rx: None,
            last_resolution: crate::types::Resolution { width: 0, height: 0 },
            last_framerate: None,
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
                    self.drain_decoded()?;
                    let _ = self.output.send(PipelineEvent::EOS);
                    return Ok(());
                }
                PipelineEvent::Data(au) => {
                    if let Some(cfg) = au.dec_cfg {
                        self.reconfigure(cfg)?;
                    }
                    self.submit_and_collect(&au.bytes)?;
                }
            }
        }
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "decoder".to_string(),
            thread_instance_name: "stream".to_string(),
        }
    }
}

impl DecoderStage {
    fn engine_err(&self, source: crate::error::ExternalError) -> StageRunError {
        StageRunError::Engine {
            stream_id: self.stream_id,
            source,
        }
    }

    fn reconfigure(
        &mut self,
        cfg: crate::au::DecoderConfigChange,
    ) -> Result<(), StageRunError> {
        self.last_resolution = cfg.resolution;
        self.last_framerate = cfg.framerate;
        let in_cfg = DecoderInCfg {
            codec: self.codec,
            profile_idc: cfg.profile_idc,
            level_idc: cfg.level_idc,
            bit_depth_luma_minus8: cfg.bit_depth_luma_minus8,
            resolution: cfg.resolution,
            framerate: cfg.framerate,
        };
        let out_cfg = self
            .decoder
            .configure(&in_cfg)
            .map_err(|e| self.engine_err(e))?;
        let pool = BufferPool::new(
            BufferPoolConfig {
                min: out_cfg.min_out_buf + self.additional_decoder_buffers,
                max: out_cfg.min_out_buf + self.additional_decoder_buffers,
                video_info: out_cfg.video_info,
                memory_bank: out_cfg.mem_bank_id,
                block_on_empty: false,
            },
            Arc::clone(&self.allocator),
        )
        .map_err(|e| StageRunError::Engine {
            stream_id: self.stream_id,
            source: crate::error::ExternalError::AllocError(e.to_string()),
        })?;
        let (release_tx, release_rx) = crossbeam_channel::bounded(8);
        pool.set_release_notify(release_tx);
        self.pool = Some(pool);
        self.release_rx = Some(release_rx);
        Ok(())
    }

    fn submit_and_collect(&mut self, au: &[u8]) -> Result<(), StageRunError> {
        let mut first = true;
        loop {
            let pool = self.pool.clone().expect("decoder submitted before configure");
            let free_buffer = pool.acquire().into_iter().collect::<Vec<_>>();
            let input = if first { Some(au) } else { None };
            let outcome = self
                .decoder
                .submit(input, free_buffer)
                .map_err(|e| self.engine_err(e))?;
            first = false;
            match outcome {
                SubmitOutcome::Accepted => break,
                SubmitOutcome::Eos => return self.drain_decoded(),
                SubmitOutcome::SendAgain => {
                    let timeout = resubmit_timeout(self.last_resolution, self.last_framerate);
                    if let Some(rx) = &self.release_rx {
                        let _ = rx.recv_timeout(timeout);
                    } else {
                        std::thread::sleep(timeout);
                    }
                }
            }
        }
        self.drain_decoded()
    }

    fn drain_decoded(&mut self) -> Result<(), StageRunError> {
        loop {
            match self.decoder.get_decoded().map_err(|e| self.engine_err(e))? {
                DecodedOutcome::NeedMoreData => return Ok(()),
                DecodedOutcome::Eos => return Ok(()),
                DecodedOutcome::Frame(buffer) => {
                    let pipeline_buffer = PipelineBuffer::new(self.stream_id, buffer);
                    self.output
                        .send(PipelineEvent::Data(pipeline_buffer))
                        .map_err(|_| StageRunError::OutputClosed {
                            stream_id: self.stream_id,
                        })?;
                }
            }
        }
    }
}
