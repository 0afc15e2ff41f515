//! Parser stage: one per input stream. Reads fixed-size
//! chunks from a file, drives an [`AccessUnitAssembler`], and emits one
//! [`ParsedAccessUnit`] per access unit with a `dec_cfg` sidecar exactly
//! when stream parameters changed since the last emission.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::au::{AccessUnitAssembler, AssemblerStep, DecoderConfigChange};
use crate::error::StageRunError;
use crate::pipeline::make_queue;
use crate::thread_utils::{InitializableThread, ThreadMetadata};
use crate::types::{Codec, StreamId};

const CHUNK_SIZE: usize = 64 * 1024;

pub struct ParsedAccessUnit {
    pub stream_id: StreamId,
    pub bytes: Vec<u8>,
    pub dec_cfg: Option<DecoderConfigChange>,
}

pub struct ParserStageOptions {
    pub stream_id: StreamId,
    pub path: PathBuf,
    pub codec: Codec,
    pub repeat_count: u32,
    pub queue_capacity: Option<usize>,
    pub interrupt: Arc<AtomicBool>,
}

pub struct ParserStage {
    stream_id: StreamId,
    path: PathBuf,
    codec: Codec,
    repeat_count: u32,
    interrupt: Arc<AtomicBool>,
    output: Sender<crate::types::PipelineEvent<ParsedAccessUnit>>,
}

impl InitializableThread for ParserStage {
    type InitOptions = ParserStageOptions;
    type SpawnOutput = Receiver<crate::types::PipelineEvent<ParsedAccessUnit>>;
    type SpawnError = StageRunError;
    type RunError = StageRunError;

    fn init(options: Self::InitOptions) -> Result<(Self, Self::SpawnOutput), Self::SpawnError> {
        let (sender, receiver) = make_queue(options.queue_capacity);
        let stage = ParserStage {
            stream_id: options.stream_id,
            path: options.path,
            codec: options.codec,
            repeat_count: options.repeat_count.max(1),
            interrupt: options.interrupt,
            output: sender,
        };
        Ok((stage, receiver))
    }

    fn run(self) -> Result<(), Self::RunError> {
        let stream_id = self.stream_id;
        for _iteration in 0..self.repeat_count {
            let mut file = File::open(&self.path).map_err(|source| StageRunError::Io {
                stream_id,
                source,
            })?;
            let mut assembler = AccessUnitAssembler::new(self.codec);
            let mut chunk = vec![0u8; CHUNK_SIZE];
            loop {
                if self.interrupt.load(Ordering::SeqCst) {
                    self.emit_eos()?;
                    return Ok(());
                }
                let read = file.read(&mut chunk).map_err(|source| StageRunError::Io {
                    stream_id,
                    source,
                })?;
                if read == 0 {
                    for (au, dec_cfg) in assembler.flush() {
                        self.emit_au(au, dec_cfg)?;
                    }
                    break;
                }
                for step in assembler.push(&chunk[..read]) {
                    if let AssemblerStep::AccessUnit(au, dec_cfg) = step {
                        self.emit_au(au, dec_cfg)?;
                    }
                }
            }
        }
        // repeat_count rewinds and rebuilds parser state but never re-emits
        // EOS between iterations; only the final pass does.
        self.emit_eos()
    }

    fn metadata() -> ThreadMetadata {
        ThreadMetadata {
            thread_name: "parser".to_string(),
            thread_instance_name: "stream".to_string(),
        }
    }
}

impl ParserStage {
    fn emit_au(&self, bytes: Vec<u8>, dec_cfg: Option<DecoderConfigChange>) -> Result<(), StageRunError> {
        let parsed = ParsedAccessUnit {
            stream_id: self.stream_id,
            bytes,
            dec_cfg,
        };
        self.output
            .send(crate::types::PipelineEvent::Data(parsed))
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: self.stream_id,
            })
    }

    fn emit_eos(&self) -> Result<(), StageRunError> {
        self.output
            .send(crate::types::PipelineEvent::EOS)
            .map_err(|_| StageRunError::OutputClosed {
                stream_id: self.stream_id,
            })
    }
}
