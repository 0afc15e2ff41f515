mod assembler;

pub use assembler::{AccessUnitAssembler, AssemblerStep, DecoderConfigChange};
