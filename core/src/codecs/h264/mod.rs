mod parser;
mod pps;
mod slice;
mod sps;

pub use parser::{H264FrameBoundary, H264Parser};
pub use pps::H264Pps;
pub use slice::H264SliceHeader;
pub use sps::H264Sps;

/// Table 7-1 `nal_unit_type` values this crate cares about; everything else
/// passes through the assembler unparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum H264NaluType {
    Unspecified = 0,
    NonIdrSlice = 1,
    PartitionA = 2,
    PartitionB = 3,
    PartitionC = 4,
    IdrSlice = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    Aud = 9,
    EndOfSeq = 10,
    EndOfStream = 11,
    FillerData = 12,
    SpsExt = 13,
    Prefix = 14,
    SubsetSps = 15,
}

impl H264NaluType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use H264NaluType::*;
        Some(match v {
            0 => Unspecified,
            1 => NonIdrSlice,
            2 => PartitionA,
            3 => PartitionB,
            4 => PartitionC,
            5 => IdrSlice,
            6 => Sei,
            7 => Sps,
            8 => Pps,
            9 => Aud,
            10 => EndOfSeq,
            11 => EndOfStream,
            12 => FillerData,
            13 => SpsExt,
            14 => Prefix,
            15 => SubsetSps,
            _ => return None,
        })
    }

    pub fn is_vcl(self) -> bool {
        matches!(
            self,
            H264NaluType::NonIdrSlice
                | H264NaluType::PartitionA
                | H264NaluType::PartitionB
                | H264NaluType::PartitionC
                | H264NaluType::IdrSlice
        )
    }
}
