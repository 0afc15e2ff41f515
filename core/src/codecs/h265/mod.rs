mod parser;
mod short_term_rps;
mod slice;
mod sps;
mod vps;

pub use parser::{H265FrameBoundary, H265Parser};
pub use slice::H265SliceHeader;
pub use sps::H265Sps;
pub use vps::H265Vps;

/// Table 7-1 `nal_unit_type` values this crate cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum H265NaluType {
    TrailN = 0,
    TrailR = 1,
    TsaN = 2,
    TsaR = 3,
    StsaN = 4,
    StsaR = 5,
    RadlN = 6,
    RadlR = 7,
    RaslN = 8,
    RaslR = 9,
    BlaWLp = 16,
    BlaWRadl = 17,
    BlaNLp = 18,
    IdrWRadl = 19,
    IdrNLp = 20,
    CraNut = 21,
    Vps = 32,
    Sps = 33,
    Pps = 34,
    Aud = 35,
    EosNut = 36,
    EobNut = 37,
    FdNut = 38,
    SeiPrefix = 39,
    SeiSuffix = 40,
}

impl H265NaluType {
    pub fn from_u8(v: u8) -> Option<Self> {
        use H265NaluType::*;
        Some(match v {
            0 => TrailN,
            1 => TrailR,
            2 => TsaN,
            3 => TsaR,
            4 => StsaN,
            5 => StsaR,
            6 => RadlN,
            7 => RadlR,
            8 => RaslN,
            9 => RaslR,
            16 => BlaWLp,
            17 => BlaWRadl,
            18 => BlaNLp,
            19 => IdrWRadl,
            20 => IdrNLp,
            21 => CraNut,
            32 => Vps,
            33 => Sps,
            34 => Pps,
            35 => Aud,
            36 => EosNut,
            37 => EobNut,
            38 => FdNut,
            39 => SeiPrefix,
            40 => SeiSuffix,
            _ => return None,
        })
    }

    /// `IS_H265_SUPPORTED_VCL_NALU`: the slice types whose header this
    /// parser actually decodes. Other VCL types (reserved 22/23) are still
    /// part of an access unit but are not inspected for frame boundaries.
    pub fn is_supported_vcl(self) -> bool {
        use H265NaluType::*;
        matches!(
            self,
            TrailN | TrailR | TsaN | TsaR | StsaN | StsaR | RadlN | RadlR | RaslN | RaslR
                | BlaWLp | BlaWRadl | BlaNLp | IdrWRadl | IdrNLp | CraNut
        )
    }

    pub fn needs_no_output_flag(self) -> bool {
        (self as u8) >= (H265NaluType::BlaWLp as u8)
    }
}
