use crate::bitstream::{unescape_rbsp, BitReader};

/// Minimal decode of `video_parameter_set_rbsp()`: just enough to confirm
/// the NAL parses and to record the id. Nothing downstream currently reads
/// VPS fields (profile/tier/level here duplicates what the SPS carries),
/// but feeding it through the bit reader catches a corrupt VPS before it
/// reaches the access-unit assembler as an opaque blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct H265Vps {
    pub valid: bool,
}

impl H265Vps {
    pub fn decode(nal: &[u8]) -> Option<(u8, H265Vps)> {
        if nal.len() < 3 {
            return None;
        }
        let rbsp = unescape_rbsp(&nal[2..]);
        let mut r = BitReader::new(&rbsp);
        let vps_id = r.read_u(4) as u8;
        if r.is_eof() {
            return None;
        }
        Some((vps_id, H265Vps { valid: true }))
    }
}
