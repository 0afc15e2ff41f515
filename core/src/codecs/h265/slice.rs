use crate::bitstream::{unescape_rbsp, BitReader};
use crate::codecs::h265::H265NaluType;

/// Decoded `slice_segment_header()` fields needed to detect frame
/// boundaries: just the leading flag and the PPS reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct H265SliceHeader {
    pub first_slice_segment_in_pic_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    pub pps_id: u32,
}

impl H265SliceHeader {
    /// `nal` is the escaped NAL unit including its 2-byte header.
    pub fn decode(nal: &[u8]) -> Option<Self> {
        if nal.len() < 3 {
            return None;
        }
        let nal_unit_type = (nal[0] & 0x7e) >> 1;
        let kind = H265NaluType::from_u8(nal_unit_type)?;

        let rbsp = unescape_rbsp(&nal[2..]);
        let mut r = BitReader::new(&rbsp);

        let mut header = H265SliceHeader {
            first_slice_segment_in_pic_flag: r.read_flag(),
            ..Default::default()
        };

        if kind.needs_no_output_flag() {
            header.no_output_of_prior_pics_flag = r.read_flag();
        }

        header.pps_id = r.read_ue();

        if r.is_eof() {
            return None;
        }

        Some(header)
    }
}
