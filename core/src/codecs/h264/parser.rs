use crate::codecs::h264::{H264NaluType, H264Pps, H264SliceHeader, H264Sps};
use crate::types::{Framerate, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H264FrameBoundary {
    /// This slice NAL starts a new access unit; the assembler should close
    /// out whatever it was accumulating before appending this NAL.
    NewFrame,
    /// This slice NAL belongs to the access unit already in progress
    /// (a second slice of the same coded picture, e.g. redundant coding).
    SameFrame,
    /// The slice header failed to decode, or referenced a PPS/SPS this
    /// parser hasn't (validly) seen. The NAL is dropped outright: it never
    /// joins an access unit and `has_slice` is left unchanged.
    Drop,
}

/// Per-stream H.264 parameter-set and slice-header state, used by the
/// access-unit assembler to decide where frame boundaries
/// fall. One instance per input stream; parameter sets from one stream must
/// never leak into another's table.
#[derive(Debug)]
pub struct H264Parser {
    sps_table: Box<[Option<H264Sps>; 256]>,
    pps_table: Box<[Option<H264Pps>; 256]>,
    last_slice_header: Option<H264SliceHeader>,
    last_sps_id: Option<u8>,
    active_resolution: Option<Resolution>,
    active_framerate: Option<Framerate>,
}

impl Default for H264Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl H264Parser {
    pub fn new() -> Self {
        Self {
            sps_table: Box::new([None; 256]),
            pps_table: Box::new([None; 256]),
            last_slice_header: None,
            last_sps_id: None,
            active_resolution: None,
            active_framerate: None,
        }
    }

    pub fn have_sps(&self) -> bool {
        self.last_sps_id.is_some()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.active_resolution
    }

    pub fn framerate(&self) -> Option<Framerate> {
        self.active_framerate
    }

    /// `(profile_idc, level_idc, bit_depth_luma_minus8)` of the most
    /// recently parsed SPS, used by the decoder-config change check
    ///.
    pub fn profile_level_bit_depth(&self) -> Option<(u8, u8, u32)> {
        let id = self.last_sps_id?;
        let sps = self.sps_table[id as usize]?;
        Some((sps.profile_idc, sps.level_idc, sps.bit_depth_luma_minus8))
    }

    /// Feeds one escaped NAL unit (with header byte) into the parser.
    /// Non-slice NALs update parameter-set state and return `None`. VCL
    /// slice NALs return whether they open a new access unit; `None` means
    /// the slice referenced an SPS/PPS id this parser hasn't seen (the NAL
    /// is kept in the access unit regardless — the assembler never drops
    /// data because a header failed to parse).
    pub fn on_nal(&mut self, nal: &[u8]) -> Option<H264FrameBoundary> {
        if nal.is_empty() {
            return None;
        }
        let nal_unit_type = nal[0] & 0x1f;
        let Some(kind) = H264NaluType::from_u8(nal_unit_type) else {
            return None;
        };

        match kind {
            H264NaluType::Sps => {
                if let Some((id, sps)) = H264Sps::decode(nal) {
                    self.active_resolution = Some(Resolution {
                        width: sps.width,
                        height: sps.height,
                    });
                    if sps.framerate.is_some() {
                        self.active_framerate = sps.framerate;
                    }
                    self.sps_table[id as usize] = Some(sps);
                    self.last_sps_id = Some(id);
                }
                None
            }
            H264NaluType::Pps => {
                if let Some((id, pps)) = H264Pps::decode(nal) {
                    self.pps_table[id as usize] = Some(pps);
                }
                None
            }
            _ if kind.is_vcl() => Some(self.on_slice(nal)),
            _ => None,
        }
    }

    /// Decodes one VCL slice header. A header that fails to parse, or that
    /// references a PPS/SPS id this parser hasn't (validly) seen, is
    /// dropped rather than treated as same-frame: the original parser
    /// `continue`s past such a NAL without appending it or touching the
    /// in-progress access unit.
    fn on_slice(&mut self, nal: &[u8]) -> H264FrameBoundary {
        let Some(header) = H264SliceHeader::decode(nal, &self.pps_table, &self.sps_table) else {
            return H264FrameBoundary::Drop;
        };
        let Some(pps) = self.pps_table[header.pic_parameter_set_id as usize] else {
            return H264FrameBoundary::Drop;
        };
        let Some(sps) = self.sps_table[pps.seq_parameter_set_id as usize] else {
            return H264FrameBoundary::Drop;
        };

        let boundary = match self.last_slice_header {
            None => H264FrameBoundary::NewFrame,
            Some(last) => {
                if is_new_frame(&last, &header, &sps) {
                    H264FrameBoundary::NewFrame
                } else {
                    H264FrameBoundary::SameFrame
                }
            }
        };

        self.last_slice_header = Some(header);
        boundary
    }
}

/// Port of the reference parser's `is_new_frame`: any of these differences
/// between consecutive slice headers means the new slice starts a new
/// coded picture.
fn is_new_frame(last: &H264SliceHeader, cur: &H264SliceHeader, sps: &H264Sps) -> bool {
    if last.frame_num != cur.frame_num {
        return true;
    }
    if last.pic_parameter_set_id != cur.pic_parameter_set_id {
        return true;
    }
    if last.field_pic_flag != cur.field_pic_flag {
        return true;
    }
    if sps.frame_mbs_only_flag
        && last.field_pic_flag
        && cur.field_pic_flag
        && last.bottom_field_flag != cur.bottom_field_flag
    {
        return true;
    }
    if last.nal_ref_idc != cur.nal_ref_idc && (last.nal_ref_idc == 0 || cur.nal_ref_idc == 0) {
        return true;
    }
    if sps.pic_order_cnt_type == 0
        && (last.pic_order_cnt_lsb != cur.pic_order_cnt_lsb
            || last.delta_pic_order_cnt_bottom != cur.delta_pic_order_cnt_bottom)
    {
        return true;
    }
    if sps.pic_order_cnt_type == 1 && last.delta_pic_order_cnt != cur.delta_pic_order_cnt {
        return true;
    }
    const IDR: u8 = H264NaluType::IdrSlice as u8;
    if last.nal_unit_type != cur.nal_unit_type
        && (last.nal_unit_type == IDR || cur.nal_unit_type == IDR)
    {
        return true;
    }
    if last.nal_unit_type == IDR && cur.nal_unit_type == IDR && last.idr_pic_id != cur.idr_pic_id {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_bit(bits: &mut Vec<u8>, bit: u8) {
        bits.push(bit);
    }

    fn encode_ue(bits: &mut Vec<u8>, value: u32) {
        let mut tmp = value + 1;
        let mut num_bits = 0;
        while tmp > 1 {
            tmp >>= 1;
            num_bits += 1;
        }
        for _ in 0..num_bits {
            push_bit(bits, 0);
        }
        let codenum = value + 1;
        for i in (0..=num_bits).rev() {
            push_bit(bits, ((codenum >> i) & 1) as u8);
        }
    }

    fn pack(bits: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut acc = 0u8;
        let mut n = 0u8;
        for &b in bits {
            acc = (acc << 1) | b;
            n += 1;
            if n == 8 {
                out.push(acc);
                acc = 0;
                n = 0;
            }
        }
        if n > 0 {
            out.push(acc << (8 - n));
        }
        out
    }

    fn minimal_sps_nal() -> Vec<u8> {
        let mut bits = Vec::new();
        for i in (0..8).rev() {
            push_bit(&mut bits, ((66u32 >> i) & 1) as u8);
        }
        for _ in 0..8 {
            push_bit(&mut bits, 0);
        }
        for i in (0..8).rev() {
            push_bit(&mut bits, ((30u32 >> i) & 1) as u8);
        }
        encode_ue(&mut bits, 0); // sps id
        encode_ue(&mut bits, 0); // log2_max_frame_num_minus4
        encode_ue(&mut bits, 2); // pic_order_cnt_type
        encode_ue(&mut bits, 1); // max_num_ref_frames
        push_bit(&mut bits, 0); // gaps flag
        encode_ue(&mut bits, 9); // pic_width_in_mbs_minus1 -> 160
        encode_ue(&mut bits, 8); // pic_height_in_map_units_minus1 -> 144
        push_bit(&mut bits, 1); // frame_mbs_only_flag
        push_bit(&mut bits, 1); // direct_8x8_inference_flag
        push_bit(&mut bits, 0); // frame_cropping_flag
        push_bit(&mut bits, 0); // vui_parameters_present_flag
        let rbsp = pack(&bits);
        let mut nal = vec![0x67u8];
        nal.extend_from_slice(&rbsp);
        nal
    }

    fn minimal_pps_nal() -> Vec<u8> {
        let bits = [1u8, 1, 0, 0]; // pps_id=0, sps_id=0, entropy=0, pic_order_present=0
        let mut acc = 0u8;
        for (i, &b) in bits.iter().enumerate() {
            acc |= b << (7 - i);
        }
        vec![0x68u8, acc]
    }

    fn slice_nal(frame_num_bit: u8, first_nalu_is_idr: bool) -> Vec<u8> {
        let mut bits = Vec::new();
        encode_ue(&mut bits, 0); // first_mb_in_slice
        encode_ue(&mut bits, 2); // slice_type
        encode_ue(&mut bits, 0); // pps_id
                                 // frame_num: log2_max_frame_num_minus4 + 4 = 4 bits
        for _ in 0..3 {
            push_bit(&mut bits, 0);
        }
        push_bit(&mut bits, frame_num_bit);
        // pic_order_cnt_type==2 in our sps -> no POC fields read
        let rbsp = pack(&bits);
        let header_byte = if first_nalu_is_idr { 0x65u8 } else { 0x41u8 };
        let mut nal = vec![header_byte];
        nal.extend_from_slice(&rbsp);
        nal
    }

    #[test]
    fn first_slice_after_params_is_new_frame() {
        let mut parser = H264Parser::new();
        assert!(parser.on_nal(&minimal_sps_nal()).is_none());
        assert!(parser.on_nal(&minimal_pps_nal()).is_none());
        assert!(parser.have_sps());
        assert_eq!(
            parser.resolution(),
            Some(Resolution {
                width: 160,
                height: 144
            })
        );
        let boundary = parser.on_nal(&slice_nal(1, true)).unwrap();
        assert_eq!(boundary, H264FrameBoundary::NewFrame);
    }

    #[test]
    fn same_frame_num_without_idr_change_is_same_frame() {
        let mut parser = H264Parser::new();
        parser.on_nal(&minimal_sps_nal());
        parser.on_nal(&minimal_pps_nal());
        parser.on_nal(&slice_nal(0, false)).unwrap();
        let boundary = parser.on_nal(&slice_nal(0, false)).unwrap();
        assert_eq!(boundary, H264FrameBoundary::SameFrame);
    }

    #[test]
    fn frame_num_change_is_new_frame() {
        let mut parser = H264Parser::new();
        parser.on_nal(&minimal_sps_nal());
        parser.on_nal(&minimal_pps_nal());
        parser.on_nal(&slice_nal(0, false)).unwrap();
        let boundary = parser.on_nal(&slice_nal(1, false)).unwrap();
        assert_eq!(boundary, H264FrameBoundary::NewFrame);
    }

    #[test]
    fn slice_before_any_sps_pps_is_dropped() {
        let mut parser = H264Parser::new();
        assert_eq!(
            parser.on_nal(&slice_nal(0, false)),
            Some(H264FrameBoundary::Drop)
        );
    }
}
