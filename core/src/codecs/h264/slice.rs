use crate::bitstream::{unescape_rbsp, BitReader};
use crate::codecs::h264::{H264Pps, H264Sps};

/// Decoded `slice_header()` fields needed by [`is_new_frame`](super::parser);
/// nothing past `delta_pic_order_cnt` is read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct H264SliceHeader {
    pub nal_ref_idc: u8,
    pub nal_unit_type: u8,
    pub pic_parameter_set_id: u8,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: u32,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
}

impl H264SliceHeader {
    /// `nal` is the escaped NAL unit including its 1-byte header.
    /// `pps_table`/`sps_table` are indexed by parameter-set id; the decode
    /// fails if the slice references a PPS/SPS that hasn't been seen yet.
    pub fn decode(
        nal: &[u8],
        pps_table: &[Option<H264Pps>; 256],
        sps_table: &[Option<H264Sps>; 256],
    ) -> Option<Self> {
        if nal.len() < 2 {
            return None;
        }
        let nal_ref_idc = (nal[0] >> 5) & 0x03;
        let nal_unit_type = nal[0] & 0x1f;

        let rbsp = unescape_rbsp(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let mut header = H264SliceHeader {
            nal_ref_idc,
            nal_unit_type,
            ..Default::default()
        };

        let _first_mb_in_slice = r.read_ue();
        let _slice_type = r.read_ue();
        header.pic_parameter_set_id = r.read_ue() as u8;

        let pps = pps_table[header.pic_parameter_set_id as usize]?;
        if !pps.valid {
            return None;
        }
        let sps = sps_table[pps.seq_parameter_set_id as usize]?;
        if !sps.valid {
            return None;
        }

        header.frame_num = r.read_u(sps.log2_max_frame_num_minus4 + 4);

        if !sps.frame_mbs_only_flag {
            header.field_pic_flag = r.read_flag();
            if header.field_pic_flag {
                header.bottom_field_flag = r.read_flag();
            }
        }

        if nal_unit_type == 5 {
            header.idr_pic_id = r.read_ue();
        }

        if sps.pic_order_cnt_type == 0 {
            header.pic_order_cnt_lsb = r.read_u(sps.log2_max_pic_order_cnt_lsb_minus4 + 4);
            if pps.pic_order_present_flag && !header.field_pic_flag {
                header.delta_pic_order_cnt_bottom = r.read_se();
            }
        }
        if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
            header.delta_pic_order_cnt[0] = r.read_se();
            if pps.pic_order_present_flag && !header.field_pic_flag {
                header.delta_pic_order_cnt[1] = r.read_se();
            }
        }

        if r.is_eof() {
            return None;
        }

        Some(header)
    }
}
