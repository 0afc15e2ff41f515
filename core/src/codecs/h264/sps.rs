use crate::bitstream::{unescape_rbsp, BitReader};
use crate::types::Framerate;

const EXTENDED_PROFILE_IDCS: [u8; 13] = [
    100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135,
];

/// Decoded `seq_parameter_set_data`, trimmed to the fields downstream stages
/// need: cropped output geometry and the handful of slice-header field
/// widths that depend on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct H264Sps {
    pub valid: bool,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u32,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
}

fn parse_scaling_list(size: usize, r: &mut BitReader) {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.read_se();
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        last_scale = if next_scale == 0 { last_scale } else { next_scale };
    }
}

impl H264Sps {
    /// `nal` is the escaped NAL unit including its 1-byte header. Decodes
    /// Decodes `seq_parameter_set_rbsp()`; returns `(id, sps)`.
    pub fn decode(nal: &[u8]) -> Option<(u8, H264Sps)> {
        if nal.len() < 2 {
            return None;
        }
        let rbsp = unescape_rbsp(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let mut sps = H264Sps {
            profile_idc: r.read_u(8) as u8,
            ..Default::default()
        };
        let _constraint_flags = r.read_u(8);
        sps.level_idc = r.read_u(8) as u8;
        let seq_parameter_set_id = r.read_ue() as u8;

        if EXTENDED_PROFILE_IDCS.contains(&sps.profile_idc) {
            sps.chroma_format_idc = r.read_ue() as u8;
            if sps.chroma_format_idc == 3 {
                let _separate_colour_plane_flag = r.read_flag();
            }
            sps.bit_depth_luma_minus8 = r.read_ue();
            let _bit_depth_chroma_minus8 = r.read_ue();
            let _qpprime_y_zero_transform_bypass_flag = r.read_flag();
            let seq_scaling_matrix_present_flag = r.read_flag();
            if seq_scaling_matrix_present_flag {
                for i in 0..8 {
                    if r.read_flag() {
                        parse_scaling_list(if i < 6 { 16 } else { 64 }, &mut r);
                    }
                }
            }
        } else {
            sps.chroma_format_idc = 1;
        }

        sps.log2_max_frame_num_minus4 = r.read_ue();
        sps.pic_order_cnt_type = r.read_ue();
        if sps.pic_order_cnt_type == 0 {
            sps.log2_max_pic_order_cnt_lsb_minus4 = r.read_ue();
        } else if sps.pic_order_cnt_type == 1 {
            sps.delta_pic_order_always_zero_flag = r.read_flag();
            let _offset_for_non_ref_pic = r.read_se();
            let _offset_for_top_to_bottom_field = r.read_se();
            let num_ref_frames_in_pic_order_cnt_cycle = r.read_ue();
            for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                let _offset_for_ref_frame = r.read_se();
            }
        }

        let _max_num_ref_frames = r.read_ue();
        let _gaps_in_frame_num_value_allowed_flag = r.read_flag();
        sps.pic_width_in_mbs_minus1 = r.read_ue();
        sps.pic_height_in_map_units_minus1 = r.read_ue();
        sps.frame_mbs_only_flag = r.read_flag();
        if !sps.frame_mbs_only_flag {
            let _mb_adaptive_frame_field_flag = r.read_flag();
        }
        let _direct_8x8_inference_flag = r.read_flag();
        sps.frame_cropping_flag = r.read_flag();
        if sps.frame_cropping_flag {
            sps.frame_crop_left_offset = r.read_ue();
            sps.frame_crop_right_offset = r.read_ue();
            sps.frame_crop_top_offset = r.read_ue();
            sps.frame_crop_bottom_offset = r.read_ue();
        }

        let vui_parameters_present_flag = r.read_flag();
        let mut timing_info_present_flag = false;
        let mut num_units_in_tick: u32 = 0;
        let mut time_scale: u32 = 0;
        if vui_parameters_present_flag {
            if r.read_flag() {
                // aspect_ratio_info_present_flag
                let aspect_ratio_idc = r.read_u(8);
                if aspect_ratio_idc == 255 {
                    let _sar_width = r.read_u(16);
                    let _sar_height = r.read_u(16);
                }
            }
            if r.read_flag() {
                // overscan_info_present_flag
                let _overscan_appropriate_flag = r.read_flag();
            }
            if r.read_flag() {
                // video_signal_type_present_flag
                let _video_format = r.read_u(3);
                let _video_full_range_flag = r.read_flag();
                if r.read_flag() {
                    // colour_description_present_flag
                    let _colour_primaries = r.read_u(8);
                    let _transfer_characteristics = r.read_u(8);
                    let _matrix_coefficients = r.read_u(8);
                }
            }
            if r.read_flag() {
                // chroma_loc_info_present_flag
                let _chroma_sample_loc_type_top_field = r.read_ue();
                let _chroma_sample_loc_type_bottom_field = r.read_ue();
            }
            timing_info_present_flag = r.read_flag();
            if timing_info_present_flag {
                num_units_in_tick = r.read_u(32);
                time_scale = r.read_u(32);
                let _fixed_frame_rate_flag = r.read_flag();
            }
        }

        if r.is_eof() {
            return None;
        }
        // framerate is num=time_scale, den=num_units_in_tick*2; a zero
        // denominator rejects the whole SPS rather than just leaving the
        // framerate unset.
        if timing_info_present_flag && num_units_in_tick == 0 {
            return None;
        }

        sps.height = ((2 - sps.frame_mbs_only_flag as u32)
            * (sps.pic_height_in_map_units_minus1 + 1))
            * 16;
        sps.width = (sps.pic_width_in_mbs_minus1 + 1) * 16;
        if sps.frame_cropping_flag {
            let (crop_unit_x, crop_unit_y) = match sps.chroma_format_idc {
                0 => (1, 2 - sps.frame_mbs_only_flag as u32),
                1 => (2, 2 * (2 - sps.frame_mbs_only_flag as u32)),
                2 => (2, 2 - sps.frame_mbs_only_flag as u32),
                3 => (1, 2 - sps.frame_mbs_only_flag as u32),
                _ => (0, 0),
            };
            sps.width = sps
                .width
                .saturating_sub(crop_unit_x * (sps.frame_crop_left_offset + sps.frame_crop_right_offset));
            sps.height = sps
                .height
                .saturating_sub(crop_unit_y * (sps.frame_crop_top_offset + sps.frame_crop_bottom_offset));
        }

        if timing_info_present_flag {
            sps.framerate = Some(Framerate::reduced(time_scale, num_units_in_tick * 2));
        }

        sps.valid = true;
        Some((seq_parameter_set_id, sps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A minimal baseline-profile SPS (640x480, no VUI), hand-assembled bit
    /// by bit from the syntax table rather than captured from a real
    /// encoder: profile_idc=66 (not in the extended list), level_idc=30,
    /// sps_id=0, log2_max_frame_num_minus4=ue(0), pic_order_cnt_type=ue(2)
    /// (skips the POC-LSB/cycle fields entirely), max_num_ref_frames=ue(1),
    /// gaps=0, pic_width_in_mbs_minus1=ue(39) (40*16=640),
    /// pic_height_in_map_units_minus1=ue(29) (30*16=480),
    /// frame_mbs_only_flag=1, direct_8x8_inference_flag=1,
    /// frame_cropping_flag=0, vui_parameters_present_flag=0.
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

    fn push_bit(bits: &mut Vec<u8>, bit: u8) {
        bits.push(bit);
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

    #[test]
    fn decodes_baseline_resolution_without_vui() {
        let mut bits = Vec::new();
        // profile_idc = 66
        for i in (0..8).rev() {
            push_bit(&mut bits, ((66u32 >> i) & 1) as u8);
        }
        // constraint flags byte
        for _ in 0..8 {
            push_bit(&mut bits, 0);
        }
        // level_idc = 30
        for i in (0..8).rev() {
            push_bit(&mut bits, ((30u32 >> i) & 1) as u8);
        }
        encode_ue(&mut bits, 0); // sps id
                                 // profile_idc not extended -> chroma_format_idc implied 1, no extra fields
        encode_ue(&mut bits, 0); // log2_max_frame_num_minus4
        encode_ue(&mut bits, 2); // pic_order_cnt_type = 2
        encode_ue(&mut bits, 1); // max_num_ref_frames
        push_bit(&mut bits, 0); // gaps_in_frame_num_value_allowed_flag
        encode_ue(&mut bits, 39); // pic_width_in_mbs_minus1
        encode_ue(&mut bits, 29); // pic_height_in_map_units_minus1
        push_bit(&mut bits, 1); // frame_mbs_only_flag
        push_bit(&mut bits, 1); // direct_8x8_inference_flag
        push_bit(&mut bits, 0); // frame_cropping_flag
        push_bit(&mut bits, 0); // vui_parameters_present_flag

        let rbsp = pack(&bits);
        let mut nal = vec![0x67u8];
        nal.extend_from_slice(&rbsp);

        let (id, sps) = H264Sps::decode(&nal).expect("sps should decode");
        assert_eq!(id, 0);
        assert!(sps.valid);
        assert_eq!(sps.width, 640);
        assert_eq!(sps.height, 480);
        assert_eq!(sps.chroma_format_idc, 1);
        assert!(sps.framerate.is_none());
    }
}
