use crate::bitstream::{unescape_rbsp, BitReader};
use crate::codecs::h265::short_term_rps::{decode_short_term_rps, ShortTermRps};
use crate::types::Framerate;

fn decode_profile_tier_level(r: &mut BitReader) {
    let _profile_space = r.read_u(2);
    let _tier_flag = r.read_flag();
    let _profile_idc = r.read_u(5);
    let _profile_compatibility_flags = r.read_u(32);
    let _progressive_source_flag = r.read_flag();
    let _interlaced_source_flag = r.read_flag();
    let _non_packed_constraint_flag = r.read_flag();
    let _frame_only_constraint_flag = r.read_flag();
    let _reserved_44bits_hi = r.read_u(32);
    let _reserved_44bits_lo = r.read_u(12);
}

fn scaling_list_data(r: &mut BitReader) {
    for size_id in 0..4 {
        let step = if size_id == 3 { 3 } else { 1 };
        let mut matrix_id = 0;
        while matrix_id < 6 {
            let scaling_list_pred_mode_flag = r.read_flag();
            if !scaling_list_pred_mode_flag {
                let _scaling_list_pred_matrix_id_delta = r.read_ue();
            } else {
                let coef_num = (1usize << (4 + (size_id << 1))).min(64);
                if size_id > 1 {
                    let _scaling_list_dc_coef_minus8 = r.read_se();
                }
                for _ in 0..coef_num {
                    let _scaling_list_delta_coef = r.read_se();
                }
            }
            matrix_id += step;
        }
    }
}

/// Decoded `seq_parameter_set_rbsp()`, trimmed to the geometry, bit depth
/// and timing fields downstream needs.
#[derive(Debug, Clone, Default)]
pub struct H265Sps {
    pub valid: bool,
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u32,
    pub log2_max_poc_lsb: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: Option<Framerate>,
    pub short_term_rps: Vec<ShortTermRps>,
}

impl H265Sps {
    /// `nal` is the escaped NAL unit including its 2-byte header.
    pub fn decode(nal: &[u8]) -> Option<(u8, H265Sps)> {
        if nal.len() < 3 {
            return None;
        }
        let rbsp = unescape_rbsp(&nal[2..]);
        let mut r = BitReader::new(&rbsp);

        let mut sps = H265Sps::default();

        let _sps_video_parameter_set_id = r.read_u(4);
        let max_sub_layers = r.read_u(3) + 1;
        let _temporal_id_nesting_flag = r.read_flag();

        decode_profile_tier_level(&mut r);
        sps.level_idc = r.read_u(8) as u8;
        let rem = sps.level_idc % 30;
        sps.level_idc = if rem != 0 {
            sps.level_idc / 3 + rem / 3
        } else {
            sps.level_idc / 3
        };

        let mut sub_layer_profile_present = [false; 8];
        let mut sub_layer_level_present = [false; 8];
        for i in 0..(max_sub_layers - 1) as usize {
            sub_layer_profile_present[i] = r.read_flag();
            sub_layer_level_present[i] = r.read_flag();
        }
        if max_sub_layers > 1 {
            for _ in (max_sub_layers - 1)..8 {
                let _reserved = r.read_u(2);
            }
        }
        for i in 0..(max_sub_layers - 1) as usize {
            if sub_layer_profile_present[i] {
                decode_profile_tier_level(&mut r);
            }
            if sub_layer_level_present[i] {
                let _sub_layer_level_idc = r.read_u(8);
            }
        }

        let sps_id = r.read_ue() as u8;
        let mut chroma_format_idc = r.read_ue();
        if chroma_format_idc == 3 {
            let separate_colour_plane_flag = r.read_flag();
            if separate_colour_plane_flag {
                chroma_format_idc = 0;
            }
        }
        sps.chroma_format_idc = chroma_format_idc as u8;

        let coded_width = r.read_ue();
        let coded_height = r.read_ue();
        sps.width = coded_width;
        sps.height = coded_height;

        let conformance_window_flag = r.read_flag();
        if conformance_window_flag {
            let vert_mult = 1 + (chroma_format_idc < 2) as u32;
            let horiz_mult = 1 + (chroma_format_idc < 3) as u32;
            let left = r.read_ue() * horiz_mult;
            let right = r.read_ue() * horiz_mult;
            let top = r.read_ue() * vert_mult;
            let bottom = r.read_ue() * vert_mult;
            sps.width = coded_width.saturating_sub(left + right);
            sps.height = coded_height.saturating_sub(top + bottom);
        }

        sps.bit_depth_luma_minus8 = r.read_ue();
        let _bit_depth_chroma_minus8 = r.read_ue();
        sps.log2_max_poc_lsb = r.read_ue() + 4;

        let sps_sub_layer_ordering_info_present_flag = r.read_flag();
        let start = if sps_sub_layer_ordering_info_present_flag {
            0
        } else {
            max_sub_layers - 1
        };
        for _ in start..max_sub_layers {
            let _max_dec_pic_buffering_minus1 = r.read_ue();
            let _num_reorder_pics = r.read_ue();
            let _max_latency_increase_plus1 = r.read_ue();
        }

        let _log2_min_luma_coding_block_size_minus3 = r.read_ue();
        let _log2_diff_max_min_luma_coding_block_size = r.read_ue();
        let _log2_min_luma_transform_block_size_minus2 = r.read_ue();
        let _log2_diff_max_min_luma_transform_block_size = r.read_ue();
        let _max_transform_hierarchy_depth_inter = r.read_ue();
        let _max_transform_hierarchy_depth_intra = r.read_ue();

        let scaling_list_enabled_flag = r.read_flag();
        if scaling_list_enabled_flag {
            let sps_scaling_list_data_present_flag = r.read_flag();
            if sps_scaling_list_data_present_flag {
                scaling_list_data(&mut r);
            }
        }

        let _amp_enabled_flag = r.read_flag();
        let _sample_adaptive_offset_enabled_flag = r.read_flag();
        let pcm_enabled_flag = r.read_flag();
        if pcm_enabled_flag {
            let _pcm_sample_bit_depth_luma_minus1 = r.read_u(4);
            let _pcm_sample_bit_depth_chroma_minus1 = r.read_u(4);
            let _log2_min_pcm_luma_coding_block_size_minus3 = r.read_ue();
            let _log2_diff_max_min_pcm_luma_coding_block_size = r.read_ue();
            let _pcm_loop_filter_disabled_flag = r.read_flag();
        }

        let num_short_term_ref_pic_sets = r.read_ue();
        let mut rps_list = Vec::with_capacity(num_short_term_ref_pic_sets as usize);
        for idx in 0..num_short_term_ref_pic_sets as usize {
            let rps = decode_short_term_rps(&mut r, idx, &rps_list);
            rps_list.push(rps);
        }
        sps.short_term_rps = rps_list;

        let long_term_ref_pics_present_flag = r.read_flag();
        if long_term_ref_pics_present_flag {
            let num_long_term_ref_pics_sps = r.read_ue();
            for _ in 0..num_long_term_ref_pics_sps {
                let _lt_ref_pic_poc_lsb_sps = r.read_u(sps.log2_max_poc_lsb);
                let _used_by_curr_pic_lt_sps_flag = r.read_flag();
            }
        }

        let _sps_temporal_mvp_enabled_flag = r.read_flag();
        let _strong_intra_smoothing_enabled_flag = r.read_flag();

        let vui_parameters_present_flag = r.read_flag();
        if vui_parameters_present_flag {
            if r.read_flag() {
                // aspect_ratio_info_present_flag
                let sar_idc = r.read_u(8);
                if sar_idc == 255 {
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
                    let _colour_primaries = r.read_u(8);
                    let _transfer_characteristics = r.read_u(8);
                    let _matrix_coeffs = r.read_u(8);
                }
            }
            if r.read_flag() {
                // chroma_loc_info_present_flag
                let _chroma_sample_loc_type_top_field = r.read_ue();
                let _chroma_sample_loc_type_bottom_field = r.read_ue();
            }
            let _neutral_chroma_indication_flag = r.read_flag();
            let _field_seq_flag = r.read_flag();
            let _frame_field_info_present_flag = r.read_flag();

            let default_display_window_flag = r.read_flag();
            if default_display_window_flag {
                let vert_mult = 1 + (chroma_format_idc < 2) as u32;
                let horiz_mult = 1 + (chroma_format_idc < 3) as u32;
                let left = r.read_ue() * horiz_mult;
                let right = r.read_ue() * horiz_mult;
                let top = r.read_ue() * vert_mult;
                let bottom = r.read_ue() * vert_mult;
                sps.width = coded_width.saturating_sub(left + right);
                sps.height = coded_height.saturating_sub(top + bottom);
            }

            let vui_timing_info_present_flag = r.read_flag();
            if vui_timing_info_present_flag {
                let num_units_in_tick = r.read_u(32);
                let time_scale = r.read_u(32);
                if num_units_in_tick == 0 {
                    return None;
                }
                sps.framerate = Some(Framerate::reduced(time_scale, num_units_in_tick));
            }
        }

        if r.is_eof() {
            return None;
        }

        sps.valid = true;
        Some((sps_id, sps))
    }
}
