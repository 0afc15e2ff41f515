use crate::codecs::h265::{H265NaluType, H265Sps, H265SliceHeader, H265Vps};
use crate::types::{Framerate, Resolution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum H265FrameBoundary {
    NewFrame,
    SameFrame,
}

/// Per-stream H.265 parameter-set and slice-header state.
/// Frame-boundary detection is far simpler than H.264's: a slice segment
/// with `first_slice_segment_in_pic_flag` set always starts a new access
/// unit once one is already open.
#[derive(Debug)]
pub struct H265Parser {
    vps_table: Box<[Option<H265Vps>; 16]>,
    sps_table: Box<[Option<H265Sps>; 16]>,
    have_slice: bool,
    active_resolution: Option<Resolution>,
    active_framerate: Option<Framerate>,
    last_sps_id: Option<u8>,
}

impl Default for H265Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl H265Parser {
    pub fn new() -> Self {
        Self {
            vps_table: Box::new([None; 16]),
            sps_table: Box::new(std::array::from_fn(|_| None)),
            have_slice: false,
            active_resolution: None,
            active_framerate: None,
            last_sps_id: None,
        }
    }

    pub fn have_sps(&self) -> bool {
        self.sps_table.iter().any(|s| s.is_some())
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.active_resolution
    }

    pub fn framerate(&self) -> Option<Framerate> {
        self.active_framerate
    }

    /// `(profile_idc, level_idc, bit_depth_luma_minus8)` of the most
    /// recently parsed SPS, used by the decoder-config change check
    ///. H.265 profile_idc lives in `profile_tier_level`,
    /// which this parser does not currently retain (nothing downstream
    /// reads it), so only level and bit depth are meaningful here.
    pub fn profile_level_bit_depth(&self) -> Option<(u8, u8, u32)> {
        let id = self.last_sps_id?;
        let sps = self.sps_table[id as usize].as_ref()?;
        Some((0, sps.level_idc, sps.bit_depth_luma_minus8))
    }

    /// Feeds one escaped NAL unit (with its 2-byte header) into the parser.
    pub fn on_nal(&mut self, nal: &[u8]) -> Option<H265FrameBoundary> {
        if nal.len() < 2 {
            return None;
        }
        let nal_unit_type = (nal[0] & 0x7e) >> 1;
        let Some(kind) = H265NaluType::from_u8(nal_unit_type) else {
            return None;
        };

        match kind {
            H265NaluType::Vps => {
                if let Some((id, vps)) = H265Vps::decode(nal) {
                    self.vps_table[(id as usize).min(15)] = Some(vps);
                }
                None
            }
            H265NaluType::Sps => {
                if let Some((id, sps)) = H265Sps::decode(nal) {
                    self.active_resolution = Some(Resolution {
                        width: sps.width,
                        height: sps.height,
                    });
                    if sps.framerate.is_some() {
                        self.active_framerate = sps.framerate;
                    }
                    let slot = (id as usize).min(15);
                    self.sps_table[slot] = Some(sps);
                    self.last_sps_id = Some(slot as u8);
                }
                None
            }
            _ if kind.is_supported_vcl() => self.on_slice(nal),
            _ => None,
        }
    }

    fn on_slice(&mut self, nal: &[u8]) -> Option<H265FrameBoundary> {
        let header = H265SliceHeader::decode(nal)?;
        let boundary = if self.have_slice && header.first_slice_segment_in_pic_flag {
            H265FrameBoundary::NewFrame
        } else if !self.have_slice {
            H265FrameBoundary::NewFrame
        } else {
            H265FrameBoundary::SameFrame
        };
        self.have_slice = true;
        Some(boundary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_nal(kind: H265NaluType, first_slice_flag: bool) -> Vec<u8> {
        // first_slice_segment_in_pic_flag (1 bit), optionally
        // no_output_of_prior_pics_flag (1 bit) for IRAP types, then
        // pps_id=ue(0) ("1").
        let mut bits = vec![if first_slice_flag { 1u8 } else { 0 }];
        if kind.needs_no_output_flag() {
            bits.push(0);
        }
        bits.push(1); // pps_id ue(0)
        let mut acc = 0u8;
        for (i, &b) in bits.iter().enumerate() {
            acc |= b << (7 - i);
        }
        let header0 = ((kind as u8) << 1) & 0x7e;
        vec![header0, 0x01, acc]
    }

    #[test]
    fn first_slice_segment_flag_opens_new_frame_after_first() {
        let mut parser = H265Parser::new();
        let first = slice_nal(H265NaluType::IdrWRadl, true);
        assert_eq!(parser.on_nal(&first), Some(H265FrameBoundary::NewFrame));
        let continuation = slice_nal(H265NaluType::TrailR, false);
        assert_eq!(
            parser.on_nal(&continuation),
            Some(H265FrameBoundary::SameFrame)
        );
        let next = slice_nal(H265NaluType::TrailR, true);
        assert_eq!(parser.on_nal(&next), Some(H265FrameBoundary::NewFrame));
    }
}
