use crate::bitstream::{unescape_rbsp, BitReader};

/// Decoded `pic_parameter_set_rbsp()`, trimmed to the fields the slice
/// header decoder needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct H264Pps {
    pub valid: bool,
    pub seq_parameter_set_id: u8,
    pub pic_order_present_flag: bool,
}

impl H264Pps {
    /// `nal` is the escaped NAL unit including its 1-byte header. Returns
    /// `(id, pps)`.
    pub fn decode(nal: &[u8]) -> Option<(u8, H264Pps)> {
        if nal.len() < 2 {
            return None;
        }
        let rbsp = unescape_rbsp(&nal[1..]);
        let mut r = BitReader::new(&rbsp);

        let pic_parameter_set_id = r.read_ue() as u8;
        let seq_parameter_set_id = r.read_ue() as u8;
        let _entropy_coding_mode_flag = r.read_flag();
        let pic_order_present_flag = r.read_flag();

        if r.is_eof() {
            return None;
        }

        Some((
            pic_parameter_set_id,
            H264Pps {
                valid: true,
                seq_parameter_set_id,
                pic_order_present_flag,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pps_ids_and_flags() {
        // pic_parameter_set_id=ue(0), seq_parameter_set_id=ue(0),
        // entropy_coding_mode_flag=1, pic_order_present_flag=1
        let bits = [1u8, 1, 1, 1];
        let mut acc = 0u8;
        for (i, &b) in bits.iter().enumerate() {
            acc |= b << (7 - i);
        }
        let nal = [0x68u8, acc];
        let (id, pps) = H264Pps::decode(&nal).expect("pps should decode");
        assert_eq!(id, 0);
        assert_eq!(pps.seq_parameter_set_id, 0);
        assert!(pps.pic_order_present_flag);
    }
}
