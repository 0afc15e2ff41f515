use crate::bitstream::BitReader;

/// One decoded `short_term_ref_pic_set()`. Nothing downstream currently
/// consumes the reference-picture set itself (no reordering/DPB model
/// lives in this parser), but it must still be decoded bit-exactly because
/// later syntax elements in the SPS (VUI, framerate) sit right after it and
/// an earlier rps in the list can be referenced by delta from a later one.
#[derive(Debug, Clone, Default)]
pub struct ShortTermRps {
    pub num_negative_pics: i32,
    pub delta_poc: Vec<i32>,
    pub used: Vec<bool>,
}

impl ShortTermRps {
    fn num_delta_pocs(&self) -> i32 {
        self.delta_poc.len() as i32
    }
}

/// Decodes the `idx`-th short_term_ref_pic_set in an SPS's list, given the
/// sets already decoded for this SPS (`prior`). Mirrors
/// `hevc_decode_short_term_rps` bit for bit, including the insertion sort
/// and negative-half reversal the predicted branch performs.
pub fn decode_short_term_rps(r: &mut BitReader, idx: usize, prior: &[ShortTermRps]) -> ShortTermRps {
    let rps_predict = idx != 0 && r.read_flag();

    if rps_predict {
        let ref_rps = &prior[idx - 1];
        let delta_rps_sign = r.read_flag();
        let abs_delta_rps = r.read_ue() as i32;
        let delta_rps = if delta_rps_sign {
            -abs_delta_rps
        } else {
            abs_delta_rps
        };

        let mut delta_poc = Vec::new();
        let mut used = Vec::new();
        for i in 0..=ref_rps.num_delta_pocs() {
            let is_used = r.read_flag();
            let use_delta = if !is_used { r.read_flag() } else { false };
            if is_used || use_delta {
                let d = if i < ref_rps.num_delta_pocs() {
                    delta_rps + ref_rps.delta_poc[i as usize]
                } else {
                    delta_rps
                };
                delta_poc.push(d);
                used.push(is_used);
            }
        }

        let num_negative_pics = delta_poc.iter().filter(|&&d| d < 0).count() as i32;

        // Insertion sort ascending by delta_poc, carrying `used` along.
        for i in 1..delta_poc.len() {
            let (d, u) = (delta_poc[i], used[i]);
            let mut k = i as isize - 1;
            while k >= 0 && d < delta_poc[k as usize] {
                delta_poc[k as usize + 1] = delta_poc[k as usize];
                used[k as usize + 1] = used[k as usize];
                k -= 1;
            }
            delta_poc[(k + 1) as usize] = d;
            used[(k + 1) as usize] = u;
        }

        // Reverse the negative-delta half so it runs closest-to-farthest.
        let half = (num_negative_pics / 2) as usize;
        let last = (num_negative_pics - 1) as isize;
        for i in 0..half {
            let k = (last - i as isize) as usize;
            delta_poc.swap(i, k);
            used.swap(i, k);
        }

        ShortTermRps {
            num_negative_pics,
            delta_poc,
            used,
        }
    } else {
        let num_negative_pics = r.read_ue() as i32;
        let num_positive_pics = r.read_ue() as i32;
        let total = num_negative_pics + num_positive_pics;

        let mut delta_poc = vec![0i32; total as usize];
        let mut used = vec![false; total as usize];

        let mut prev = 0i32;
        for i in 0..num_negative_pics as usize {
            let d = r.read_ue() as i32 + 1;
            prev -= d;
            delta_poc[i] = prev;
            used[i] = r.read_flag();
        }
        prev = 0;
        for i in 0..num_positive_pics as usize {
            let d = r.read_ue() as i32 + 1;
            prev += d;
            delta_poc[num_negative_pics as usize + i] = prev;
            used[num_negative_pics as usize + i] = r.read_flag();
        }

        ShortTermRps {
            num_negative_pics,
            delta_poc,
            used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn direct_coded_set_with_one_negative_pic() {
        // num_negative_pics=ue(1), num_positive_pics=ue(0),
        // delta_poc_s0_minus1[0]=ue(0) (-> delta=-1), used_by_curr_pic_s0=1
        let bits = [0, 1, 0, 1, 1, 1];
        let data = pack(&bits);
        let mut r = BitReader::new(&data);
        let rps = decode_short_term_rps(&mut r, 0, &[]);
        assert_eq!(rps.num_negative_pics, 1);
        assert_eq!(rps.delta_poc, vec![-1]);
        assert!(rps.used[0]);
    }
}
