/// Converts a NAL byte range (escaped, i.e. still containing emulation
/// prevention bytes) into RBSP: `00 00 03` becomes `00 00`. Never applied to
/// bytes actually emitted as part of an access unit — only to the view fed
/// to parameter-set / slice-header decode.
///
/// Implemented as the same 4-state machine as the reference parser:
/// 0 = last byte nonzero, 1 = one zero seen, 2 = two zeros seen,
/// 3 = saw `00 00 03` (the `03` is consumed, not copied).
pub fn unescape_rbsp(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut state: u8 = 0;
    for &byte in escaped {
        match (state, byte) {
            (0, 0) => state = 1,
            (1, 0) => state = 2,
            (2, 3) => {
                state = 3;
                continue;
            }
            (3, 0) => state = 1,
            (3, 1..=3) => state = 0,
            (3, _) => {
                // Not a well-formed escape continuation: restore the
                // suppressed 0x03 before emitting this byte too.
                out.push(3);
                state = 0;
            }
            _ => state = 0,
        }
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_emulation_prevention_byte() {
        let escaped = [0x00, 0x00, 0x03, 0x01, 0x02, 0x00, 0x00, 0x03, 0x03];
        let rbsp = unescape_rbsp(&escaped);
        assert_eq!(rbsp, vec![0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x03]);
    }

    #[test]
    fn leaves_input_without_escapes_unchanged() {
        let data = [0x67, 0x42, 0x00, 0x1e, 0x01, 0x02];
        assert_eq!(unescape_rbsp(&data), data.to_vec());
    }

    #[test]
    fn is_left_inverse_of_escaping() {
        // escape: insert 0x03 after any 00 00 that is followed by 00/01/02/03
        fn escape(rbsp: &[u8]) -> Vec<u8> {
            let mut out = Vec::new();
            let mut zero_run = 0;
            for &b in rbsp {
                if zero_run >= 2 && b <= 3 {
                    out.push(0x03);
                    zero_run = 0;
                }
                out.push(b);
                if b == 0 {
                    zero_run += 1;
                } else {
                    zero_run = 0;
                }
            }
            out
        }

        let samples: [&[u8]; 3] = [
            &[0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x01],
            &[0x01, 0x02, 0x03, 0x04],
            &[0x00, 0x00, 0x00, 0x00, 0x00],
        ];
        for rbsp in samples {
            let escaped = escape(rbsp);
            assert_eq!(unescape_rbsp(&escaped), rbsp.to_vec());
        }
    }
}
