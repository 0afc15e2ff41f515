use crate::codecs::h264::{H264FrameBoundary, H264NaluType, H264Parser};
use crate::codecs::h265::{H265FrameBoundary, H265NaluType, H265Parser};
use crate::types::{Codec, Framerate, Resolution};

/// Snapshot of the stream parameters a decoder must be reconfigured for.
/// Produced as a sidecar on the first AU after any of these fields change
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfigChange {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub bit_depth_luma_minus8: u32,
    pub resolution: Resolution,
    pub framerate: Option<Framerate>,
}

enum CodecParser {
    H264(H264Parser),
    H265(H265Parser),
}

impl CodecParser {
    fn have_sps(&self) -> bool {
        match self {
            CodecParser::H264(p) => p.have_sps(),
            CodecParser::H265(p) => p.have_sps(),
        }
    }

    fn resolution(&self) -> Option<Resolution> {
        match self {
            CodecParser::H264(p) => p.resolution(),
            CodecParser::H265(p) => p.resolution(),
        }
    }

    fn framerate(&self) -> Option<Framerate> {
        match self {
            CodecParser::H264(p) => p.framerate(),
            CodecParser::H265(p) => p.framerate(),
        }
    }

    fn profile_level_bit_depth(&self) -> Option<(u8, u8, u32)> {
        match self {
            CodecParser::H264(p) => p.profile_level_bit_depth(),
            CodecParser::H265(p) => p.profile_level_bit_depth(),
        }
    }
}

/// One step of feeding bytes through [`AccessUnitAssembler::push`]: either a
/// complete access unit (with its decoder-config sidecar, non-null exactly
/// when parameters changed since the previously emitted access unit), or a
/// request for more input before progress can continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerStep {
    AccessUnit(Vec<u8>, Option<DecoderConfigChange>),
    NeedMoreData,
}

/// H.264/H.265 Annex-B access-unit assembler. One instance
/// per input stream. Feed it arbitrarily sized, arbitrarily chunked input
/// via [`push`](Self::push); it returns every complete access unit that
/// chunk makes available, in order, followed by `NeedMoreData` once no
/// further start code is found. Call [`flush`](Self::flush) once at
/// end-of-stream to obtain the final, possibly partial, access unit.
pub struct AccessUnitAssembler {
    codec: CodecParser,
    partial_inbuf: Vec<u8>,
    partial_outbuf: Vec<u8>,
    has_slice: bool,
    last_config: Option<DecoderConfigChange>,
}

impl AccessUnitAssembler {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec: match codec {
                Codec::H264 => CodecParser::H264(H264Parser::new()),
                Codec::H265 => CodecParser::H265(H265Parser::new()),
            },
            partial_inbuf: Vec::new(),
            partial_outbuf: Vec::new(),
            has_slice: false,
            last_config: None,
        }
    }

    /// Feeds `input` into the assembler and returns every access unit that
    /// becomes available, ending with `NeedMoreData` once the remaining
    /// bytes are held back awaiting a following start code.
    pub fn push(&mut self, input: &[u8]) -> Vec<AssemblerStep> {
        let mut buf = std::mem::take(&mut self.partial_inbuf);
        buf.extend_from_slice(input);

        let mut steps = Vec::new();
        let mut cursor = 0usize;

        loop {
            match find_start_code(&buf, cursor + 2) {
                None => {
                    self.partial_inbuf = buf[cursor..].to_vec();
                    steps.push(AssemblerStep::NeedMoreData);
                    return steps;
                }
                Some(next_start) => {
                    let nal_with_start_code = &buf[cursor..next_start];
                    if let Some((au, cfg)) = self.consume_nal(nal_with_start_code) {
                        steps.push(AssemblerStep::AccessUnit(au, cfg));
                    }
                    cursor = next_start;
                }
            }
        }
    }

    /// Call once after the final `push` returns `NeedMoreData`, to flush
    /// whatever access unit(s) were still under construction. The trailing
    /// NAL held in `partial_inbuf` never got to see a following start code
    /// during `push`, so it was never parsed; at end of stream it is
    /// parsed now, which may close out an access unit that was already
    /// accumulating, and its own bytes become (the start of) the final
    /// access unit, which is then flushed unconditionally since nothing
    /// further is coming. Returns zero, one, or two access units, each with
    /// its own decoder-config sidecar.
    pub fn flush(&mut self) -> Vec<(Vec<u8>, Option<DecoderConfigChange>)> {
        let mut aus = Vec::new();
        if !self.partial_inbuf.is_empty() {
            let tail = std::mem::take(&mut self.partial_inbuf);
            if let Some(pair) = self.consume_nal(&tail) {
                aus.push(pair);
            }
        }
        if !self.partial_outbuf.is_empty() {
            self.has_slice = false;
            let pre_snapshot = self.snapshot_config();
            let cfg = self.diff_config(pre_snapshot);
            aus.push((std::mem::take(&mut self.partial_outbuf), cfg));
        }
        aus
    }

    /// Current stream parameters, with no comparison against what was
    /// previously emitted. Used as a snapshot taken *before* processing a
    /// NAL that might close an access unit, so a sidecar attributed to the
    /// closed (older) access unit never picks up that same NAL's own
    /// parameter-set update, which belongs to the access unit this NAL is
    /// starting instead.
    fn snapshot_config(&self) -> Option<DecoderConfigChange> {
        let resolution = self.codec.resolution()?;
        let (profile_idc, level_idc, bit_depth_luma_minus8) =
            self.codec.profile_level_bit_depth().unwrap_or((0, 0, 0));
        Some(DecoderConfigChange {
            profile_idc,
            level_idc,
            bit_depth_luma_minus8,
            resolution,
            framerate: self.codec.framerate(),
        })
    }

    /// Compares `snapshot` against the config last attributed to an
    /// emitted access unit; returns it (and remembers it) only if it
    /// differs.
    fn diff_config(&mut self, snapshot: Option<DecoderConfigChange>) -> Option<DecoderConfigChange> {
        if self.last_config == snapshot {
            None
        } else {
            self.last_config = snapshot;
            snapshot
        }
    }

    /// Processes one NAL span (including its leading start code) found
    /// between two scan positions. Returns the completed access unit (with
    /// its decoder-config sidecar) if this NAL closed one.
    fn consume_nal(
        &mut self,
        nal_with_start_code: &[u8],
    ) -> Option<(Vec<u8>, Option<DecoderConfigChange>)> {
        let start_code_len = start_code_length(nal_with_start_code);
        let nal = &nal_with_start_code[start_code_len..];
        if nal.is_empty() {
            return None;
        }

        let classification = self.classify(nal);

        if !classification.is_vcl && !self.codec.have_sps() {
            // Parameter sets are always accepted even before HAVE_SPS.
        } else if classification.is_vcl && !self.codec.have_sps() {
            // VCL NALs before any SPS are discarded and whatever was
            // accumulating is reset.
            self.partial_outbuf.clear();
            self.has_slice = false;
            return None;
        }

        // Snapshot parameters as they stood for the access unit already
        // accumulating, before this NAL's own decode (below) can update
        // them.
        let pre_snapshot = self.snapshot_config();

        let outcome = match &mut self.codec {
            CodecParser::H264(p) => match p.on_nal(nal) {
                Some(H264FrameBoundary::NewFrame) => NalOutcome::Boundary(true),
                Some(H264FrameBoundary::SameFrame) => NalOutcome::Boundary(false),
                Some(H264FrameBoundary::Drop) => NalOutcome::Drop,
                None => NalOutcome::Boundary(false),
            },
            CodecParser::H265(p) => match p.on_nal(nal) {
                Some(H265FrameBoundary::NewFrame) => NalOutcome::Boundary(true),
                _ => NalOutcome::Boundary(false),
            },
        };

        if matches!(outcome, NalOutcome::Drop) {
            // An unresolvable VCL slice (invalid/unseen PPS or SPS) is
            // dropped outright: never appended, `has_slice` untouched.
            return None;
        }
        let boundary_is_new = matches!(outcome, NalOutcome::Boundary(true));

        if classification.closes_au_if_has_slice && self.has_slice {
            let completed = std::mem::take(&mut self.partial_outbuf);
            self.partial_outbuf.extend_from_slice(nal_with_start_code);
            self.has_slice = false;
            let cfg = self.diff_config(pre_snapshot);
            return Some((completed, cfg));
        }

        if classification.is_vcl {
            if boundary_is_new && self.has_slice {
                let completed = std::mem::take(&mut self.partial_outbuf);
                self.partial_outbuf.extend_from_slice(nal_with_start_code);
                self.has_slice = true;
                let cfg = self.diff_config(pre_snapshot);
                return Some((completed, cfg));
            }
            self.partial_outbuf.extend_from_slice(nal_with_start_code);
            self.has_slice = true;
            return None;
        }

        self.partial_outbuf.extend_from_slice(nal_with_start_code);
        None
    }

    fn classify(&self, nal: &[u8]) -> NalClassification {
        match &self.codec {
            CodecParser::H264(_) => {
                let nal_unit_type = nal[0] & 0x1f;
                let is_vcl = (1..=5).contains(&nal_unit_type);
                let closes = matches!(
                    H264NaluType::from_u8(nal_unit_type),
                    Some(
                        H264NaluType::Sei
                            | H264NaluType::Sps
                            | H264NaluType::Pps
                            | H264NaluType::Aud
                            | H264NaluType::Prefix
                            | H264NaluType::SubsetSps
                    )
                ) || H264NaluType::from_u8(nal_unit_type).is_none();
                NalClassification {
                    is_vcl,
                    closes_au_if_has_slice: !is_vcl && closes,
                }
            }
            CodecParser::H265(_) => {
                let nal_unit_type = (nal[0] & 0x7e) >> 1;
                let is_vcl = nal_unit_type <= 23;
                let closes = matches!(
                    H265NaluType::from_u8(nal_unit_type),
                    Some(H265NaluType::Vps | H265NaluType::SeiPrefix)
                );
                NalClassification {
                    is_vcl,
                    closes_au_if_has_slice: !is_vcl && closes,
                }
            }
        }
    }
}

struct NalClassification {
    is_vcl: bool,
    closes_au_if_has_slice: bool,
}

/// Codec-agnostic result of feeding one NAL to the per-codec parser:
/// whether it opened a new frame, continued the current one, or (H.264
/// only, an unresolvable VCL slice) must be dropped outright.
enum NalOutcome {
    Boundary(bool),
    Drop,
}

/// `00 00 01`, backed up one byte to `00 00 00 01` if that preceding byte is
/// zero. Returns the offset of the first byte of whichever start code was
/// found, searching no earlier than `from`.
fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if data.len() < 3 {
        return None;
    }
    let mut i = from.max(0);
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            if i > 0 && data[i - 1] == 0 {
                return Some(i - 1);
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn start_code_length(nal_with_start_code: &[u8]) -> usize {
    if nal_with_start_code.len() >= 4
        && nal_with_start_code[0] == 0
        && nal_with_start_code[1] == 0
        && nal_with_start_code[2] == 0
        && nal_with_start_code[3] == 1
    {
        4
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sps_nal() -> Vec<u8> {
        sps_nal_with_width_mbs(9)
    }

    fn sps_nal_with_width_mbs(width_mbs_minus1: u32) -> Vec<u8> {
        // Reuses the minimal baseline SPS built for H264Parser's own tests;
        // duplicated here at the byte level since it is this module's
        // fixture too, not a shared production type.
        let mut bits = Vec::new();
        let push = |bits: &mut Vec<u8>, b: u8| bits.push(b);
        for i in (0..8).rev() {
            push(&mut bits, ((66u32 >> i) & 1) as u8);
        }
        for _ in 0..8 {
            push(&mut bits, 0);
        }
        for i in (0..8).rev() {
            push(&mut bits, ((30u32 >> i) & 1) as u8);
        }
        fn encode_ue(bits: &mut Vec<u8>, value: u32) {
            let mut tmp = value + 1;
            let mut num_bits = 0;
            while tmp > 1 {
                tmp >>= 1;
                num_bits += 1;
            }
            for _ in 0..num_bits {
                bits.push(0);
            }
            let codenum = value + 1;
            for i in (0..=num_bits).rev() {
                bits.push(((codenum >> i) & 1) as u8);
            }
        }
        encode_ue(&mut bits, 0);
        encode_ue(&mut bits, 0);
        encode_ue(&mut bits, 2);
        encode_ue(&mut bits, 1);
        bits.push(0);
        encode_ue(&mut bits, width_mbs_minus1);
        encode_ue(&mut bits, 8);
        bits.push(1);
        bits.push(1);
        bits.push(0);
        bits.push(0);
        let mut acc = 0u8;
        let mut n = 0u8;
        let mut rbsp = Vec::new();
        for &b in &bits {
            acc = (acc << 1) | b;
            n += 1;
            if n == 8 {
                rbsp.push(acc);
                acc = 0;
                n = 0;
            }
        }
        if n > 0 {
            rbsp.push(acc << (8 - n));
        }
        let mut nal = vec![0x00, 0x00, 0x00, 0x01, 0x67];
        nal.extend_from_slice(&rbsp);
        nal
    }

    fn pps_nal() -> Vec<u8> {
        vec![0x00, 0x00, 0x00, 0x01, 0x68, 0b1110_0000]
    }

    fn slice_nal(start_code4: bool, header_byte: u8, frame_num_bit: u8) -> Vec<u8> {
        let mut nal = if start_code4 {
            vec![0x00, 0x00, 0x00, 0x01]
        } else {
            vec![0x00, 0x00, 0x01]
        };
        nal.push(header_byte);
        // first_mb_in_slice=ue(0)="1", slice_type=ue(2)="011", pps_id=ue(0)="1"
        // frame_num (4 bits)
        let bits = [1u8, 0, 1, 1, 1, 0, 0, 0, frame_num_bit];
        let mut acc = 0u8;
        for (i, &b) in bits.iter().enumerate() {
            acc |= b << (7 - i);
        }
        nal.push(acc);
        nal
    }

    #[test]
    fn single_sps_pps_idr_then_p_slice_yields_two_aus() {
        let mut asm = AccessUnitAssembler::new(Codec::H264);
        let mut input = Vec::new();
        input.extend_from_slice(&sps_nal());
        input.extend_from_slice(&pps_nal());
        input.extend_from_slice(&slice_nal(true, 0x65, 1));
        input.extend_from_slice(&slice_nal(true, 0x41, 0));

        let steps = asm.push(&input);
        // The trailing P-slice never sees a following start code in this
        // finite input, so nothing closes until `flush`.
        assert!(steps
            .iter()
            .all(|s| matches!(s, AssemblerStep::NeedMoreData)));

        let final_aus = asm.flush();
        assert_eq!(final_aus.len(), 2);
        assert!(final_aus[1].0.starts_with(&[0x00, 0x00, 0x00, 0x01, 0x41]));

        let mut expected_au1 = Vec::new();
        expected_au1.extend_from_slice(&sps_nal());
        expected_au1.extend_from_slice(&pps_nal());
        expected_au1.extend_from_slice(&slice_nal(true, 0x65, 1));
        assert_eq!(final_aus[0].0, expected_au1.as_slice());
    }

    #[test]
    fn fragmented_one_byte_at_a_time_matches_single_call() {
        let mut input = Vec::new();
        input.extend_from_slice(&sps_nal());
        input.extend_from_slice(&pps_nal());
        input.extend_from_slice(&slice_nal(true, 0x65, 1));
        input.extend_from_slice(&slice_nal(true, 0x41, 0));

        let mut asm = AccessUnitAssembler::new(Codec::H264);
        let mut aus = Vec::new();
        for byte in &input {
            for step in asm.push(std::slice::from_ref(byte)) {
                if let AssemblerStep::AccessUnit(au, _) = step {
                    aus.push(au);
                }
            }
        }
        aus.extend(asm.flush().into_iter().map(|(au, _)| au));
        assert_eq!(aus.len(), 2);
    }

    #[test]
    fn vcl_before_sps_is_discarded() {
        let mut asm = AccessUnitAssembler::new(Codec::H264);
        let mut input = Vec::new();
        input.extend_from_slice(&slice_nal(true, 0x65, 1));
        input.extend_from_slice(&sps_nal());
        let steps = asm.push(&input);
        let aus: Vec<_> = steps
            .into_iter()
            .filter(|s| matches!(s, AssemblerStep::AccessUnit(_, _)))
            .collect();
        assert!(aus.is_empty());
    }

    #[test]
    fn resolution_change_attaches_config_to_the_au_that_actually_carries_it() {
        let mut asm = AccessUnitAssembler::new(Codec::H264);
        let mut input = Vec::new();
        // AU1: original resolution (160x144 luma samples via 9 mbs wide).
        input.extend_from_slice(&sps_nal_with_width_mbs(9));
        input.extend_from_slice(&pps_nal());
        input.extend_from_slice(&slice_nal(true, 0x65, 1));
        // A second SPS (same id, new width) sent while a slice is already
        // accumulating closes AU1 and opens AU2 with itself as the first
        // NAL — AU1 must NOT see this new width; AU2 (once it closes) must.
        input.extend_from_slice(&sps_nal_with_width_mbs(19));
        input.extend_from_slice(&slice_nal(true, 0x65, 0));
        // AU3: unchanged parameters after AU2 closes.
        input.extend_from_slice(&slice_nal(true, 0x41, 1));

        let mut aus = Vec::new();
        for step in asm.push(&input) {
            if let AssemblerStep::AccessUnit(au, cfg) = step {
                aus.push((au, cfg));
            }
        }
        aus.extend(asm.flush());
        assert_eq!(aus.len(), 3);

        // AU1 is the very first access unit emitted, so it always carries
        // a (non-null) initial config — at the *original* resolution.
        let au1_cfg = aus[0].1.expect("first access unit always reports its config");
        assert_eq!(au1_cfg.resolution.width, 160);

        // AU2 is the one that actually starts with the new SPS: its
        // sidecar must report the new width, not AU1's.
        let au2_cfg = aus[1]
            .1
            .expect("the access unit starting with the changed SPS reports the new config");
        assert_eq!(au2_cfg.resolution.width, 320);

        // AU3 has no parameter change since AU2, so no sidecar.
        assert!(aus[2].1.is_none());
    }

    #[test]
    fn vcl_with_unknown_pps_is_dropped_not_appended() {
        let mut asm = AccessUnitAssembler::new(Codec::H264);
        let mut input = Vec::new();
        input.extend_from_slice(&sps_nal());
        input.extend_from_slice(&pps_nal());
        input.extend_from_slice(&slice_nal(true, 0x65, 1));
        // A second slice referencing a PPS id (1) this parser never saw:
        // dropped outright, not folded into the access unit.
        let mut bad_slice = vec![0x00, 0x00, 0x00, 0x01, 0x41u8];
        // first_mb=ue(0)="1", slice_type=ue(2)="011", pps_id=ue(1)="010"
        bad_slice.push(0b1011_0100);
        input.extend_from_slice(&bad_slice);
        input.extend_from_slice(&slice_nal(true, 0x41, 0));

        let mut aus = Vec::new();
        for step in asm.push(&input) {
            if let AssemblerStep::AccessUnit(au, _) = step {
                aus.push(au);
            }
        }
        aus.extend(asm.flush().into_iter().map(|(au, _)| au));

        assert_eq!(aus.len(), 2);
        let mut expected_au2 = Vec::new();
        expected_au2.extend_from_slice(&slice_nal(true, 0x41, 0));
        assert_eq!(aus[1], expected_au2);
    }
}
