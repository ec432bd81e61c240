//! SM-6210 wire framing.
//!
//! Frames are `[header] [length] [opcode] [payload...] [checksum]` with no
//! self-synchronising markers. The checksum is the two's complement of the
//! byte sum over everything before it, so a whole valid frame sums to zero
//! modulo 256. The length byte is written exactly as each frame family
//! defines it; there is no single rule shared by all families.

use bytes::{Buf, BytesMut};

// Frame header codes.
pub const HEADER_START_CODE: u8 = 0xA0;
pub const HEADER_RESPONSE_CODE: u8 = 0xE0;
pub const HEADER_RESULT_CODE: u8 = 0xE4;

// Communication mode selector used by the short command frames.
pub const COMM_RS232: u8 = 0x03;

// Operation codes.
pub const DEV_STOP_SEARCH: u8 = 0xA8;
pub const DEV_WRITE_BANK: u8 = 0xAB;
pub const DEV_GET_SINGLE_PARAM: u8 = 0x61;
pub const DEV_READ_SINGLE_TAG: u8 = 0x82;
pub const DEV_READ_BANK: u8 = 0x80;

// Reader parameter requested when asking for a single-tag session.
pub const CRP_ADD_USERCODE: u8 = 0x64;

/// Tag memory banks addressable over the wire, with their two-byte labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bank {
    Rfu,
    Epc,
    Tid,
    User,
}

impl Bank {
    pub fn label(self) -> [u8; 2] {
        match self {
            Bank::Rfu => [0x00, 0x00],
            Bank::Epc => [0x00, 0x01],
            Bank::Tid => [0x00, 0x02],
            Bank::User => [0x00, 0x03],
        }
    }
}

/// Two's-complement checksum over the framed bytes.
pub fn checksum(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    (!sum).wrapping_add(1)
}

/// Build a bank read request.
pub fn encode_read(bank: Bank, word_start: u8, word_count: u8) -> Vec<u8> {
    let label = bank.label();
    let mut frame = vec![
        HEADER_START_CODE,
        0x06,
        DEV_READ_BANK,
        label[0],
        label[1],
        word_start,
        word_count,
    ];
    frame.push(checksum(&frame));
    frame
}

/// Build a bank write request carrying `payload`.
///
/// The length byte of this family counts every byte except the header and
/// the checksum, and is filled in only after the payload is appended.
pub fn encode_write(bank: Bank, word_start: u8, word_count: u8, payload: &[u8]) -> Vec<u8> {
    let label = bank.label();
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.push(HEADER_START_CODE);
    frame.push(DEV_WRITE_BANK);
    frame.push(label[0]);
    frame.push(label[1]);
    frame.push(word_start);
    frame.push(word_count);
    frame.extend_from_slice(payload);
    frame.insert(1, frame.len() as u8);
    frame.push(checksum(&frame));
    frame
}

/// Build the stop/reset command.
pub fn encode_stop() -> Vec<u8> {
    let mut frame = vec![HEADER_START_CODE, COMM_RS232, DEV_STOP_SEARCH, 0x00];
    frame.push(checksum(&frame));
    frame
}

/// Build the reply that accepts an offered single-tag session.
pub fn encode_ack_single() -> Vec<u8> {
    let mut frame = vec![HEADER_START_CODE, COMM_RS232, DEV_READ_SINGLE_TAG, 0x00];
    frame.push(checksum(&frame));
    frame
}

/// Build the request that asks the reader to pick up a tag and report it.
pub fn encode_session_request() -> Vec<u8> {
    let mut frame = vec![
        HEADER_START_CODE,
        0x05,
        DEV_GET_SINGLE_PARAM,
        0x00,
        0x00,
        CRP_ADD_USERCODE,
    ];
    frame.push(checksum(&frame));
    frame
}

/// Growable ingress byte queue with front-drop semantics.
///
/// The decoders below consume matched frames together with any garbage
/// preceding them; unmatched bytes stay put so a competing decoder can have
/// a look at the same buffer.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    fn consume(&mut self, count: usize) {
        let count = count.min(self.buf.len());
        self.buf.advance(count);
    }
}

/// One decoded bank response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankReading {
    pub bank: Bank,
    pub word_start: u8,
    pub payload: Vec<u8>,
}

/// Result of trying one decoder against the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A frame was validated and consumed, together with any leading bytes.
    Frame(BankReading),
    /// A candidate frame is anchored but not fully buffered yet.
    NeedMore,
    /// Nothing in the buffer belongs to this decoder. Nothing consumed.
    NoMatch,
}

fn find_header(data: &[u8], from: usize, header: u8) -> Option<usize> {
    data[from..].iter().position(|&b| b == header).map(|p| from + p)
}

/// Try to decode a bank read response for `bank`.
///
/// Response layout: `E0 size opcode l0 l1 word_start byte_count payload ck`.
/// Candidates are anchored at successive `0xE0` bytes; an opcode or label
/// mismatch yields [`DecodeOutcome::NoMatch`] immediately since the frame
/// may belong to a sibling decoder, while a checksum failure skips to the
/// next anchor — a corrupt frame is nobody's frame, and scanning past it is
/// what resynchronises the stream.
pub fn decode_bank_read(
    buf: &mut FrameBuffer,
    bank: Bank,
    single_tag: bool,
    verify_checksum: bool,
) -> DecodeOutcome {
    let expected_opcode = if single_tag {
        DEV_READ_SINGLE_TAG
    } else {
        DEV_READ_BANK
    };
    let label = bank.label();

    let data = buf.as_slice();
    let mut anchor = match find_header(data, 0, HEADER_RESPONSE_CODE) {
        Some(at) => at,
        None => return DecodeOutcome::NoMatch,
    };

    loop {
        let frame = &data[anchor..];
        if frame.len() < 7 {
            return DecodeOutcome::NeedMore;
        }
        if frame[2] != expected_opcode || frame[3] != label[0] || frame[4] != label[1] {
            return DecodeOutcome::NoMatch;
        }

        let word_start = frame[5];
        let data_len = frame[6] as usize;
        let total = 7 + data_len + 1;
        if frame.len() < total {
            return DecodeOutcome::NeedMore;
        }

        if verify_checksum && frame[total - 1] != checksum(&frame[..total - 1]) {
            anchor = match find_header(data, anchor + 1, HEADER_RESPONSE_CODE) {
                Some(at) => at,
                None => return DecodeOutcome::NoMatch,
            };
            continue;
        }

        let payload = frame[7..7 + data_len].to_vec();
        let end = anchor + total;
        buf.consume(end);
        return DecodeOutcome::Frame(BankReading {
            bank,
            word_start,
            payload,
        });
    }
}

/// Try to decode the fixed acknowledge packet that offers a single-tag
/// session. On a match the packet is consumed and the caller must answer
/// with [`encode_ack_single`].
pub fn decode_ack(buf: &mut FrameBuffer) -> bool {
    let data = buf.as_slice();
    let shift = match find_header(data, 0, HEADER_RESPONSE_CODE) {
        Some(at) => at,
        None => return false,
    };
    if data.len() < shift + 8 {
        return false;
    }

    let frame = &data[shift..shift + 8];
    let matched = frame[1] == 0x06
        && frame[2] == DEV_GET_SINGLE_PARAM
        && frame[3] == 0x00
        && frame[4] == 0x00
        && frame[5] == CRP_ADD_USERCODE
        && frame[6] == 0x00
        && frame[7] == checksum(&frame[..7]);

    if matched {
        buf.consume(shift + 8);
    }
    matched
}

/// Drop an ignorable short status response (`0xE0`-led, size under 6).
pub fn decode_response_short(buf: &mut FrameBuffer) -> bool {
    let data = buf.as_slice();
    let shift = match find_header(data, 0, HEADER_RESPONSE_CODE) {
        Some(at) => at,
        None => return false,
    };
    if data.len() < shift + 2 {
        return false;
    }
    let size = data[shift + 1] as usize;
    if size >= 6 {
        return false;
    }
    // A zero size byte would never make progress; treat the two framed
    // bytes we have already inspected as the minimum span.
    let span = size.max(2);
    if data.len() < shift + span {
        return false;
    }
    buf.consume(shift + span);
    true
}

/// Drop any result packet (`0xE4`-led) by its size byte.
pub fn decode_result_short(buf: &mut FrameBuffer) -> bool {
    let data = buf.as_slice();
    let shift = match find_header(data, 0, HEADER_RESULT_CODE) {
        Some(at) => at,
        None => return false,
    };
    if data.len() < shift + 2 {
        return false;
    }
    let size = (data[shift + 1] as usize).max(2);
    if data.len() < shift + size {
        return false;
    }
    buf.consume(shift + size);
    true
}
