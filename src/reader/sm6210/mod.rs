//! Driver for the SM-6210 USB UHF RFID programmer.
//!
//! The reader speaks a lossy request/response protocol at a fixed 9600
//! baud. While no tag is tracked the driver keeps asking for a single-tag
//! session and resets the reader after too many fruitless cycles; once a
//! tag is in the field it cycles bank read requests (TID, RFU, USER, EPC)
//! and interprets whatever replies make it through.

pub mod frame;

use log::{debug, warn};

use crate::tags::{EPC_LENGTH, NUM_USER_DATAGRAMS, RFU_LENGTH, USER_LENGTH};

use super::{BankEvent, DriverError, ReaderDriver, Result, Wire};
use frame::{Bank, DecodeOutcome, FrameBuffer};

/// Ingress bytes kept around while hunting for a parseable frame; beyond
/// this everything buffered is discarded.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024;

/// Fruitless ingress batches tolerated before the reader is told to stop
/// and reset.
const STALL_LIMIT: u8 = 10;

/// The device loses frames; every write is repeated this many times.
const WRITE_REPEAT: usize = 10;

/// The one baud rate the SM-6210 actually talks at.
const REQUIRED_BAUD: u32 = 9600;

pub struct Sm6210 {
    buffer: FrameBuffer,
    /// Which bank to request next while a tag is tracked (TID, RFU, USER,
    /// EPC in that order).
    bank_selector: usize,
    /// Consecutive ingress batches that produced nothing useful.
    shit_count: u8,
    /// Next word address for USER bank reads; one of 0, 8, 16, 24.
    user_word_cursor: u8,
}

impl Sm6210 {
    pub const MODEL: &'static str = "SM-6210 USB UHF RFID Programmer";

    pub fn new() -> Self {
        Self {
            buffer: FrameBuffer::new(),
            bank_selector: 0,
            shit_count: 0,
            user_word_cursor: 0,
        }
    }

    fn send_logged(wire: &mut dyn Wire, frame: &[u8]) {
        match wire.send(frame) {
            Ok(accepted) if accepted != frame.len() => {
                debug!("short write: {accepted} of {} bytes accepted", frame.len())
            }
            Ok(_) => {}
            Err(e) => debug!("send failed: {e}"),
        }
    }

    /// Write one frame [`WRITE_REPEAT`] times; every repetition has to put
    /// the complete frame on the wire.
    fn write_frame(&mut self, wire: &mut dyn Wire, frame: &[u8]) -> Result<()> {
        for _ in 0..WRITE_REPEAT {
            let accepted = wire.send(frame)?;
            if accepted != frame.len() {
                return Err(DriverError::WriteShort);
            }
        }
        Ok(())
    }

    fn write_bank(
        &mut self,
        wire: &mut dyn Wire,
        bank: Bank,
        word_start: u8,
        word_count: u8,
        payload: &[u8],
    ) -> Result<()> {
        let frame = frame::encode_write(bank, word_start, word_count, payload);
        debug!("writing {} bytes to {bank:?} at word {word_start}", payload.len());
        self.write_frame(wire, &frame)
    }

    /// Write `payload` into the user bank as 16-byte segments at word
    /// offsets 0, 8, 16 and 24. Segments past the end of the payload are
    /// still issued, empty; short trailing segments stay short. `erase`
    /// relies on the latter to reproduce the reader's historical 13-byte
    /// zero fill.
    fn write_user_segments(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()> {
        for byte_offset in (0..USER_LENGTH).step_by(16) {
            let segment = if byte_offset < payload.len() {
                &payload[byte_offset..payload.len().min(byte_offset + 16)]
            } else {
                &[]
            };
            self.write_bank(wire, Bank::User, (byte_offset / 2) as u8, 8, segment)?;
        }
        Ok(())
    }
}

impl Default for Sm6210 {
    fn default() -> Self {
        Self::new()
    }
}

fn zero_padded(payload: &[u8], length: usize) -> Vec<u8> {
    let mut padded = vec![0u8; length];
    padded[..payload.len()].copy_from_slice(payload);
    padded
}

fn check_length(payload: &[u8], limit: usize, what: &str) -> Result<()> {
    if payload.len() > limit {
        return Err(DriverError::Encoding(format!(
            "{what} payload is {} bytes, limit is {limit}",
            payload.len()
        )));
    }
    Ok(())
}

impl ReaderDriver for Sm6210 {
    fn model(&self) -> &'static str {
        Self::MODEL
    }

    fn loaded(&self, wire: &dyn Wire) -> bool {
        wire.connected() && wire.baud_rate() == REQUIRED_BAUD
    }

    fn tick(&mut self, wire: &mut dyn Wire, tag_in_field: bool) {
        if !tag_in_field {
            self.bank_selector = 0;

            if self.shit_count > STALL_LIMIT {
                self.shit_count = 0;
                debug!("reader unresponsive, sending stop/reset");
                Self::send_logged(wire, &frame::encode_stop());
            } else {
                Self::send_logged(wire, &frame::encode_session_request());
            }
            return;
        }

        let request = match self.bank_selector {
            0 => frame::encode_read(Bank::Tid, 0, 6),
            1 => frame::encode_read(Bank::Rfu, 0, 4),
            2 => {
                let word_start = self.user_word_cursor;
                self.user_word_cursor = (self.user_word_cursor + 8) % 32;
                frame::encode_read(Bank::User, word_start, 8)
            }
            _ => frame::encode_read(Bank::Epc, 2, 6),
        };
        self.bank_selector = (self.bank_selector + 1) % 4;
        Self::send_logged(wire, &request);
    }

    fn ingest(&mut self, wire: &mut dyn Wire, data: &[u8]) -> Result<Option<BankEvent>> {
        if data.is_empty() {
            return Ok(None);
        }
        if !self.loaded(&*wire) {
            return Ok(None);
        }

        self.buffer.push(data);

        // Decoders run in strict priority order; the first match consumes
        // its frame and ends the batch.
        if frame::decode_ack(&mut self.buffer) {
            debug!("single-tag session offered, acknowledging");
            Self::send_logged(wire, &frame::encode_ack_single());
            return Ok(None);
        }
        if let DecodeOutcome::Frame(reading) =
            frame::decode_bank_read(&mut self.buffer, Bank::Epc, true, false)
        {
            return Ok(Some(BankEvent::Epc(reading.payload)));
        }
        if let DecodeOutcome::Frame(reading) =
            frame::decode_bank_read(&mut self.buffer, Bank::Epc, false, true)
        {
            return Ok(Some(BankEvent::Epc(reading.payload)));
        }
        if let DecodeOutcome::Frame(reading) =
            frame::decode_bank_read(&mut self.buffer, Bank::Tid, false, true)
        {
            return Ok(Some(BankEvent::Tid(reading.payload)));
        }
        if let DecodeOutcome::Frame(reading) =
            frame::decode_bank_read(&mut self.buffer, Bank::Rfu, false, true)
        {
            return Ok(Some(BankEvent::Rfu(reading.payload)));
        }
        if let DecodeOutcome::Frame(reading) =
            frame::decode_bank_read(&mut self.buffer, Bank::User, false, true)
        {
            let datagram = (reading.word_start / 8) as usize;
            if datagram >= NUM_USER_DATAGRAMS {
                warn!(
                    "user datagram {datagram} (word {}) outside the addressable window, dropped",
                    reading.word_start
                );
                return Ok(None);
            }
            return Ok(Some(BankEvent::User(reading.payload, datagram)));
        }
        if frame::decode_response_short(&mut self.buffer) {
            return Ok(None);
        }
        if frame::decode_result_short(&mut self.buffer) {
            return Ok(None);
        }

        self.shit_count = self.shit_count.saturating_add(1);
        if self.buffer.len() > MAX_BUFFER_SIZE {
            self.buffer.clear();
            return Err(DriverError::FrameTooLarge(MAX_BUFFER_SIZE));
        }
        Ok(None)
    }

    fn write_epc(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()> {
        check_length(payload, EPC_LENGTH, "EPC")?;
        self.write_bank(wire, Bank::Epc, 2, 6, &zero_padded(payload, EPC_LENGTH))
    }

    fn write_rfu(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()> {
        check_length(payload, RFU_LENGTH, "RFU")?;
        self.write_bank(wire, Bank::Rfu, 0, 4, &zero_padded(payload, RFU_LENGTH))
    }

    fn write_user(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()> {
        check_length(payload, USER_LENGTH, "user")?;
        self.write_user_segments(wire, &zero_padded(payload, USER_LENGTH))
    }

    fn erase(&mut self, wire: &mut dyn Wire) -> Result<()> {
        self.write_epc(wire, &[0u8; EPC_LENGTH])?;
        self.write_rfu(wire, &[0u8; RFU_LENGTH])?;
        // Historical quirk: the reader family this descends from only ever
        // zeroed the first 13 bytes of the user bank. Kept for wire
        // compatibility.
        self.write_user_segments(wire, &[0u8; 13])
    }

    fn kill(&mut self, _wire: &mut dyn Wire) -> Result<()> {
        Err(DriverError::Unsupported)
    }

    fn lock(&mut self, _wire: &mut dyn Wire) -> Result<()> {
        Err(DriverError::Unsupported)
    }
}
