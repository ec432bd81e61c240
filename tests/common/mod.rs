//! Shared test doubles.
#![allow(dead_code)]

use uhf_bridge::reader::Wire;
use uhf_bridge::serial;

/// A recording stand-in for the serial link.
pub struct MockWire {
    pub sent: Vec<Vec<u8>>,
    pub connected: bool,
    pub baud_rate: u32,
    /// Under-accept every send by this many bytes.
    pub short_by: usize,
}

impl MockWire {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            connected: true,
            baud_rate: 9600,
            short_by: 0,
        }
    }
}

impl Wire for MockWire {
    fn connected(&self) -> bool {
        self.connected
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn send(&mut self, frame: &[u8]) -> serial::Result<usize> {
        let accepted = frame.len().saturating_sub(self.short_by);
        self.sent.push(frame[..accepted].to_vec());
        Ok(accepted)
    }
}

/// Append the protocol checksum to a frame body.
pub fn framed(mut body: Vec<u8>) -> Vec<u8> {
    let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    body.push((!sum).wrapping_add(1));
    body
}
