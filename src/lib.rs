//! Host-side driver and tag manager for SM-6210 UHF RFID programmers.
//!
//! The crate talks to the reader over a plain serial link and keeps a live
//! view of whatever Gen-2 tag is in the RF field, plus a history of every
//! tag seen since connecting, with their EPC, TID, user and reserved banks
//! filled in over successive partial reads. Writable banks can be written
//! back, with the reader's lossy-link quirks (fixed 9600 baud, ten-fold
//! write repetition, checksum-less quick-scan replies) handled here.
//!
//! A host drives the crate either synchronously through [`Bridge`], or
//! through [`spawn`], which moves the bridge into a tokio task and exposes
//! a command/event channel pair. Other reader models can be added behind
//! the [`reader::ReaderDriver`] trait; the SM-6210 is the one shipped.

pub mod bridge;
pub mod reader;
pub mod serial;
pub mod tags;

pub use bridge::{
    spawn, Bridge, BridgeCommand, BridgeError, BridgeEvent, BridgeHandle, ConnectionState,
    TagOperation,
};
pub use reader::{BankEvent, DriverError, ReaderDriver};
pub use serial::{DeviceEntry, SerialError, SerialTransport};
pub use tags::{TagRecord, TagRoster};
