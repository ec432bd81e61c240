pub mod sm6210;

pub use sm6210::Sm6210;

use crate::serial;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Reader preconditions not met")]
    NotLoaded,

    #[error("Operation not supported by this reader model")]
    Unsupported,

    #[error("Serial link accepted fewer bytes than submitted")]
    WriteShort,

    #[error("Ingress buffer exceeded {0} bytes and was discarded")]
    FrameTooLarge(usize),

    #[error("Payload rejected: {0}")]
    Encoding(String),

    #[error("Serial error: {0}")]
    Serial(#[from] serial::SerialError),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Byte-level view of the serial link, as much of it as a driver needs.
///
/// [`crate::serial::SerialTransport`] implements this for the real port;
/// tests substitute recording doubles.
pub trait Wire {
    fn connected(&self) -> bool;
    fn baud_rate(&self) -> u32;
    /// Submit a frame, returning how many bytes the link accepted.
    fn send(&mut self, frame: &[u8]) -> serial::Result<usize>;
}

/// A decoded bank observation lifted out of the reader's reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankEvent {
    Epc(Vec<u8>),
    Tid(Vec<u8>),
    Rfu(Vec<u8>),
    /// User bank payload together with its datagram index.
    User(Vec<u8>, usize),
}

/// Model-specific reader driver.
///
/// A driver is a cooperative state machine: the facade ticks it on a fixed
/// cadence and hands it raw ingress batches; the driver decides what to
/// transmit and lifts replies into [`BankEvent`]s. Implementations never
/// block.
pub trait ReaderDriver: Send {
    /// Marketing name of the reader model, as shown to the operator.
    fn model(&self) -> &'static str;

    /// Whether the link is usable for this model (connected, right baud).
    fn loaded(&self, wire: &dyn Wire) -> bool;

    /// Perform one transmit decision. `tag_in_field` tells the driver
    /// whether the aggregator currently tracks a tag.
    fn tick(&mut self, wire: &mut dyn Wire, tag_in_field: bool);

    /// Feed one ingress batch. At most one packet is interpreted per batch;
    /// the rest stays buffered for the next call.
    fn ingest(&mut self, wire: &mut dyn Wire, data: &[u8]) -> Result<Option<BankEvent>>;

    fn write_epc(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()>;
    fn write_rfu(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()>;
    fn write_user(&mut self, wire: &mut dyn Wire, payload: &[u8]) -> Result<()>;

    /// Zero out the writable banks of the current tag.
    fn erase(&mut self, wire: &mut dyn Wire) -> Result<()>;

    fn kill(&mut self, wire: &mut dyn Wire) -> Result<()>;
    fn lock(&mut self, wire: &mut dyn Wire) -> Result<()>;
}

/// Reader models this crate can drive, in selection order.
pub fn supported_models() -> Vec<&'static str> {
    vec![Sm6210::MODEL]
}

/// Instantiate the driver for an entry of [`supported_models`].
pub fn driver_for(index: usize) -> Option<Box<dyn ReaderDriver>> {
    match index {
        0 => Some(Box::new(Sm6210::new())),
        _ => None,
    }
}
