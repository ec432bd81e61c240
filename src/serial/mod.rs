pub mod transport;

pub use transport::SerialTransport;

use serde::{Deserialize, Serialize};

/// One enumerated serial device, as offered to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub description: String,
    pub port_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Selected device is no longer available")]
    PortUnavailable,

    #[error("Failed to open port: {0}")]
    OpenFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Port(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// The platform's customary baud-rate ladder.
pub const STANDARD_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Baud rates as strings, ready for an operator-facing selection list.
pub fn standard_baud_rates() -> Vec<String> {
    STANDARD_BAUD_RATES.iter().map(|rate| rate.to_string()).collect()
}
