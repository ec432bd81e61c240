//! Ownership of the one serial connection and of the device snapshot.
//!
//! The transport does no framing: it pumps raw byte chunks in and out and
//! reports connection-level failures. The bridge polls [`poll_devices`] on
//! a one-second cadence and [`read_pending`] on every driver tick.
//!
//! [`poll_devices`]: SerialTransport::poll_devices
//! [`read_pending`]: SerialTransport::read_pending

use log::{debug, info, warn};
use serialport::{SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;

use super::{DeviceEntry, Result, SerialError};
use crate::reader::Wire;

const READ_TIMEOUT: Duration = Duration::from_millis(10);
const DEFAULT_BAUD: u32 = 9600;

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    devices: Vec<DeviceEntry>,
    baud_rate: u32,
    sent: Vec<Vec<u8>>,
}

impl SerialTransport {
    pub fn new() -> Self {
        Self {
            port: None,
            devices: Vec::new(),
            baud_rate: DEFAULT_BAUD,
            sent: Vec::new(),
        }
    }

    /// Slices accepted by the kernel since the last call, for `dataSent`
    /// reporting by the bridge.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }

    /// The most recent device snapshot.
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    pub fn connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Refresh the device snapshot. Returns true when the set of available
    /// devices changed since the previous poll.
    pub fn poll_devices(&mut self) -> bool {
        let snapshot = Self::enumerate();
        if snapshot != self.devices {
            self.devices = snapshot;
            true
        } else {
            false
        }
    }

    fn enumerate() -> Vec<DeviceEntry> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("port enumeration failed: {e}");
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .filter_map(|info| {
                // Only ports we can describe to the operator are offered.
                let description = match &info.port_type {
                    SerialPortType::UsbPort(usb) => {
                        usb.product.clone().or_else(|| usb.manufacturer.clone())
                    }
                    _ => None,
                }?;
                Some(DeviceEntry {
                    description,
                    port_name: info.port_name,
                })
            })
            .collect()
    }

    /// Open the device at `device_index` of the current snapshot, tearing
    /// down any previous connection first. 8-N-1 at the configured baud.
    pub fn open(&mut self, device_index: usize) -> Result<()> {
        self.close(true);

        let entry = self
            .devices
            .get(device_index)
            .ok_or(SerialError::PortUnavailable)?
            .clone();

        let port = serialport::new(entry.port_name.as_str(), self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| SerialError::OpenFailed(e.to_string()))?;

        info!("connected to {} at {} baud", entry.port_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    /// Drop the connection if any; idempotent. Returns whether a
    /// connection was actually closed. `silent` is only advisory for the
    /// caller's notification policy.
    pub fn close(&mut self, silent: bool) -> bool {
        match self.port.take() {
            Some(port) => {
                let name = port.name().unwrap_or_default();
                drop(port);
                if silent {
                    debug!("closed {name}");
                } else {
                    info!("disconnected from {name}");
                }
                true
            }
            None => false,
        }
    }

    /// Change the configured baud rate, reconfiguring the live connection
    /// when one exists.
    pub fn set_baud_rate(&mut self, rate: u32) -> Result<()> {
        self.baud_rate = rate;
        if let Some(port) = self.port.as_mut() {
            port.set_baud_rate(rate)?;
        }
        Ok(())
    }

    /// Submit bytes to the device. Returns how many the kernel accepted,
    /// which may be fewer than submitted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        let accepted = port.write(data)?;
        port.flush()?;
        debug!("sent {accepted}/{} bytes", data.len());
        self.sent.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    /// Drain everything the OS has buffered for us. A read error tears the
    /// connection down and is returned to the caller.
    pub fn read_pending(&mut self) -> Result<Vec<u8>> {
        if self.port.is_none() {
            return Ok(Vec::new());
        }

        let mut data = Vec::new();
        if let Err(e) = self.drain_into(&mut data) {
            warn!("read error, dropping connection: {e}");
            self.port = None;
            return Err(e);
        }
        Ok(data)
    }

    fn drain_into(&mut self, data: &mut Vec<u8>) -> Result<()> {
        let port = self.port.as_mut().ok_or(SerialError::NotConnected)?;
        loop {
            let available = port.bytes_to_read()? as usize;
            if available == 0 {
                return Ok(());
            }
            let mut chunk = vec![0u8; available];
            match port.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(count) => data.extend_from_slice(&chunk[..count]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Wire for SerialTransport {
    fn connected(&self) -> bool {
        SerialTransport::connected(self)
    }

    fn baud_rate(&self) -> u32 {
        SerialTransport::baud_rate(self)
    }

    fn send(&mut self, frame: &[u8]) -> Result<usize> {
        self.write(frame)
    }
}
