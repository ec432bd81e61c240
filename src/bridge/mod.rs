//! Command facade over the transport, driver and roster.
//!
//! The bridge is what the hosting process talks to: it carries the
//! operator commands, owns the connection state machine, runs the periodic
//! duties (driver tick, device poll, watchdog) and queues change
//! notifications for the host to drain. Everything here is synchronous;
//! [`runtime`] wraps a bridge in a tokio task with channels on both ends.

pub mod runtime;

pub use runtime::{spawn, BridgeCommand, BridgeHandle};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::reader::{self, DriverError, ReaderDriver};
use crate::serial::{self, DeviceEntry, SerialError, SerialTransport, STANDARD_BAUD_RATES};
use crate::tags::{report, TagEvent, TagRecord, TagRoster, CURRENT_TAG_TIMEOUT};

/// Cadence of the driver tick: fifty ticks per watchdog period.
pub fn tick_interval() -> Duration {
    CURRENT_TAG_TIMEOUT / 50
}

/// Cadence of the serial device poll.
pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No reader model selected")]
    NoReader,

    #[error("Unknown reader model index {0}")]
    UnknownModel(usize),

    #[error("No serial device selected")]
    NoDevice,

    #[error("Unknown baud rate index {0}")]
    UnknownBaudRate(usize),

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Hex payload rejected: {0}")]
    Encoding(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// The user-initiated tag operations, as reported back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagOperation {
    WriteEpc,
    WriteRfu,
    WriteUser,
    Erase,
    Kill,
    Lock,
}

/// Change notifications for the host, in dispatch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BridgeEvent {
    DevicesChanged(Vec<DeviceEntry>),
    ConnectionChanged { connected: bool, silent: bool },
    BaudRateChanged(u32),
    DataSent(Vec<u8>),
    DataReceived(Vec<u8>),
    TagUpdated,
    TagCountChanged(usize),
    CurrentTagChanged(Option<TagRecord>),
    ConfirmationRequested(TagOperation),
    OperationFinished { operation: TagOperation, success: bool },
}

pub struct Bridge {
    transport: SerialTransport,
    roster: TagRoster,
    driver: Option<Box<dyn ReaderDriver>>,
    state: ConnectionState,
    selected_device: Option<usize>,
    pending_confirmation: Option<TagOperation>,
    events: Vec<BridgeEvent>,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            transport: SerialTransport::new(),
            roster: TagRoster::new(),
            driver: None,
            state: ConnectionState::Idle,
            selected_device: None,
            pending_confirmation: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn roster(&self) -> &TagRoster {
        &self.roster
    }

    /// Queued notifications since the last drain, in dispatch order.
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }

    // ------------------------------------------------------------------
    // Registry surface
    // ------------------------------------------------------------------

    pub fn reader_models(&self) -> Vec<&'static str> {
        reader::supported_models()
    }

    pub fn baud_rates(&self) -> Vec<String> {
        serial::standard_baud_rates()
    }

    pub fn devices(&self) -> &[DeviceEntry] {
        self.transport.devices()
    }

    // ------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------

    pub fn select_reader_model(&mut self, index: usize) -> Result<()> {
        let driver = reader::driver_for(index).ok_or(BridgeError::UnknownModel(index))?;
        info!("selected reader model: {}", driver.model());
        self.driver = Some(driver);
        let events = self.roster.clear(Instant::now());
        self.push_tag_events(events);
        Ok(())
    }

    /// Select the serial device for the next connection attempt. A live
    /// connection to a previously selected device is dropped.
    pub fn set_port(&mut self, index: usize) -> Result<()> {
        if self.transport.connected() {
            self.disconnect(false);
        }
        if index >= self.transport.devices().len() {
            return Err(SerialError::PortUnavailable.into());
        }
        self.selected_device = Some(index);
        Ok(())
    }

    pub fn set_baud_rate(&mut self, index: usize) -> Result<()> {
        let rate = *STANDARD_BAUD_RATES
            .get(index)
            .ok_or(BridgeError::UnknownBaudRate(index))?;
        let applied = self.transport.set_baud_rate(rate);
        self.push(BridgeEvent::BaudRateChanged(rate));
        applied.map_err(Into::into)
    }

    pub fn toggle_connection(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                self.disconnect(false);
                Ok(())
            }
            _ => self.connect(),
        }
    }

    pub fn clear_history(&mut self) {
        let events = self.roster.clear(Instant::now());
        self.push_tag_events(events);
    }

    pub fn write_epc(&mut self, payload: &[u8]) -> Result<()> {
        self.tag_operation(TagOperation::WriteEpc, Some(payload))
    }

    pub fn write_rfu(&mut self, payload: &[u8]) -> Result<()> {
        self.tag_operation(TagOperation::WriteRfu, Some(payload))
    }

    pub fn write_user(&mut self, payload: &[u8]) -> Result<()> {
        self.tag_operation(TagOperation::WriteUser, Some(payload))
    }

    pub fn erase_tag(&mut self) {
        self.request_confirmation(TagOperation::Erase);
    }

    pub fn kill_tag(&mut self) {
        self.request_confirmation(TagOperation::Kill);
    }

    pub fn lock_tag(&mut self) {
        self.request_confirmation(TagOperation::Lock);
    }

    /// The host's answer to a [`BridgeEvent::ConfirmationRequested`].
    pub fn resolve_confirmation(&mut self, accepted: bool) -> Result<()> {
        let operation = match self.pending_confirmation.take() {
            Some(operation) => operation,
            None => return Ok(()),
        };
        if !accepted {
            info!("{operation:?} declined by the operator");
            return Ok(());
        }
        self.tag_operation(operation, None)
    }

    /// Memory-map dump of the current tag, if one is tracked.
    pub fn memory_map(&self) -> Option<String> {
        self.roster.current_tag().map(report::memory_map)
    }

    /// CSV rendering of the tag history.
    pub fn export_csv(&self) -> String {
        report::export_csv(&self.roster)
    }

    // ------------------------------------------------------------------
    // Periodic duties
    // ------------------------------------------------------------------

    /// Refresh the device list; run on a one-second cadence.
    pub fn poll_devices(&mut self) {
        if self.transport.poll_devices() {
            self.push(BridgeEvent::DevicesChanged(self.transport.devices().to_vec()));
        }
    }

    /// One scheduler cycle: watchdog, ingress, then the driver's transmit
    /// decision. Run every [`tick_interval`].
    pub fn tick(&mut self, now: Instant) {
        let expired = self.roster.poll_watchdog(now);
        self.push_tag_events(expired);

        if self.state != ConnectionState::Connected {
            return;
        }
        let mut driver = match self.driver.take() {
            Some(driver) => driver,
            None => return,
        };

        match self.transport.read_pending() {
            Ok(data) => {
                if !data.is_empty() {
                    self.push(BridgeEvent::DataReceived(data.clone()));
                    match driver.ingest(&mut self.transport, &data) {
                        Ok(Some(bank_event)) => {
                            let events = self.roster.apply(&bank_event, now);
                            self.push_tag_events(events);
                        }
                        Ok(None) => {}
                        Err(e) => warn!("ingress batch discarded: {e}"),
                    }
                }
            }
            Err(e) => {
                warn!("connection lost: {e}");
                self.state = ConnectionState::Idle;
                let events = self.roster.clear(now);
                self.push_tag_events(events);
                self.push(BridgeEvent::ConnectionChanged {
                    connected: false,
                    silent: false,
                });
                self.driver = Some(driver);
                return;
            }
        }

        // The scan only runs against a usable link; ingress above already
        // drops its bytes inside the driver when the link is not usable.
        if driver.loaded(&self.transport) {
            driver.tick(&mut self.transport, self.roster.current_tag().is_some());
        }
        self.driver = Some(driver);
        self.flush_sent();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn connect(&mut self) -> Result<()> {
        if self.driver.is_none() {
            return Err(BridgeError::NoReader);
        }
        let index = self.selected_device.ok_or(BridgeError::NoDevice)?;

        self.state = ConnectionState::Connecting;
        match self.transport.open(index) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.push(BridgeEvent::ConnectionChanged {
                    connected: true,
                    silent: false,
                });
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Idle;
                Err(e.into())
            }
        }
    }

    fn disconnect(&mut self, silent: bool) {
        self.state = ConnectionState::Disconnecting;
        let was_open = self.transport.close(silent);
        let events = self.roster.clear(Instant::now());
        self.push_tag_events(events);
        self.pending_confirmation = None;
        self.state = ConnectionState::Idle;
        if was_open {
            self.push(BridgeEvent::ConnectionChanged {
                connected: false,
                silent,
            });
        }
    }

    fn request_confirmation(&mut self, operation: TagOperation) {
        self.pending_confirmation = Some(operation);
        self.push(BridgeEvent::ConfirmationRequested(operation));
    }

    fn tag_operation(&mut self, operation: TagOperation, payload: Option<&[u8]>) -> Result<()> {
        let outcome = self.dispatch_operation(operation, payload);
        self.flush_sent();
        self.push(BridgeEvent::OperationFinished {
            operation,
            success: outcome.is_ok(),
        });
        outcome
    }

    fn dispatch_operation(&mut self, operation: TagOperation, payload: Option<&[u8]>) -> Result<()> {
        self.ensure_ready()?;
        let mut driver = match self.driver.take() {
            Some(driver) => driver,
            None => return Err(BridgeError::NoReader),
        };
        let payload = payload.unwrap_or_default();
        let result = match operation {
            TagOperation::WriteEpc => driver.write_epc(&mut self.transport, payload),
            TagOperation::WriteRfu => driver.write_rfu(&mut self.transport, payload),
            TagOperation::WriteUser => driver.write_user(&mut self.transport, payload),
            TagOperation::Erase => driver.erase(&mut self.transport),
            TagOperation::Kill => driver.kill(&mut self.transport),
            TagOperation::Lock => driver.lock(&mut self.transport),
        };
        self.driver = Some(driver);
        result.map_err(Into::into)
    }

    /// Writes need a usable link and a tag to write to.
    fn ensure_ready(&self) -> Result<()> {
        let driver = self.driver.as_ref().ok_or(BridgeError::NoReader)?;
        if !driver.loaded(&self.transport) {
            return Err(DriverError::NotLoaded.into());
        }
        if self.roster.current_tag().is_none() {
            return Err(DriverError::NotLoaded.into());
        }
        Ok(())
    }

    fn push(&mut self, event: BridgeEvent) {
        self.events.push(event);
    }

    fn push_tag_events(&mut self, events: Vec<TagEvent>) {
        for event in events {
            let mapped = match event {
                TagEvent::TagUpdated => BridgeEvent::TagUpdated,
                TagEvent::TagCountChanged => BridgeEvent::TagCountChanged(self.roster.tag_count()),
                TagEvent::CurrentTagChanged => {
                    BridgeEvent::CurrentTagChanged(self.roster.current_tag().cloned())
                }
            };
            self.events.push(mapped);
        }
    }

    fn flush_sent(&mut self) {
        for chunk in self.transport.take_sent() {
            self.events.push(BridgeEvent::DataSent(chunk));
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}
