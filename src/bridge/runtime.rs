//! Tokio runtime wrapper around a [`Bridge`].
//!
//! One task owns the bridge and multiplexes the operator command channel,
//! the 20 ms driver tick and the 1 s device poll; notifications fan out
//! over a broadcast channel. This keeps the core single-threaded and
//! non-blocking while giving hosts an async handle.

use log::debug;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use super::{Bridge, BridgeEvent, DEVICE_POLL_INTERVAL};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum BridgeCommand {
    SelectReaderModel(usize),
    SetPort(usize),
    SetBaudRate(usize),
    ToggleConnection,
    ClearHistory,
    WriteEpc(Vec<u8>),
    WriteRfu(Vec<u8>),
    WriteUser(Vec<u8>),
    EraseTag,
    KillTag,
    LockTag,
    ResolveConfirmation(bool),
    Shutdown,
}

#[derive(Clone)]
pub struct BridgeHandle {
    cmd_tx: mpsc::Sender<BridgeCommand>,
    events_tx: broadcast::Sender<BridgeEvent>,
}

impl BridgeHandle {
    pub fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events_tx.subscribe()
    }

    /// Enqueue a command; false when the bridge task has shut down.
    pub async fn send(&self, command: BridgeCommand) -> bool {
        self.cmd_tx.send(command).await.is_ok()
    }
}

/// Move the bridge into its event-loop task and return the handle.
pub fn spawn(bridge: Bridge) -> BridgeHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    tokio::spawn(bridge_task(bridge, cmd_rx, events_tx.clone()));

    BridgeHandle { cmd_tx, events_tx }
}

async fn bridge_task(
    mut bridge: Bridge,
    mut cmd_rx: mpsc::Receiver<BridgeCommand>,
    events_tx: broadcast::Sender<BridgeEvent>,
) {
    let mut tick = interval(super::tick_interval());
    let mut device_poll = interval(DEVICE_POLL_INTERVAL);

    loop {
        tokio::select! {
            maybe_command = cmd_rx.recv() => {
                match maybe_command {
                    None | Some(BridgeCommand::Shutdown) => break,
                    Some(command) => {
                        if let Err(e) = dispatch(&mut bridge, command) {
                            debug!("command failed: {e}");
                        }
                    }
                }
            }
            _ = tick.tick() => bridge.tick(Instant::now()),
            _ = device_poll.tick() => bridge.poll_devices(),
        }

        for event in bridge.drain_events() {
            // Send errors just mean nobody is subscribed right now.
            let _ = events_tx.send(event);
        }
    }
}

fn dispatch(bridge: &mut Bridge, command: BridgeCommand) -> super::Result<()> {
    match command {
        BridgeCommand::SelectReaderModel(index) => bridge.select_reader_model(index),
        BridgeCommand::SetPort(index) => bridge.set_port(index),
        BridgeCommand::SetBaudRate(index) => bridge.set_baud_rate(index),
        BridgeCommand::ToggleConnection => bridge.toggle_connection(),
        BridgeCommand::ClearHistory => {
            bridge.clear_history();
            Ok(())
        }
        BridgeCommand::WriteEpc(payload) => bridge.write_epc(&payload),
        BridgeCommand::WriteRfu(payload) => bridge.write_rfu(&payload),
        BridgeCommand::WriteUser(payload) => bridge.write_user(&payload),
        BridgeCommand::EraseTag => {
            bridge.erase_tag();
            Ok(())
        }
        BridgeCommand::KillTag => {
            bridge.kill_tag();
            Ok(())
        }
        BridgeCommand::LockTag => {
            bridge.lock_tag();
            Ok(())
        }
        BridgeCommand::ResolveConfirmation(accepted) => bridge.resolve_confirmation(accepted),
        BridgeCommand::Shutdown => Ok(()),
    }
}
