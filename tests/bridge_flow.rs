//! Facade-level behaviour: the registry surface, the connection state
//! machine guards, the confirmation flow and the runtime handle.

use std::time::{Duration, Instant};

use uhf_bridge::bridge::{BridgeCommand, TagOperation};
use uhf_bridge::{Bridge, BridgeError, BridgeEvent, ConnectionState, DriverError, SerialError};

#[test]
fn starts_idle_with_the_sm6210_on_offer() {
    let bridge = Bridge::new();
    assert_eq!(bridge.state(), ConnectionState::Idle);
    assert_eq!(
        bridge.reader_models(),
        vec!["SM-6210 USB UHF RFID Programmer"]
    );
    assert_eq!(bridge.baud_rates()[3], "9600");
    assert!(bridge.devices().is_empty());
}

#[test]
fn connecting_requires_a_model_and_a_device() {
    let mut bridge = Bridge::new();

    assert!(matches!(
        bridge.toggle_connection(),
        Err(BridgeError::NoReader)
    ));
    assert_eq!(bridge.state(), ConnectionState::Idle);

    bridge.select_reader_model(0).unwrap();
    assert!(matches!(
        bridge.toggle_connection(),
        Err(BridgeError::NoDevice)
    ));
    assert_eq!(bridge.state(), ConnectionState::Idle);
}

#[test]
fn unknown_model_and_baud_indices_are_rejected() {
    let mut bridge = Bridge::new();
    assert!(matches!(
        bridge.select_reader_model(7),
        Err(BridgeError::UnknownModel(7))
    ));
    assert!(matches!(
        bridge.set_baud_rate(99),
        Err(BridgeError::UnknownBaudRate(99))
    ));
}

#[test]
fn stale_device_index_is_port_unavailable() {
    let mut bridge = Bridge::new();
    assert!(matches!(
        bridge.set_port(42),
        Err(BridgeError::Serial(SerialError::PortUnavailable))
    ));
}

#[test]
fn baud_rate_changes_are_always_announced() {
    let mut bridge = Bridge::new();
    bridge.set_baud_rate(3).unwrap();
    let events = bridge.drain_events();
    assert!(events.contains(&BridgeEvent::BaudRateChanged(9600)));
}

#[test]
fn writes_refuse_to_run_without_a_loaded_reader() {
    let mut bridge = Bridge::new();
    bridge.select_reader_model(0).unwrap();
    bridge.drain_events();

    let result = bridge.write_epc(&[0x01]);
    assert!(matches!(
        result,
        Err(BridgeError::Driver(DriverError::NotLoaded))
    ));

    let events = bridge.drain_events();
    assert!(events.contains(&BridgeEvent::OperationFinished {
        operation: TagOperation::WriteEpc,
        success: false,
    }));
}

#[test]
fn erase_waits_for_confirmation() {
    let mut bridge = Bridge::new();
    bridge.select_reader_model(0).unwrap();
    bridge.drain_events();

    bridge.erase_tag();
    let events = bridge.drain_events();
    assert_eq!(
        events,
        vec![BridgeEvent::ConfirmationRequested(TagOperation::Erase)]
    );

    // Declined: nothing happens, not even a failure report.
    bridge.resolve_confirmation(false).unwrap();
    assert!(bridge.drain_events().is_empty());

    // Accepted after a fresh request: the attempt runs and fails without a
    // reader, which the host learns through the operation report.
    bridge.erase_tag();
    bridge.drain_events();
    let result = bridge.resolve_confirmation(true);
    assert!(result.is_err());
    let events = bridge.drain_events();
    assert!(events.contains(&BridgeEvent::OperationFinished {
        operation: TagOperation::Erase,
        success: false,
    }));
}

#[test]
fn stray_confirmation_answers_are_ignored() {
    let mut bridge = Bridge::new();
    assert!(bridge.resolve_confirmation(true).is_ok());
    assert!(bridge.drain_events().is_empty());
}

#[test]
fn kill_and_lock_go_through_the_same_confirmation_gate() {
    let mut bridge = Bridge::new();
    bridge.kill_tag();
    bridge.lock_tag();
    let events = bridge.drain_events();
    assert_eq!(
        events,
        vec![
            BridgeEvent::ConfirmationRequested(TagOperation::Kill),
            BridgeEvent::ConfirmationRequested(TagOperation::Lock),
        ]
    );
}

#[test]
fn clear_history_reports_the_reset() {
    let mut bridge = Bridge::new();
    bridge.clear_history();
    let events = bridge.drain_events();
    assert!(events.contains(&BridgeEvent::TagCountChanged(0)));
    assert!(events.contains(&BridgeEvent::CurrentTagChanged(None)));
}

#[test]
fn reports_render_without_a_tag() {
    let bridge = Bridge::new();
    assert_eq!(bridge.memory_map(), None);
    assert_eq!(bridge.export_csv(), "Tag ID,EPC,User Data,Reserved Data\n");
}

#[test]
fn ticking_while_idle_is_harmless() {
    let mut bridge = Bridge::new();
    let now = Instant::now();
    for i in 0..10 {
        bridge.tick(now + Duration::from_millis(20 * i));
    }
    assert_eq!(bridge.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn runtime_forwards_commands_and_events() {
    let handle = uhf_bridge::spawn(Bridge::new());
    let mut events = handle.subscribe_events();

    assert!(handle.send(BridgeCommand::SetBaudRate(3)).await);

    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(BridgeEvent::BaudRateChanged(rate)) => break rate,
                Ok(_) => continue,
                Err(e) => panic!("event stream closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for BaudRateChanged");

    assert_eq!(event, 9600);
    handle.send(BridgeCommand::Shutdown).await;
}
