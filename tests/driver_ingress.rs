//! Ingress behaviour of the SM-6210 driver: packet classification,
//! resynchronisation, the loaded gate and the buffer cap.

mod common;

use common::{framed, MockWire};
use uhf_bridge::reader::sm6210::MAX_BUFFER_SIZE;
use uhf_bridge::reader::{BankEvent, DriverError, ReaderDriver, Sm6210};

fn epc_frame(payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0xE0, 0x0A, 0x80, 0x00, 0x01, 0x02, payload.len() as u8];
    body.extend_from_slice(payload);
    framed(body)
}

fn tid_frame(payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0xE0, 0x0A, 0x80, 0x00, 0x02, 0x00, payload.len() as u8];
    body.extend_from_slice(payload);
    framed(body)
}

fn user_frame(word_start: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0xE0, 0x0A, 0x80, 0x00, 0x03, word_start, payload.len() as u8];
    body.extend_from_slice(payload);
    framed(body)
}

#[test]
fn ack_handshake_answers_with_read_single_tag() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let ack = framed(vec![0xE0, 0x06, 0x61, 0x00, 0x00, 0x64, 0x00]);
    let event = driver.ingest(&mut wire, &ack).unwrap();

    assert_eq!(event, None);
    assert_eq!(wire.sent, vec![vec![0xA0, 0x03, 0x82, 0x00, 0xDB]]);

    // The ack is consumed: replaying silence yields nothing further.
    let event = driver.ingest(&mut wire, &[0x00]).unwrap();
    assert_eq!(event, None);
    assert_eq!(wire.sent.len(), 1);
}

#[test]
fn epc_bank_read_is_lifted_to_an_event() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let frame = vec![
        0xE0, 0x0A, 0x80, 0x00, 0x01, 0x02, 0x06, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x92,
    ];
    let event = driver.ingest(&mut wire, &frame).unwrap();
    assert_eq!(
        event,
        Some(BankEvent::Epc(vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]))
    );
}

#[test]
fn leading_garbage_is_dropped_with_the_frame() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    assert_eq!(driver.ingest(&mut wire, &[0xFF, 0xFF, 0xFF]).unwrap(), None);

    let event = driver
        .ingest(&mut wire, &tid_frame(&[0x10, 0x20, 0x30]))
        .unwrap();
    assert_eq!(event, Some(BankEvent::Tid(vec![0x10, 0x20, 0x30])));
}

#[test]
fn corrupt_frame_does_not_block_the_next_valid_one() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let mut corrupt = epc_frame(&[0x01, 0x02]);
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0xFF;

    // Nothing matches the corrupt frame; it stays buffered.
    assert_eq!(driver.ingest(&mut wire, &corrupt).unwrap(), None);

    // The next batch resynchronises on the valid frame behind it.
    let event = driver.ingest(&mut wire, &epc_frame(&[0x03, 0x04])).unwrap();
    assert_eq!(event, Some(BankEvent::Epc(vec![0x03, 0x04])));
}

#[test]
fn quick_scan_epc_skips_checksum_verification() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let mut body = vec![0xE0, 0x0A, 0x82, 0x00, 0x01, 0x02, 0x03, 0x0A, 0x0B, 0x0C];
    body.push(0x00); // checksum deliberately wrong
    let event = driver.ingest(&mut wire, &body).unwrap();
    assert_eq!(event, Some(BankEvent::Epc(vec![0x0A, 0x0B, 0x0C])));
}

#[test]
fn user_reads_carry_their_datagram_index() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let payload = [0x55u8; 16];
    let event = driver.ingest(&mut wire, &user_frame(24, &payload)).unwrap();
    assert_eq!(event, Some(BankEvent::User(payload.to_vec(), 3)));
}

#[test]
fn out_of_window_user_reads_are_discarded() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    let event = driver.ingest(&mut wire, &user_frame(32, &[0x01])).unwrap();
    assert_eq!(event, None);

    // The frame was consumed, not left to clog the buffer.
    let event = driver.ingest(&mut wire, &user_frame(8, &[0x02])).unwrap();
    assert_eq!(event, Some(BankEvent::User(vec![0x02], 1)));
}

#[test]
fn bytes_are_dropped_until_loaded() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();
    wire.baud_rate = 115_200;

    let frame = epc_frame(&[0x01, 0x02]);
    assert_eq!(driver.ingest(&mut wire, &frame).unwrap(), None);

    // Back at the mandated rate the same frame parses, proving the earlier
    // bytes were never buffered (a half-kept frame would desynchronise).
    wire.baud_rate = 9600;
    let event = driver.ingest(&mut wire, &frame).unwrap();
    assert_eq!(event, Some(BankEvent::Epc(vec![0x01, 0x02])));
}

#[test]
fn disconnected_wire_drops_bytes() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();
    wire.connected = false;

    let event = driver.ingest(&mut wire, &epc_frame(&[0x01])).unwrap();
    assert_eq!(event, None);
}

#[test]
fn overflowing_the_buffer_discards_everything() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    // Garbage without header bytes never matches and keeps accumulating.
    let junk = vec![0x11u8; MAX_BUFFER_SIZE];
    assert_eq!(driver.ingest(&mut wire, &junk).unwrap(), None);

    match driver.ingest(&mut wire, &[0x11]) {
        Err(DriverError::FrameTooLarge(cap)) => assert_eq!(cap, MAX_BUFFER_SIZE),
        other => panic!("expected FrameTooLarge, got {other:?}"),
    }

    // A clean buffer afterwards: the next frame decodes on its own.
    let event = driver.ingest(&mut wire, &epc_frame(&[0x09])).unwrap();
    assert_eq!(event, Some(BankEvent::Epc(vec![0x09])));
}

#[test]
fn stray_responses_and_results_are_consumed_silently() {
    let mut driver = Sm6210::new();
    let mut wire = MockWire::new();

    // Short status response (size < 6).
    assert_eq!(
        driver.ingest(&mut wire, &[0xE0, 0x04, 0x01, 0x02]).unwrap(),
        None
    );
    // Result frame, dropped by its size byte.
    assert_eq!(
        driver
            .ingest(&mut wire, &[0xE4, 0x05, 0x01, 0x02, 0x03])
            .unwrap(),
        None
    );
    // Neither left residue that would block a real frame.
    let event = driver.ingest(&mut wire, &epc_frame(&[0x42])).unwrap();
    assert_eq!(event, Some(BankEvent::Epc(vec![0x42])));
}
