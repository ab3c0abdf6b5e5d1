//! Integration tests driving the full send-text-message and
//! send-binary-message pipelines against an in-memory transport: write
//! (text or the two-phase `SBDWB` binary handshake), wait for signal,
//! initiate session, read and clear the MT buffer, clear the MO buffer.

use std::time::Duration;

use iridium_sbd::driver::IridiumSbd;
use iridium_sbd::session::{self, SessionOptions};
use iridium_sbd::transport::{LineTransport, DEFAULT_MAX_LINE_LENGTH};
use iridium_sbd::{BinaryWriteResult, DriverEvent, IridiumError};
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

async fn expect_command(modem: &mut tokio::io::DuplexStream, expected: &str) {
    let mut buf = vec![0u8; expected.len() + 2];
    modem.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, format!("{expected}\r\n").into_bytes());
}

#[tokio::test]
async fn send_text_message_with_ring_delivery() {
    let (host, mut modem) = duplex(8192);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);
    let mut events = driver.events();

    let options = SessionOptions {
        signal_quality: 2,
        ..SessionOptions::default()
    };

    let send = tokio::spawn(async move { driver.send_text_message("HELLO", &options).await });

    expect_command(&mut modem, "AT+SBDWT=HELLO").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,1,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();
    modem.write_all(b"+CIEV:0,3\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,0,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+SBDIXA").await;
    modem
        .write_all(b"+SBDIX: 1, 42, 1, 7, 11, 0\r\nOK\r\n")
        .await
        .unwrap();

    expect_command(&mut modem, "AT+SBDRT").await;
    modem.write_all(b"SBDRT:WORLD\r\nOK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+SBDD1").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+SBDD0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    let result = timeout(Duration::from_secs(1), send)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(result.mo_status.0, 1);
    assert_eq!(result.mt_status.0, 1);
    assert_eq!(result.mt_length, 11);

    let mut saw_inbound = false;
    while let Ok(event) = events.try_recv() {
        if let DriverEvent::InboundMessage(bytes) = event {
            assert_eq!(bytes, b"WORLD");
            saw_inbound = true;
        }
    }
    assert!(saw_inbound, "expected an inbound-message event with WORLD");
}

#[tokio::test]
async fn mo_failure_still_clears_mo_buffer_and_skips_mt_read() {
    let (host, mut modem) = duplex(8192);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);

    let options = SessionOptions::default();
    let send = tokio::spawn(async move { driver.send_text_message("HI", &options).await });

    expect_command(&mut modem, "AT+SBDWT=HI").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,1,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();
    modem.write_all(b"+CIEV:0,1\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,0,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+SBDIXA").await;
    modem
        .write_all(b"+SBDIX: 32, 0, 0, 0, 0, 0\r\nOK\r\n")
        .await
        .unwrap();

    // mo_status=32 (no network service) is a failure: no SBDRT/SBDD1, just
    // the unconditional SBDD0 clear before the error propagates.
    expect_command(&mut modem, "AT+SBDD0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    let result = timeout(Duration::from_secs(1), send).await.unwrap().unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn write_binary_happy_path_accepts_checksum() {
    // spec.md §8 scenario 3: payload [0x41, 0x42, 0x43] (sum = 0xC6). Host
    // sends `AT+SBDWB=3`, modem replies `READY`; host sends the payload plus
    // its big-endian checksum; modem replies `0` then `OK`.
    let (host, mut modem) = duplex(256);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);

    let write = tokio::spawn(async move { session::write_binary(&driver, b"ABC").await });

    expect_command(&mut modem, "AT+SBDWB=3").await;
    modem.write_all(b"READY\r\n").await.unwrap();

    let mut payload = vec![0u8; 5];
    modem.read_exact(&mut payload).await.unwrap();
    assert_eq!(payload, b"ABC\x00\xC6");

    modem.write_all(b"0\r\nOK\r\n").await.unwrap();

    timeout(Duration::from_secs(1), write)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn write_binary_rejects_checksum_mismatch() {
    // spec.md §8 scenario 4: same payload, but the modem reports a checksum
    // rejection (`2`) instead of success.
    let (host, mut modem) = duplex(256);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);

    let write = tokio::spawn(async move { session::write_binary(&driver, b"ABC").await });

    expect_command(&mut modem, "AT+SBDWB=3").await;
    modem.write_all(b"READY\r\n").await.unwrap();

    let mut payload = vec![0u8; 5];
    modem.read_exact(&mut payload).await.unwrap();
    assert_eq!(payload, b"ABC\x00\xC6");

    modem.write_all(b"2\r\nOK\r\n").await.unwrap();

    let result = timeout(Duration::from_secs(1), write).await.unwrap().unwrap();
    match result {
        Err(IridiumError::BinaryWriteError(BinaryWriteResult::ChecksumMismatch)) => {
            assert!(BinaryWriteResult::ChecksumMismatch.to_string().contains("checksum"));
        }
        other => panic!("expected a checksum BinaryWriteError, got {other:?}"),
    }
}

#[tokio::test]
async fn send_binary_message_runs_full_session_after_binary_write() {
    let (host, mut modem) = duplex(8192);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);

    let options = SessionOptions::default();
    let payload = vec![0x41u8, 0x42, 0x43];
    let send = {
        let payload = payload.clone();
        tokio::spawn(async move { driver.send_binary_message(&payload, &options).await })
    };

    expect_command(&mut modem, "AT+SBDWB=3").await;
    modem.write_all(b"READY\r\n").await.unwrap();
    let mut wire = vec![0u8; 5];
    modem.read_exact(&mut wire).await.unwrap();
    assert_eq!(wire, b"ABC\x00\xC6");
    modem.write_all(b"0\r\nOK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,1,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();
    modem.write_all(b"+CIEV:0,2\r\n").await.unwrap();

    expect_command(&mut modem, "AT+CIER=1,0,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    expect_command(&mut modem, "AT+SBDIXA").await;
    modem
        .write_all(b"+SBDIX: 0, 1, 0, 0, 0, 0\r\nOK\r\n")
        .await
        .unwrap();

    expect_command(&mut modem, "AT+SBDD0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    let result = timeout(Duration::from_secs(1), send)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.mo_status.0, 0);
    assert_eq!(result.mt_status.0, 0);
}

#[tokio::test]
async fn wait_for_network_timeout_leaves_indicator_reporting_enabled() {
    let (host, mut modem) = duplex(8192);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);

    let wait = tokio::spawn(async move {
        driver
            .wait_for_network(1, Some(Duration::from_millis(20)))
            .await
    });

    expect_command(&mut modem, "AT+CIER=1,1,0,0").await;
    modem.write_all(b"OK\r\n").await.unwrap();

    // No +CIEV ever arrives, so the wait times out. The driver must not
    // issue a follow-up AT+CIER=1,0,0,0 on this path — disabling indicator
    // reporting after a timeout is the caller's responsibility.
    let result = timeout(Duration::from_secs(1), wait).await.unwrap().unwrap();
    assert!(matches!(result, Err(iridium_sbd::IridiumError::Timeout)));

    // Confirm no further bytes (a AT+CIER=1,0,0,0 disable) show up on the wire.
    let mut probe = [0u8; 1];
    let saw_more = timeout(Duration::from_millis(50), modem.read(&mut probe))
        .await
        .is_ok();
    assert!(!saw_more, "driver must not auto-disable CIER after a timeout");
}

#[tokio::test]
async fn ring_alert_arrives_independently_of_any_command() {
    let (host, mut modem) = duplex(256);
    let (r, w) = split(host);
    let transport = LineTransport::new(r, w, DEFAULT_MAX_LINE_LENGTH);
    let driver = IridiumSbd::new(transport);
    let mut events = driver.events();

    modem.write_all(b"SBDRING\r\n").await.unwrap();

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, DriverEvent::RingAlert));
}
