//! Integration tests for firmware transfers through the bridge.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use nowde_host::{
    Bridge, BridgeCommand, BridgeConfig, BridgeError, BridgeEvent, HandshakeState, MediaRef, MemoryTransport,
    OtaConfig, OtaError, OtaStep,
};
use nowde_protocol::{BootReason, Command, HelloInfo, PlaybackState, Response};

const PORT: &str = "Nowde Sender";

fn firmware(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 7 % 256) as u8).collect()
}

fn connected(ota: OtaConfig) -> (Bridge, MemoryTransport, Receiver<BridgeEvent>) {
    let transport = MemoryTransport::new([PORT]);
    let bridge = Bridge::new(transport.clone(), BridgeConfig::default().with_ota(ota));
    let events = bridge.events();
    bridge.connect(PORT).unwrap();
    bridge.receive(
        &Response::Hello(HelloInfo {
            version: "1.4.2".to_string(),
            uptime_ms: 5000,
            boot_reason: BootReason::PowerOn,
        })
        .encode(),
    );
    transport.take_sent();
    events.try_iter().for_each(drop);
    (bridge, transport, events)
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_full_transfer_and_reconnect() {
    let (bridge, transport, events) = connected(OtaConfig::unpaced());

    bridge
        .execute(BridgeCommand::BeginOta {
            firmware: firmware(256_000),
        })
        .unwrap();
    bridge.wait_for_ota();
    assert!(!bridge.is_ota_active());

    let sent = transport.sent_commands();
    let data_frames = sent
        .iter()
        .filter(|c| matches!(c, Command::OtaData { chunk } if chunk.len() == 100))
        .count();
    assert_eq!(data_frames, 2560);
    assert_eq!(sent[0], Command::OtaBegin { total_size: 256_000 });
    assert_eq!(sent[2561], Command::OtaEnd);

    // The port is reopened by name and the handshake starts over.
    assert_eq!(sent.last(), Some(&Command::QueryConfig));
    assert_eq!(transport.open_count(), 2);
    assert_eq!(bridge.handshake_state(), HandshakeState::AwaitingHello);

    let events: Vec<_> = events.try_iter().collect();
    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::OtaProgress(progress) => Some(*progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 2560);
    assert_eq!(progress.last().map(|p| (p.bytes_sent, p.total_size)), Some((256_000, 256_000)));
    assert!(events
        .iter()
        .any(|e| matches!(e, BridgeEvent::OtaFinished(report) if report.bytes_sent == 256_000)));
    assert!(matches!(events.last(), Some(BridgeEvent::Connected { port }) if port == PORT));
}

#[test]
fn test_reboot_wait_survives_failed_writes() {
    let ota = OtaConfig {
        reboot_delay_ms: 500,
        ..OtaConfig::unpaced()
    };
    let (bridge, transport, events) = connected(ota);
    bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(1000) })
        .unwrap();

    let mut seen = Vec::new();
    wait_until("OTA_END", || {
        seen.extend(events.try_iter());
        seen.iter().any(|e| matches!(e, BridgeEvent::OtaFinished(_)))
    });

    // The port is closed for the reboot; the transfer is still in progress.
    assert!(!transport.is_open());
    assert!(!bridge.is_connected());
    assert!(bridge.is_ota_active());

    // A rebooting sender rejects every write.
    transport.set_fail_sends(true);
    bridge
        .execute(BridgeCommand::MediaSync {
            layer: "Main".to_string(),
            media: MediaRef::Index(3),
            position_s: 1.0,
            duration_s: 10.0,
            state: PlaybackState::Playing,
        })
        .unwrap();
    bridge.tick_media_sync(Instant::now());
    assert!(matches!(
        bridge.execute(BridgeCommand::QueryRunningState),
        Err(BridgeError::NotConnected)
    ));
    transport.set_fail_sends(false);

    bridge.wait_for_ota();
    assert_eq!(transport.open_count(), 2);
    assert!(bridge.is_connected());
    assert_eq!(bridge.handshake_state(), HandshakeState::AwaitingHello);
    assert_eq!(transport.sent_commands().last(), Some(&Command::QueryConfig));

    seen.extend(events.try_iter());
    assert!(!seen.iter().any(|e| matches!(e, BridgeEvent::ConnectionLost { .. })));
    assert!(matches!(seen.last(), Some(BridgeEvent::Connected { port }) if port == PORT));
}

#[test]
fn test_disconnect_during_reboot_wait_skips_reopen() {
    let ota = OtaConfig {
        reboot_delay_ms: 10_000,
        ..OtaConfig::unpaced()
    };
    let (bridge, transport, events) = connected(ota);
    bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(300) })
        .unwrap();
    wait_until("OTA_END", || {
        events
            .try_iter()
            .any(|e| matches!(e, BridgeEvent::OtaFinished(_)))
    });

    let start = Instant::now();
    bridge.disconnect();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!bridge.is_ota_active());
    assert_eq!(transport.open_count(), 1);
    assert!(!bridge.is_connected());
}

#[test]
fn test_partial_last_chunk() {
    let (bridge, transport, _events) = connected(OtaConfig::unpaced());
    bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(250) })
        .unwrap();
    bridge.wait_for_ota();

    let sizes: Vec<usize> = transport
        .sent_commands()
        .iter()
        .filter_map(|c| match c {
            Command::OtaData { chunk } => Some(chunk.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[test]
fn test_second_transfer_rejected_and_poll_paused() {
    let (bridge, transport, events) = connected(OtaConfig::default());

    bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(1000) })
        .unwrap();
    assert!(bridge.is_ota_active());

    let err = bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(10) })
        .unwrap_err();
    assert!(matches!(err, BridgeError::OtaInProgress));
    assert!(matches!(
        bridge.execute(BridgeCommand::EnterBootloader),
        Err(BridgeError::OtaInProgress)
    ));

    bridge.poll_running_state();
    wait_until("OTA_BEGIN", || !transport.sent_frames().is_empty());
    assert!(!transport.sent_commands().contains(&Command::QueryRunningState));

    // Disconnecting cancels the transfer without a reconnect.
    bridge.disconnect();
    assert!(!bridge.is_ota_active());
    assert_eq!(transport.open_count(), 1);
    assert!(events.try_iter().any(|e| matches!(e, BridgeEvent::OtaFailed { .. })));
}

#[test]
fn test_begin_requires_connection() {
    let transport = MemoryTransport::new([PORT]);
    let bridge = Bridge::new(transport, BridgeConfig::default());
    assert!(matches!(
        bridge.execute(BridgeCommand::BeginOta { firmware: firmware(10) }),
        Err(BridgeError::NotConnected)
    ));
}

#[test]
fn test_empty_image_rejected() {
    let (bridge, transport, _events) = connected(OtaConfig::unpaced());
    assert!(matches!(
        bridge.execute(BridgeCommand::BeginOta { firmware: Vec::new() }),
        Err(BridgeError::Ota(OtaError::EmptyImage))
    ));
    assert!(!bridge.is_ota_active());
    assert!(transport.sent_frames().is_empty());
}

#[test]
fn test_failed_write_reports_step() {
    let (bridge, transport, events) = connected(OtaConfig::unpaced());
    transport.set_fail_sends(true);

    bridge
        .execute(BridgeCommand::BeginOta { firmware: firmware(500) })
        .unwrap();
    wait_until("transfer to stop", || !bridge.is_ota_active());

    let events: Vec<_> = events.try_iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        BridgeEvent::OtaFailed {
            step: Some(OtaStep::Begin),
            ..
        }
    )));
    // The reopen succeeds but QUERY_CONFIG cannot be written.
    assert!(events
        .iter()
        .any(|e| matches!(e, BridgeEvent::ConnectionLost { .. })));
    assert!(!bridge.is_connected());
}

#[test]
fn test_enter_bootloader() {
    let (bridge, transport, _events) = connected(OtaConfig::unpaced());
    bridge.execute(BridgeCommand::EnterBootloader).unwrap();
    assert_eq!(transport.sent_commands(), vec![Command::EnterBootloader]);
}
