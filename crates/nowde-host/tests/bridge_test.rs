//! Integration tests for the bridge: handshake, receiver table, media sync,
//! simulation and connection loss, driven through an in-memory transport.

use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use nowde_host::{
    Bridge, BridgeCommand, BridgeConfig, BridgeError, BridgeEvent, HandshakeState, LayerArg, MediaRef,
    MemoryTransport, PresenceStatus, SimulationMode,
};
use nowde_protocol::{
    BootReason, Command, DeviceConfig, DeviceErrorCode, ErrorReport, HelloInfo, MacAddress, PlaybackState,
    ReceiverRecord, Response, RunningStateChunk,
};

const PORT: &str = "Nowde Sender";

// ============================================================================
// Helpers
// ============================================================================

fn setup() -> (Bridge, MemoryTransport, Receiver<BridgeEvent>) {
    setup_with(BridgeConfig::default())
}

fn setup_with(config: BridgeConfig) -> (Bridge, MemoryTransport, Receiver<BridgeEvent>) {
    let transport = MemoryTransport::new([PORT, "Other Port"]);
    let bridge = Bridge::new(transport.clone(), config);
    let events = bridge.events();
    (bridge, transport, events)
}

fn hello(boot_reason: BootReason) -> Vec<u8> {
    Response::Hello(HelloInfo {
        version: "1.4.2".to_string(),
        uptime_ms: 1234,
        boot_reason,
    })
    .encode()
}

fn receiver(id: u8, layer: &str, last_seen_ms: u32) -> ReceiverRecord {
    ReceiverRecord {
        mac: MacAddress::new([0x24, 0x6F, 0x28, 0xAB, 0xCD, id]),
        layer: layer.to_string(),
        version: "1.4.2".to_string(),
        last_seen_ms,
        active: true,
        media_index: 0,
    }
}

fn running_state(index: u8, count: u8, total: u8, receivers: Vec<ReceiverRecord>) -> Vec<u8> {
    Response::RunningState(RunningStateChunk {
        uptime_ms: 60_000,
        mesh_synced: true,
        chunk_index: index,
        chunk_count: count,
        total_receivers: total,
        declared_receivers: receivers.len() as u8,
        receivers,
    })
    .encode()
}

/// Connect, answer the handshake and discard everything recorded so far.
fn initialized() -> (Bridge, MemoryTransport, Receiver<BridgeEvent>) {
    let (bridge, transport, events) = setup();
    bridge.connect(PORT).unwrap();
    bridge.receive(&hello(BootReason::PowerOn));
    transport.take_sent();
    drain(&events);
    (bridge, transport, events)
}

fn drain(events: &Receiver<BridgeEvent>) -> Vec<BridgeEvent> {
    events.try_iter().collect()
}

fn sync_commands(commands: &[Command]) -> Vec<&Command> {
    commands
        .iter()
        .filter(|c| matches!(c, Command::MediaSync { .. }))
        .collect()
}

// ============================================================================
// Handshake
// ============================================================================

#[test]
fn test_connect_sends_query_config() {
    let (bridge, transport, events) = setup();
    bridge.connect(PORT).unwrap();

    assert_eq!(transport.sent_commands(), vec![Command::QueryConfig]);
    assert_eq!(bridge.handshake_state(), HandshakeState::AwaitingHello);
    assert_eq!(bridge.port().as_deref(), Some(PORT));
    assert_eq!(
        drain(&events),
        vec![BridgeEvent::Connected {
            port: PORT.to_string()
        }]
    );
}

#[test]
fn test_connect_unknown_port() {
    let (bridge, transport, _events) = setup();
    let err = bridge.connect("Missing").unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));
    assert!(!bridge.is_connected());
    assert!(transport.sent_frames().is_empty());
}

#[test]
fn test_hello_pushes_config_and_queries_state() {
    let (bridge, transport, events) = setup();
    bridge.connect(PORT).unwrap();
    transport.take_sent();
    drain(&events);

    bridge.receive(&hello(BootReason::PowerOn));

    assert_eq!(
        transport.sent_commands(),
        vec![
            Command::PushFullConfig(DeviceConfig {
                rf_simulation_enabled: false,
                max_delay_ms: 400,
            }),
            Command::QueryRunningState,
        ]
    );
    assert_eq!(bridge.handshake_state(), HandshakeState::Initialized);

    let events = drain(&events);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        BridgeEvent::Hello { info, reboot: false } if info.version == "1.4.2"
    ));
}

#[test]
fn test_reboot_detected_and_receivers_cleared() {
    let (bridge, transport, events) = initialized();
    bridge.receive(&running_state(0, 1, 1, vec![receiver(1, "Main", 200)]));
    assert_eq!(bridge.receivers().len(), 1);
    drain(&events);
    transport.take_sent();

    bridge.receive(&hello(BootReason::Watchdog));

    let events = drain(&events);
    assert!(matches!(
        &events[0],
        BridgeEvent::Hello { info, reboot: true } if info.boot_reason == BootReason::Watchdog
    ));
    assert!(bridge.receivers().is_empty());
    assert_eq!(transport.sent_commands().len(), 2);
}

#[test]
fn test_config_state_updates_mirror() {
    let (bridge, _transport, events) = initialized();
    let reported = DeviceConfig {
        rf_simulation_enabled: true,
        max_delay_ms: 1000,
    };
    bridge.receive(&Response::ConfigState(reported).encode());

    assert_eq!(drain(&events), vec![BridgeEvent::ConfigState(reported)]);
    assert_eq!(bridge.config().device_config(), reported);
}

#[test]
fn test_push_config_while_disconnected_only_updates_mirror() {
    let (bridge, transport, _events) = setup();
    bridge
        .execute(BridgeCommand::PushConfig {
            enabled: true,
            max_delay_ms: 20_000,
        })
        .unwrap();

    assert!(transport.sent_frames().is_empty());
    let config = bridge.config().device_config();
    assert!(config.rf_simulation_enabled);
    assert_eq!(config.max_delay_ms, 16383);

    bridge.connect(PORT).unwrap();
    bridge.receive(&hello(BootReason::PowerOn));
    assert!(transport.sent_commands().contains(&Command::PushFullConfig(config)));
}

#[test]
fn test_commands_require_connection() {
    let (bridge, _transport, _events) = setup();
    let mac = MacAddress::new([1, 2, 3, 4, 5, 6]);
    assert!(matches!(
        bridge.execute(BridgeCommand::ChangeReceiverLayer {
            mac,
            layer: "Side".to_string()
        }),
        Err(BridgeError::NotConnected)
    ));
    assert!(matches!(
        bridge.execute(BridgeCommand::QueryRunningState),
        Err(BridgeError::NotConnected)
    ));
}

#[test]
fn test_change_receiver_layer() {
    let (bridge, transport, _events) = initialized();
    let mac = MacAddress::new([0x24, 0x6F, 0x28, 0xAB, 0xCD, 0x01]);
    bridge
        .execute(BridgeCommand::ChangeReceiverLayer {
            mac,
            layer: "Side".to_string(),
        })
        .unwrap();
    assert_eq!(
        transport.sent_commands(),
        vec![Command::ChangeReceiverLayer {
            mac,
            layer: "Side".to_string()
        }]
    );
}

#[test]
fn test_bytes_ignored_while_disconnected() {
    let (bridge, transport, events) = setup();
    bridge.receive(&hello(BootReason::PowerOn));
    assert!(drain(&events).is_empty());
    assert!(transport.sent_frames().is_empty());
}

// ============================================================================
// Inbound Frames
// ============================================================================

#[test]
fn test_running_state_across_split_reads() {
    let (bridge, _transport, events) = initialized();
    let mut stream = running_state(0, 2, 3, vec![receiver(1, "Main", 100), receiver(2, "Main", 4000)]);
    stream.extend(running_state(1, 2, 3, vec![receiver(3, "Side", 60_000)]));

    // USB-MIDI delivers arbitrary slices of the stream.
    for piece in stream.chunks(7) {
        bridge.receive(piece);
    }

    let snapshots: Vec<_> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            BridgeEvent::RunningStateSnapshot(snapshot) => Some(snapshot),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].total_receivers, 3);
    assert_eq!(snapshots[0].receivers.len(), 3);
    assert!(snapshots[0].mesh_synced);

    let receivers = bridge.receivers();
    let statuses: Vec<_> = receivers.iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![PresenceStatus::Active, PresenceStatus::Missing, PresenceStatus::Gone]
    );
}

#[test]
fn test_error_report_event() {
    let (bridge, _transport, events) = initialized();
    bridge.receive(
        &Response::ErrorReport(ErrorReport {
            code: DeviceErrorCode::ReceiverTimeout,
            context: vec![0x24, 0x6F, 0x28, 0x0B, 0x4D, 0x01],
        })
        .encode(),
    );

    assert_eq!(
        drain(&events),
        vec![BridgeEvent::ErrorReport {
            code: DeviceErrorCode::ReceiverTimeout,
            name: "RECEIVER_TIMEOUT".to_string(),
            context: vec![0x24, 0x6F, 0x28, 0x0B, 0x4D, 0x01],
        }]
    );
}

#[test]
fn test_unknown_command_logged_raw() {
    let (bridge, _transport, events) = initialized();
    bridge.receive(&[0xF0, 0x7D, 0x7F, 0x01, 0xF7]);

    let events = drain(&events);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], BridgeEvent::RawSysexLogLine(line) if line.contains("0x7F")));
}

#[test]
fn test_echoed_command_logged_raw() {
    let (bridge, transport, events) = initialized();
    bridge.receive(&Command::QueryConfig.encode());

    let events = drain(&events);
    assert!(matches!(&events[..], [BridgeEvent::RawSysexLogLine(line)] if line.contains("QUERY_CONFIG")));
    assert!(transport.sent_frames().is_empty());
}

#[test]
fn test_foreign_manufacturer_dropped_silently() {
    let (bridge, _transport, events) = initialized();
    bridge.receive(&[0xF0, 0x41, 0x10, 0x42, 0xF7]);
    assert!(drain(&events).is_empty());
}

// ============================================================================
// Running-State Poll
// ============================================================================

#[test]
fn test_poll_waits_for_hello() {
    let (bridge, transport, _events) = setup();
    bridge.connect(PORT).unwrap();
    transport.take_sent();

    bridge.poll_running_state();
    assert!(transport.sent_frames().is_empty());

    bridge.receive(&hello(BootReason::PowerOn));
    transport.take_sent();
    bridge.poll_running_state();
    assert_eq!(transport.sent_commands(), vec![Command::QueryRunningState]);
}

#[test]
fn test_started_workers_poll() {
    let config = BridgeConfig::default().with_running_state_poll_ms(10);
    let (bridge, transport, _events) = setup_with(config);
    bridge.connect(PORT).unwrap();
    bridge.receive(&hello(BootReason::PowerOn));
    transport.take_sent();
    bridge.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while transport.sent_commands().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    bridge.shutdown();

    assert!(transport.sent_commands().contains(&Command::QueryRunningState));
    assert!(!bridge.is_connected());
}

// ============================================================================
// Connection Loss
// ============================================================================

#[test]
fn test_send_failure_tears_down_connection() {
    let (bridge, transport, events) = initialized();
    bridge.receive(&running_state(0, 1, 1, vec![receiver(1, "Main", 200)]));
    drain(&events);

    transport.set_fail_sends(true);
    let err = bridge.execute(BridgeCommand::QueryRunningState).unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));

    let events = drain(&events);
    assert!(matches!(&events[..], [BridgeEvent::ConnectionLost { .. }]));
    assert!(!bridge.is_connected());
    assert!(!transport.is_open());
    assert_eq!(bridge.handshake_state(), HandshakeState::Disconnected);
    assert!(bridge.receivers().is_empty());
}

#[test]
fn test_disconnect_event() {
    let (bridge, _transport, events) = initialized();
    bridge.disconnect();
    assert_eq!(drain(&events), vec![BridgeEvent::Disconnected]);
    assert_eq!(bridge.handshake_state(), HandshakeState::Disconnected);

    // A second disconnect has nothing to report.
    bridge.disconnect();
    assert!(drain(&events).is_empty());
}

#[test]
fn test_switching_ports_clears_receivers() {
    let (bridge, transport, _events) = initialized();
    bridge.receive(&running_state(0, 1, 1, vec![receiver(1, "Main", 200)]));
    assert_eq!(bridge.receivers().len(), 1);

    bridge.connect("Other Port").unwrap();
    assert!(bridge.receivers().is_empty());
    assert_eq!(bridge.port().as_deref(), Some("Other Port"));
    assert_eq!(transport.open_count(), 2);
}

// ============================================================================
// Media Sync
// ============================================================================

#[test]
fn test_media_sync_edge_and_heartbeat() {
    let (bridge, transport, _events) = initialized();
    let update = |position_s: f64| BridgeCommand::MediaSync {
        layer: "Main".to_string(),
        media: MediaRef::Filename("003_clip.mp4".to_string()),
        position_s,
        duration_s: 10.0,
        state: PlaybackState::Playing,
    };

    bridge.execute(update(1.5)).unwrap();
    bridge.execute(update(1.75)).unwrap();
    assert_eq!(
        transport.sent_commands(),
        vec![Command::MediaSync {
            layer: "Main".to_string(),
            media_index: 3,
            position_ms: 1500,
            state: PlaybackState::Playing,
        }]
    );

    transport.take_sent();
    bridge.tick_media_sync(Instant::now() + Duration::from_millis(150));
    assert_eq!(
        transport.sent_commands(),
        vec![Command::MediaSync {
            layer: "Main".to_string(),
            media_index: 3,
            position_ms: 1750,
            state: PlaybackState::Playing,
        }]
    );
}

#[test]
fn test_media_sync_index_change_bypasses_throttle() {
    let (bridge, transport, _events) = initialized();
    for index in [2, 5] {
        bridge
            .execute(BridgeCommand::MediaSync {
                layer: "Main".to_string(),
                media: MediaRef::Index(index),
                position_s: 0.0,
                duration_s: 10.0,
                state: PlaybackState::Playing,
            })
            .unwrap();
    }
    let sent = transport.sent_commands();
    let indices: Vec<u8> = sync_commands(&sent)
        .into_iter()
        .filter_map(|c| match c {
            Command::MediaSync { media_index, .. } => Some(*media_index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![2, 5]);
}

#[test]
fn test_media_sync_dropped_while_disconnected() {
    let (bridge, transport, _events) = setup();
    bridge
        .execute(BridgeCommand::MediaSync {
            layer: "Main".to_string(),
            media: MediaRef::Index(1),
            position_s: 0.0,
            duration_s: 10.0,
            state: PlaybackState::Playing,
        })
        .unwrap();
    bridge.tick_media_sync(Instant::now());
    assert!(transport.sent_frames().is_empty());
}

#[test]
fn test_layer_events_drive_media_sync() {
    let (bridge, transport, _events) = initialized();
    bridge
        .execute(BridgeCommand::LayerEvent {
            layer: "Main".to_string(),
            route: "/mediaStarted".to_string(),
            args: vec![
                LayerArg::Int(2),
                LayerArg::Str("002_intro.mov".to_string()),
                LayerArg::Float(42.0),
            ],
        })
        .unwrap();
    assert_eq!(
        transport.sent_commands(),
        vec![Command::MediaSync {
            layer: "Main".to_string(),
            media_index: 2,
            position_ms: 0,
            state: PlaybackState::Playing,
        }]
    );

    transport.take_sent();
    bridge
        .execute(BridgeCommand::LayerEvent {
            layer: "Main".to_string(),
            route: "/mediaStopped".to_string(),
            args: vec![LayerArg::Int(2), LayerArg::Str("002_intro.mov".to_string())],
        })
        .unwrap();
    assert_eq!(
        transport.sent_commands(),
        vec![Command::MediaSync {
            layer: "Main".to_string(),
            media_index: 0,
            position_ms: 0,
            state: PlaybackState::Stopped,
        }]
    );
    assert_eq!(bridge.layer("Main").map(|l| l.state), Some(PlaybackState::Stopped));
}

#[test]
fn test_frame_correction_applied() {
    let (bridge, transport, _events) = initialized();
    bridge
        .execute(BridgeCommand::SetFrameCorrection { frames: 3, fps: 30.0 })
        .unwrap();
    bridge
        .execute(BridgeCommand::MediaSync {
            layer: "Main".to_string(),
            media: MediaRef::Index(1),
            position_s: 1.0,
            duration_s: 10.0,
            state: PlaybackState::Playing,
        })
        .unwrap();
    assert!(matches!(
        transport.sent_commands().as_slice(),
        [Command::MediaSync { position_ms: 1100, .. }]
    ));
    assert_eq!(bridge.config().media_sync.frame_correction_frames, 3);
}

#[test]
fn test_throttle_interval_floor() {
    let (bridge, _transport, _events) = setup();
    bridge
        .execute(BridgeCommand::SetThrottleInterval(Duration::from_millis(1)))
        .unwrap();
    assert_eq!(bridge.config().media_sync.throttle_interval_ms, 10);
}

// ============================================================================
// Simulation
// ============================================================================

#[test]
fn test_simulated_layer_suppresses_real_updates() {
    let (bridge, transport, _events) = initialized();
    let simulated = receiver(1, "Main", 500);
    bridge.receive(&running_state(0, 1, 1, vec![simulated.clone()]));
    transport.take_sent();

    bridge
        .execute(BridgeCommand::SetSimulationMode {
            mac: simulated.mac,
            mode: SimulationMode::Media(4),
        })
        .unwrap();
    bridge
        .execute(BridgeCommand::MediaSync {
            layer: "Main".to_string(),
            media: MediaRef::Index(1),
            position_s: 3.0,
            duration_s: 10.0,
            state: PlaybackState::Playing,
        })
        .unwrap();
    assert!(transport.sent_frames().is_empty());

    bridge.tick_media_sync(Instant::now());
    let sent = transport.sent_commands();
    assert!(matches!(
        sync_commands(&sent).as_slice(),
        [Command::MediaSync { layer, media_index: 4, state: PlaybackState::Playing, .. }] if layer == "Main"
    ));

    // Other layers are unaffected.
    transport.take_sent();
    bridge
        .execute(BridgeCommand::MediaSync {
            layer: "Side".to_string(),
            media: MediaRef::Index(1),
            position_s: 3.0,
            duration_s: 10.0,
            state: PlaybackState::Playing,
        })
        .unwrap();
    assert_eq!(transport.sent_commands().len(), 1);
}

#[test]
fn test_simulation_stop_mode() {
    let (bridge, transport, _events) = initialized();
    let simulated = receiver(7, "Main", 500);
    bridge.receive(&running_state(0, 1, 1, vec![simulated.clone()]));
    transport.take_sent();

    bridge
        .execute(BridgeCommand::SetSimulationMode {
            mac: simulated.mac,
            mode: SimulationMode::Stop,
        })
        .unwrap();
    bridge.tick_media_sync(Instant::now());
    assert!(matches!(
        transport.sent_commands().as_slice(),
        [Command::MediaSync { media_index: 0, state: PlaybackState::Stopped, .. }]
    ));

    transport.take_sent();
    bridge
        .execute(BridgeCommand::SetSimulationMode {
            mac: simulated.mac,
            mode: SimulationMode::Disabled,
        })
        .unwrap();
    bridge.tick_media_sync(Instant::now());
    assert!(transport.sent_frames().is_empty());
}

// ============================================================================
// Event Queue
// ============================================================================

#[test]
fn test_event_queue_is_bounded() {
    let (bridge, _transport, events) = setup_with(BridgeConfig::default().with_event_queue_capacity(4));
    bridge.connect(PORT).unwrap();

    // Unknown commands become log lines, which are dropped once the queue is full.
    for _ in 0..10 {
        bridge.receive(&[0xF0, 0x7D, 0x2F, 0xF7]);
    }
    assert_eq!(events.len(), 4);

    // Anything else makes room by evicting the oldest event.
    let reported = DeviceConfig {
        rf_simulation_enabled: true,
        max_delay_ms: 250,
    };
    bridge.receive(&Response::ConfigState(reported).encode());

    let queued = drain(&events);
    assert_eq!(queued.len(), 4);
    assert!(queued[..3]
        .iter()
        .all(|e| matches!(e, BridgeEvent::RawSysexLogLine(_))));
    assert_eq!(queued[3], BridgeEvent::ConfigState(reported));
}
