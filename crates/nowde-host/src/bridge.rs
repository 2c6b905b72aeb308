//! The bridge between an application and a Nowde sender.
//!
//! [`Bridge`] owns the transport and every piece of protocol state. Incoming
//! bytes are handed to [`Bridge::receive`] from the transport's input
//! callback; the results come out as [`BridgeEvent`]s on a channel. The
//! application drives the sender with [`BridgeCommand`]s.
//!
//! Three background activities run on their own workers: the media-sync
//! ticker, the running-state poll, and a firmware transfer when one is
//! requested. The only lock they contend on for I/O is the transport lock.
//!
//! Lock order: the state lock is never held while the transport lock is taken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use nowde_metrics::metric_defs;
use nowde_protocol::{
    describe_frame, Command, DeviceConfig, DeviceErrorCode, HelloInfo, MacAddress, Message,
    PlaybackState, ProtocolError, Response, SysExFramer, MAX_DELAY_MS,
};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::BridgeConfig;
use crate::handshake::{HandshakeSession, HandshakeState, HelloOutcome};
use crate::layers::{LayerArg, LayerPlayback, LayerTracker};
use crate::media_sync::MediaSyncEngine;
use crate::ota::{OtaProgress, OtaReport, OtaTransfer};
use crate::receivers::{ReceiverTable, TrackedReceiver};
use crate::running_state::{RunningStateAggregator, RunningStateSnapshot};
use crate::simulation::{Simulation, SimulationMode};
use crate::transport::Transport;
use crate::workers::Worker;
use crate::{BridgeError, OtaError, OtaStep, TransportError};

// ============================================================================
// Application Boundary
// ============================================================================

/// Events reported to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// A port was opened and QUERY_CONFIG sent.
    Connected {
        /// Port name.
        port: String,
    },
    /// The port was closed on request.
    Disconnected,
    /// The sender announced itself.
    Hello {
        /// HELLO contents.
        info: HelloInfo,
        /// Whether the sender rebooted while already initialized.
        reboot: bool,
    },
    /// The sender reported its configuration.
    ConfigState(DeviceConfig),
    /// A complete receiver table was reassembled.
    RunningStateSnapshot(RunningStateSnapshot),
    /// The sender reported an error.
    ErrorReport {
        /// Error code.
        code: DeviceErrorCode,
        /// Error name.
        name: String,
        /// Raw context bytes.
        context: Vec<u8>,
    },
    /// A frame that was received but not interpreted.
    RawSysexLogLine(String),
    /// A transport write failed; the connection has been torn down.
    ConnectionLost {
        /// Transport error text.
        reason: String,
    },
    /// Firmware transfer progress.
    OtaProgress(OtaProgress),
    /// Firmware transfer finished; the sender is rebooting.
    OtaFinished(OtaReport),
    /// Firmware transfer aborted.
    OtaFailed {
        /// Step that failed, if the transfer started.
        step: Option<OtaStep>,
        /// Error text.
        error: String,
    },
}

impl BridgeEvent {
    /// Events that may be dropped when the application falls behind.
    pub fn is_lossy(&self) -> bool {
        matches!(self, BridgeEvent::OtaProgress(_) | BridgeEvent::RawSysexLogLine(_))
    }
}

/// Media reference for a MEDIA_SYNC request.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaRef {
    /// Media index parsed from a filename.
    Filename(String),
    /// Explicit media index.
    Index(u8),
}

/// Requests accepted from the application.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCommand {
    /// Ask the sender for HELLO and CONFIG_STATE.
    QueryConfig,
    /// Update the configuration mirror and push it to the sender.
    PushConfig {
        /// RF delay simulation switch.
        enabled: bool,
        /// Maximum simulated delay in milliseconds.
        max_delay_ms: u16,
    },
    /// Ask the sender for its receiver table.
    QueryRunningState,
    /// Move a receiver to another layer.
    ChangeReceiverLayer {
        /// Receiver MAC address.
        mac: MacAddress,
        /// New layer name.
        layer: String,
    },
    /// Report a layer's playback state.
    MediaSync {
        /// Layer name.
        layer: String,
        /// Media being played.
        media: MediaRef,
        /// Position in seconds.
        position_s: f64,
        /// Duration in seconds.
        duration_s: f64,
        /// Playback state.
        state: PlaybackState,
    },
    /// Push a firmware image.
    BeginOta {
        /// Complete image.
        firmware: Vec<u8>,
    },
    /// Reboot the sender into its bootloader.
    EnterBootloader,
    /// Raw show-control layer event.
    LayerEvent {
        /// Layer name.
        layer: String,
        /// Event route, e.g. `/media/time`.
        route: String,
        /// Event arguments.
        args: Vec<LayerArg>,
    },
    /// Drive a receiver from the simulation clock.
    SetSimulationMode {
        /// Receiver MAC address.
        mac: MacAddress,
        /// New mode.
        mode: SimulationMode,
    },
    /// Change the media-sync heartbeat interval.
    SetThrottleInterval(Duration),
    /// Change the media-sync frame correction.
    SetFrameCorrection {
        /// Frames added to every position (may be negative).
        frames: i32,
        /// Frame rate used to convert frames to milliseconds.
        fps: f64,
    },
}

// ============================================================================
// Shared State
// ============================================================================

/// Events and commands produced while the state lock is held.
#[derive(Default)]
struct Outbox {
    events: Vec<BridgeEvent>,
    commands: Vec<Command>,
}

struct BridgeState {
    config: BridgeConfig,
    port: Option<String>,
    framer: SysExFramer,
    handshake: HandshakeSession,
    aggregator: RunningStateAggregator,
    receivers: ReceiverTable,
    media_sync: MediaSyncEngine,
    layers: LayerTracker,
    simulation: Simulation,
}

impl BridgeState {
    fn new(config: BridgeConfig) -> Self {
        BridgeState {
            port: None,
            framer: SysExFramer::new(),
            handshake: HandshakeSession::new(),
            aggregator: RunningStateAggregator::new(),
            receivers: ReceiverTable::new(config.receiver_retention()),
            media_sync: MediaSyncEngine::new(&config.media_sync),
            layers: LayerTracker::new(),
            simulation: Simulation::new(config.simulation_duration()),
            config,
        }
    }

    /// Forget everything learned from the current connection.
    fn clear_connection(&mut self) -> Option<String> {
        self.handshake.on_disconnect();
        self.framer.clear();
        self.aggregator.clear();
        self.receivers.clear();
        self.port.take()
    }

    fn is_layer_simulated(&self, layer: &str) -> bool {
        self.simulation.is_layer_simulated(layer, &self.receivers)
    }

    fn handle_frame(&mut self, frame: &[u8], now: Instant, out: &mut Outbox) {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(ProtocolError::ForeignManufacturer(id)) => {
                metrics::counter!(metric_defs::SYSEX_DROPPED_FRAMES.name).increment(1);
                trace!("Ignoring SysEx for manufacturer 0x{:02X}", id);
                return;
            }
            Err(e) => {
                metrics::counter!(metric_defs::SYSEX_DROPPED_FRAMES.name).increment(1);
                debug!("Dropping SysEx frame: {}", e);
                out.events
                    .push(BridgeEvent::RawSysexLogLine(format!("RX: {}", describe_frame(frame))));
                return;
            }
        };

        match message {
            Message::Command(command) => {
                metrics::counter!(metric_defs::SYSEX_RX_FRAMES.name, "command" => command.name())
                    .increment(1);
                out.events.push(BridgeEvent::RawSysexLogLine(format!("RX: {}", command)));
            }
            Message::Response(response) => {
                metrics::counter!(metric_defs::SYSEX_RX_FRAMES.name, "command" => response.name())
                    .increment(1);
                debug!("RX: {}", response);
                self.handle_response(response, now, out);
            }
        }
    }

    fn handle_response(&mut self, response: Response, now: Instant, out: &mut Outbox) {
        match response {
            Response::Hello(hello) => {
                let (outcome, commands) = self.handshake.on_hello(hello.clone(), self.config.device_config());
                self.receivers.clear();
                self.aggregator.clear();
                out.commands.extend(commands);
                out.events.push(BridgeEvent::Hello {
                    info: hello,
                    reboot: outcome == HelloOutcome::Reboot,
                });
            }

            Response::ConfigState(config) => {
                info!(
                    "Config received from sender: RF Sim={}, max delay {}ms",
                    if config.rf_simulation_enabled { "ON" } else { "OFF" },
                    config.max_delay_ms
                );
                self.config.set_device_config(config);
                out.events.push(BridgeEvent::ConfigState(config));
            }

            Response::RunningState(chunk) => {
                if let Some(snapshot) = self.aggregator.ingest(chunk, now) {
                    self.receivers.apply_snapshot(&snapshot.receivers, now);
                    debug!(
                        "Running state: uptime {:.1}s, mesh {}, {} receiver(s)",
                        snapshot.uptime_s(),
                        if snapshot.mesh_synced { "SYNCED" } else { "NOT SYNCED" },
                        snapshot.total_receivers
                    );
                    out.events.push(BridgeEvent::RunningStateSnapshot(snapshot));
                }
            }

            Response::ErrorReport(report) => {
                warn!("Sender error: {}", report.code);
                out.events.push(BridgeEvent::ErrorReport {
                    code: report.code,
                    name: report.code.name(),
                    context: report.context,
                });
            }
        }
    }
}

struct Shared {
    state: Mutex<BridgeState>,
    transport: Mutex<Box<dyn Transport>>,
    events_tx: Sender<BridgeEvent>,
    events_rx: Receiver<BridgeEvent>,
    ota_active: AtomicBool,
    ota: Mutex<Option<Worker>>,
    workers: Mutex<Vec<Worker>>,
}

// ============================================================================
// Bridge
// ============================================================================

/// Host-side connection to one Nowde sender.
///
/// Clones share the same connection. Events are buffered until read from
/// [`events`](Bridge::events), up to `event_queue_capacity`.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Create a bridge over `transport`. No port is opened and no worker started.
    pub fn new<T: Transport + 'static>(transport: T, config: BridgeConfig) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(config.event_queue_capacity());
        Bridge {
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::new(config)),
                transport: Mutex::new(Box::new(transport)),
                events_tx,
                events_rx,
                ota_active: AtomicBool::new(false),
                ota: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Event stream.
    pub fn events(&self) -> Receiver<BridgeEvent> {
        self.shared.events_rx.clone()
    }

    /// Start the media-sync ticker and the running-state poll.
    pub fn start(&self) -> Result<(), BridgeError> {
        let mut workers = self.shared.workers.lock();
        if !workers.is_empty() {
            return Ok(());
        }
        workers.push(self.spawn_ticker(
            "media-sync",
            |bridge| bridge.shared.state.lock().media_sync.throttle_interval(),
            |bridge| bridge.tick_media_sync(Instant::now()),
        )?);
        workers.push(self.spawn_ticker(
            "running-state",
            |bridge| bridge.shared.state.lock().config.running_state_poll_interval(),
            |bridge| bridge.poll_running_state(),
        )?);
        Ok(())
    }

    /// Stop every worker and close the port.
    pub fn shutdown(&self) {
        let workers = std::mem::take(&mut *self.shared.workers.lock());
        for worker in workers {
            worker.stop();
        }
        self.disconnect();
    }

    /// Ports the transport can open.
    pub fn list_ports(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.shared.transport.lock().list_ports()?)
    }

    /// Open `port` and start the handshake. Any firmware transfer is cancelled.
    pub fn connect(&self, port: &str) -> Result<(), BridgeError> {
        self.cancel_ota();
        self.open(port)
    }

    /// Close the port and forget the connection state.
    pub fn disconnect(&self) {
        self.cancel_ota();
        self.shared.transport.lock().close();
        if let Some(port) = self.shared.state.lock().clear_connection() {
            info!("Disconnected from {}", port);
            self.emit(BridgeEvent::Disconnected);
        }
    }

    /// Close and reopen the current port, restarting the handshake.
    pub fn reconnect(&self) -> Result<(), BridgeError> {
        let port = self.port().ok_or(BridgeError::NotConnected)?;
        info!("Reopening {}", port);
        self.open(&port)
    }

    /// Feed bytes from the transport's input callback.
    pub fn receive(&self, bytes: &[u8]) {
        let now = Instant::now();
        let mut out = Outbox::default();
        {
            let mut state = self.shared.state.lock();
            if state.port.is_none() {
                trace!("Ignoring {} bytes while disconnected", bytes.len());
                return;
            }
            state.framer.push(bytes);
            while let Some(frame) = state.framer.decode() {
                state.handle_frame(&frame, now, &mut out);
            }
        }
        for event in out.events {
            self.emit(event);
        }
        if let Err(e) = self.send_all(&out.commands) {
            debug!("Handshake reply not sent: {}", e);
        }
    }

    /// Carry out an application request.
    pub fn execute(&self, command: BridgeCommand) -> Result<(), BridgeError> {
        match command {
            BridgeCommand::QueryConfig => self.send_connected(&Command::QueryConfig),

            BridgeCommand::PushConfig {
                enabled,
                max_delay_ms,
            } => {
                let config = DeviceConfig {
                    rf_simulation_enabled: enabled,
                    max_delay_ms: max_delay_ms.min(MAX_DELAY_MS),
                };
                let connected = {
                    let mut state = self.shared.state.lock();
                    state.config.set_device_config(config);
                    state.port.is_some()
                };
                if connected {
                    self.send_command(&Command::PushFullConfig(config))
                } else {
                    Ok(())
                }
            }

            BridgeCommand::QueryRunningState => self.send_connected(&Command::QueryRunningState),

            BridgeCommand::ChangeReceiverLayer { mac, layer } => {
                info!("Moving receiver {} to layer '{}'", mac, layer);
                self.send_connected(&Command::ChangeReceiverLayer { mac, layer })
            }

            BridgeCommand::MediaSync {
                layer,
                media,
                position_s,
                duration_s,
                state,
            } => {
                let now = Instant::now();
                let command = {
                    let mut guard = self.shared.state.lock();
                    if guard.port.is_none() || guard.is_layer_simulated(&layer) {
                        None
                    } else {
                        match media {
                            MediaRef::Filename(filename) => {
                                guard.media_sync.update(&layer, &filename, position_s, duration_s, state, now)
                            }
                            MediaRef::Index(index) => {
                                guard.media_sync.update_index(&layer, index, position_s, duration_s, state, now)
                            }
                        }
                    }
                };
                match command {
                    Some(command) => self.send_command(&command),
                    None => Ok(()),
                }
            }

            BridgeCommand::BeginOta { firmware } => self.begin_ota(firmware),

            BridgeCommand::EnterBootloader => {
                if self.is_ota_active() {
                    return Err(BridgeError::OtaInProgress);
                }
                self.send_connected(&Command::EnterBootloader)
            }

            BridgeCommand::LayerEvent { layer, route, args } => self.apply_layer_event(&layer, &route, &args),

            BridgeCommand::SetSimulationMode { mac, mode } => {
                self.shared.state.lock().simulation.set_mode(mac, mode);
                Ok(())
            }

            BridgeCommand::SetThrottleInterval(interval) => {
                let mut state = self.shared.state.lock();
                state.media_sync.set_throttle_interval(interval);
                let applied = state.media_sync.throttle_interval();
                state.config.media_sync.throttle_interval_ms = applied.as_millis() as u64;
                debug!("Media sync throttle interval set to {:?}", applied);
                Ok(())
            }

            BridgeCommand::SetFrameCorrection { frames, fps } => {
                let mut state = self.shared.state.lock();
                state.media_sync.set_frame_correction(frames, fps);
                state.config.media_sync.frame_correction_frames = frames;
                state.config.media_sync.fps = fps;
                Ok(())
            }
        }
    }

    /// Re-evaluate every layer and send due heartbeats and simulated positions.
    pub fn tick_media_sync(&self, now: Instant) {
        let commands = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if state.port.is_none() {
                return;
            }
            let mut commands = Vec::new();
            for layer in state.media_sync.layer_names() {
                if state.simulation.is_layer_simulated(&layer, &state.receivers) {
                    continue;
                }
                commands.extend(state.media_sync.refresh(&layer, now));
            }
            if state.simulation.is_running() {
                state.simulation.advance(now);
                commands.extend(state.simulation.sync_commands(&state.receivers));
            }
            commands
        };
        if let Err(e) = self.send_all(&commands) {
            debug!("Media sync tick aborted: {}", e);
        }
    }

    /// Send QUERY_RUNNING_STATE if the sender is initialized and no transfer runs.
    pub fn poll_running_state(&self) {
        if self.is_ota_active() {
            trace!("Running-state poll paused during firmware transfer");
            return;
        }
        if !self.shared.state.lock().handshake.should_poll() {
            return;
        }
        if let Err(e) = self.send_command(&Command::QueryRunningState) {
            debug!("Running-state poll failed: {}", e);
        }
    }

    /// Wait for the current firmware transfer, including its reconnect, to finish.
    pub fn wait_for_ota(&self) {
        let worker = self.shared.ota.lock().take();
        if let Some(worker) = worker {
            worker.join();
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Name of the open port.
    pub fn port(&self) -> Option<String> {
        self.shared.state.lock().port.clone()
    }

    /// Whether a port is open.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().port.is_some()
    }

    /// Handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        self.shared.state.lock().handshake.state()
    }

    /// Whether a firmware transfer is running.
    pub fn is_ota_active(&self) -> bool {
        self.shared.ota_active.load(Ordering::SeqCst)
    }

    /// Current configuration, including the device configuration mirror.
    pub fn config(&self) -> BridgeConfig {
        self.shared.state.lock().config.clone()
    }

    /// Known receivers, ordered by MAC.
    pub fn receivers(&self) -> Vec<TrackedReceiver> {
        self.shared.state.lock().receivers.iter().cloned().collect()
    }

    /// Playback state of a layer.
    pub fn layer(&self, name: &str) -> Option<LayerPlayback> {
        self.shared.state.lock().layers.get(name).cloned()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn open(&self, port: &str) -> Result<(), BridgeError> {
        if let Err(e) = self.open_transport(port) {
            if let Some(previous) = self.shared.state.lock().clear_connection() {
                warn!("Could not open {}, connection to {} dropped: {}", port, previous, e);
                self.emit(BridgeEvent::ConnectionLost {
                    reason: e.to_string(),
                });
            }
            return Err(e.into());
        }
        self.start_session(port)
    }

    fn open_transport(&self, port: &str) -> Result<(), TransportError> {
        let mut transport = self.shared.transport.lock();
        transport.close();
        transport.open(port)
    }

    /// Record `port` as open and send the opening QUERY_CONFIG.
    fn start_session(&self, port: &str) -> Result<(), BridgeError> {
        let commands = {
            let mut state = self.shared.state.lock();
            if let Some(previous) = state.clear_connection().filter(|p| p != port) {
                info!("Switched from {} to {}, receiver table cleared", previous, port);
            }
            state.port = Some(port.to_string());
            state.handshake.on_connect()
        };
        info!("Connected to {}, waiting for HELLO", port);
        self.emit(BridgeEvent::Connected {
            port: port.to_string(),
        });
        self.send_all(&commands)
    }

    fn apply_layer_event(&self, layer: &str, route: &str, args: &[LayerArg]) -> Result<(), BridgeError> {
        let now = Instant::now();
        let command = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if state.simulation.is_layer_simulated(layer, &state.receivers) {
                trace!("Layer '{}' is simulated, event {} discarded", layer, route);
                return Ok(());
            }
            let connected = state.port.is_some();
            match state.layers.apply(layer, route, args) {
                Some(playback) if connected && playback.is_sendable() => {
                    let playback = playback.clone();
                    state.media_sync.update(
                        layer,
                        &playback.filename,
                        playback.position_s,
                        playback.duration_s,
                        playback.state,
                        now,
                    )
                }
                _ => None,
            }
        };
        match command {
            Some(command) => self.send_command(&command),
            None => Ok(()),
        }
    }

    fn begin_ota(&self, firmware: Vec<u8>) -> Result<(), BridgeError> {
        let (ota_config, reboot_delay) = {
            let state = self.shared.state.lock();
            if state.port.is_none() {
                return Err(BridgeError::NotConnected);
            }
            (
                state.config.ota.clone(),
                Duration::from_millis(state.config.ota.reboot_delay_ms),
            )
        };
        let mut transfer = OtaTransfer::new(firmware, ota_config)?;
        if self.shared.ota_active.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::OtaInProgress);
        }
        // The previous transfer's worker has finished; reap it before replacing it.
        let previous = self.shared.ota.lock().take();
        drop(previous);

        let bridge = self.clone();
        let spawned = Worker::spawn("ota", move |token| {
            let result = transfer.run(
                |command| bridge.write(command),
                &token,
                |progress| bridge.emit(BridgeEvent::OtaProgress(progress)),
            );
            match result {
                Ok(report) => {
                    let port = bridge.release_for_reboot();
                    bridge.emit(BridgeEvent::OtaFinished(report));
                    if let Some(port) = port {
                        info!("Waiting {:.1}s for the sender to reboot", reboot_delay.as_secs_f64());
                        if !token.sleep(reboot_delay) {
                            bridge.reopen_after_reboot(&port);
                        }
                    }
                }
                Err(error) => {
                    warn!("Firmware transfer failed: {}", error);
                    bridge.emit(BridgeEvent::OtaFailed {
                        step: error.step(),
                        error: error.to_string(),
                    });
                    if !matches!(error, OtaError::Cancelled { .. }) {
                        bridge.reopen_after_ota();
                    }
                }
            }
            bridge.shared.ota_active.store(false, Ordering::SeqCst);
        });

        match spawned {
            Ok(worker) => {
                *self.shared.ota.lock() = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.shared.ota_active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Close the port while the sender reboots, returning its name.
    /// Writes are refused as `NotConnected` until the port is reopened.
    fn release_for_reboot(&self) -> Option<String> {
        let port = self.shared.state.lock().clear_connection();
        self.shared.transport.lock().close();
        port
    }

    fn reopen_after_reboot(&self, port: &str) {
        if let Err(e) = self.open_transport(port) {
            warn!("Could not reopen {} after firmware update: {}", port, e);
            self.emit(BridgeEvent::ConnectionLost {
                reason: e.to_string(),
            });
            return;
        }
        if let Err(e) = self.start_session(port) {
            debug!("Handshake after firmware update not started: {}", e);
        }
    }

    /// Any failure here has already been reported as `ConnectionLost`.
    fn reopen_after_ota(&self) {
        if let Err(e) = self.reconnect() {
            warn!("Could not reopen port after firmware transfer: {}", e);
        }
    }

    fn cancel_ota(&self) {
        let worker = self.shared.ota.lock().take();
        if let Some(worker) = worker {
            worker.stop();
        }
    }

    fn spawn_ticker<I, T>(&self, name: &str, interval: I, tick: T) -> Result<Worker, BridgeError>
    where
        I: Fn(&Bridge) -> Duration + Send + 'static,
        T: Fn(&Bridge) + Send + 'static,
    {
        let weak = Arc::downgrade(&self.shared);
        let tick_weak = weak.clone();
        Worker::periodic(
            name,
            move || upgrade(&weak).map(|bridge| interval(&bridge)),
            move || {
                if let Some(bridge) = upgrade(&tick_weak) {
                    tick(&bridge);
                }
            },
        )
    }

    fn send_connected(&self, command: &Command) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        self.send_command(command)
    }

    fn send_all(&self, commands: &[Command]) -> Result<(), BridgeError> {
        commands.iter().try_for_each(|command| self.send_command(command))
    }

    /// Write a command; a failure tears the connection down.
    fn send_command(&self, command: &Command) -> Result<(), BridgeError> {
        self.write(command).map_err(|e| {
            self.connection_lost(&e);
            BridgeError::from(e)
        })
    }

    fn write(&self, command: &Command) -> Result<(), TransportError> {
        let frame = command.encode();
        let result = self.shared.transport.lock().send(&frame);
        match &result {
            Ok(()) => {
                metrics::counter!(metric_defs::SYSEX_TX_FRAMES.name, "command" => command.name()).increment(1);
                match command {
                    Command::MediaSync { .. } | Command::OtaData { .. } => trace!("TX: {}", command),
                    _ => debug!("TX: {}", command),
                }
            }
            Err(e) => {
                metrics::counter!(metric_defs::SYSEX_TX_ERRORS.name).increment(1);
                warn!("Failed to send {}: {}", command.name(), e);
            }
        }
        result
    }

    fn connection_lost(&self, error: &TransportError) {
        let Some(port) = self.shared.state.lock().clear_connection() else {
            return;
        };
        warn!("Connection to {} lost: {}", port, error);
        self.shared.transport.lock().close();
        self.cancel_ota();
        self.emit(BridgeEvent::ConnectionLost {
            reason: error.to_string(),
        });
    }

    /// Queue an event without blocking.
    ///
    /// When the queue is full, progress and log-line events are dropped; any
    /// other event evicts the oldest queued one.
    fn emit(&self, event: BridgeEvent) {
        let mut event = event;
        loop {
            match self.shared.events_tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) if rejected.is_lossy() => {
                    metrics::counter!(metric_defs::EVENTS_DROPPED.name).increment(1);
                    trace!("Event queue full, dropping {:?}", rejected);
                    return;
                }
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(oldest) = self.shared.events_rx.try_recv() {
                        metrics::counter!(metric_defs::EVENTS_DROPPED.name).increment(1);
                        debug!("Event queue full, discarding oldest event {:?}", oldest);
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<Bridge> {
    weak.upgrade().map(|shared| Bridge { shared })
}
