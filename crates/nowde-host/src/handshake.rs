//! Connection handshake with the sender.
//!
//! On connect the host sends QUERY_CONFIG and waits for HELLO. The first HELLO
//! initializes the session; a HELLO while already initialized means the
//! sender rebooted on its own. Either way the host pushes its configuration
//! and asks for the receiver table.

use nowde_protocol::{Command, DeviceConfig, HelloInfo};
use tracing::{info, warn};

/// Handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// No port open.
    #[default]
    Disconnected,
    /// QUERY_CONFIG sent, no HELLO yet.
    AwaitingHello,
    /// HELLO received and configuration pushed.
    Initialized,
}

/// What a HELLO meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloOutcome {
    /// First HELLO of this connection.
    FirstConnection,
    /// HELLO while already initialized: the sender rebooted.
    Reboot,
}

/// Tracks the handshake and decides which commands it requires.
#[derive(Debug, Clone, Default)]
pub struct HandshakeSession {
    state: HandshakeState,
    hello: Option<HelloInfo>,
}

impl HandshakeSession {
    /// Create a disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Last HELLO received on this connection.
    pub fn hello(&self) -> Option<&HelloInfo> {
        self.hello.as_ref()
    }

    /// Whether the running-state poll should run.
    pub fn should_poll(&self) -> bool {
        self.state == HandshakeState::Initialized
    }

    /// A port was opened. Returns the commands to send.
    pub fn on_connect(&mut self) -> Vec<Command> {
        self.state = HandshakeState::AwaitingHello;
        self.hello = None;
        vec![Command::QueryConfig]
    }

    /// A HELLO arrived. Returns its meaning and the commands to send.
    pub fn on_hello(&mut self, hello: HelloInfo, config: DeviceConfig) -> (HelloOutcome, Vec<Command>) {
        let outcome = if self.state == HandshakeState::Initialized {
            warn!(
                "Sender rebooted (version {}, boot reason {})",
                hello.version, hello.boot_reason
            );
            HelloOutcome::Reboot
        } else {
            info!(
                "Sender initialized (version {}, boot reason {})",
                hello.version, hello.boot_reason
            );
            HelloOutcome::FirstConnection
        };
        self.state = HandshakeState::Initialized;
        self.hello = Some(hello);
        (outcome, vec![Command::PushFullConfig(config), Command::QueryRunningState])
    }

    /// The port was closed or lost.
    pub fn on_disconnect(&mut self) {
        self.state = HandshakeState::Disconnected;
        self.hello = None;
    }
}
