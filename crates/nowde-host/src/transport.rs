//! Transport boundary.
//!
//! The bridge does not know about USB-MIDI. It writes complete frames through a
//! [`Transport`] and is handed incoming bytes by whoever owns the port's input
//! callback (see [`Bridge::receive`](crate::Bridge::receive)).
//!
//! [`MemoryTransport`] is an in-process implementation that records every
//! frame written, used by tests and the `nowde replay` command.

use std::sync::Arc;

use nowde_protocol::{Command, Message};
use parking_lot::Mutex;

use crate::TransportError;

/// Outbound side of a SysEx port.
///
/// Sends are synchronous and expected not to block for long; the bridge
/// serializes them behind a single lock.
pub trait Transport: Send {
    /// Names of the ports that could be opened.
    fn list_ports(&self) -> Result<Vec<String>, TransportError>;

    /// Open a port by name, closing any port already open.
    fn open(&mut self, port: &str) -> Result<(), TransportError>;

    /// Close the open port. Does nothing if none is open.
    fn close(&mut self);

    /// Name of the open port.
    fn port_name(&self) -> Option<String>;

    /// Write one complete frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    ports: Vec<String>,
    open: Option<String>,
    sent: Vec<Vec<u8>>,
    fail_sends: bool,
    open_count: usize,
}

/// In-memory transport. Clones share state, so a test can keep one handle
/// while the bridge owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Create a transport exposing the given port names.
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemoryTransport {
            state: Arc::new(Mutex::new(MemoryState {
                ports: ports.into_iter().map(Into::into).collect(),
                ..Default::default()
            })),
        }
    }

    /// Every frame written so far.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Take and clear the frames written so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// Frames written so far, decoded as host commands. Undecodable frames are skipped.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|frame| match Message::decode(frame) {
                Ok(Message::Command(command)) => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Make every following send fail (simulates an unplugged device).
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// How many times a port has been opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Whether a port is currently open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open.is_some()
    }
}

impl Transport for MemoryTransport {
    fn list_ports(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.state.lock().ports.clone())
    }

    fn open(&mut self, port: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.ports.iter().any(|p| p == port) {
            return Err(TransportError::PortNotFound(port.to_string()));
        }
        state.open = Some(port.to_string());
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().open = None;
    }

    fn port_name(&self) -> Option<String> {
        self.state.lock().open.clone()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.open.is_none() {
            return Err(TransportError::NotOpen);
        }
        if state.fail_sends {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            )));
        }
        state.sent.push(frame.to_vec());
        Ok(())
    }
}
