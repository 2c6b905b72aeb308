//! Host-side error types.

use nowde_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Error, Debug)]
pub enum TransportError {
    /// No port is open.
    #[error("no port open")]
    NotOpen,

    /// The named port does not exist.
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// Listing ports failed.
    #[error("port enumeration failed: {0}")]
    Enumeration(String),

    /// The underlying device reported an error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Step of a firmware transfer, used to report where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStep {
    /// Sending OTA_BEGIN.
    Begin,
    /// Waiting for the sender to prepare.
    Prepare,
    /// Sending one OTA_DATA chunk.
    Data {
        /// Zero-based chunk index.
        chunk: usize,
        /// Total number of chunks.
        of: usize,
    },
    /// Waiting for the flash write to settle.
    FlashSettle,
    /// Sending OTA_END.
    End,
}

impl std::fmt::Display for OtaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OtaStep::Begin => write!(f, "OTA_BEGIN"),
            OtaStep::Prepare => write!(f, "prepare wait"),
            OtaStep::Data { chunk, of } => write!(f, "OTA_DATA chunk {}/{}", chunk + 1, of),
            OtaStep::FlashSettle => write!(f, "flash settle wait"),
            OtaStep::End => write!(f, "OTA_END"),
        }
    }
}

/// Errors that abort a firmware transfer.
#[derive(Error, Debug)]
pub enum OtaError {
    /// A transport write failed.
    #[error("firmware transfer failed at {step}: {source}")]
    Step {
        /// Step that failed.
        step: OtaStep,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// The transfer was cancelled (disconnect or shutdown).
    #[error("firmware transfer cancelled at {step}")]
    Cancelled {
        /// Step in progress when cancelled.
        step: OtaStep,
    },

    /// The image is empty.
    #[error("firmware image is empty")]
    EmptyImage,

    /// The image size does not fit the 32-bit size field.
    #[error("firmware image too large: {0} bytes")]
    TooLarge(usize),
}

impl OtaError {
    /// Step at which the transfer stopped, if it got that far.
    pub fn step(&self) -> Option<OtaStep> {
        match self {
            OtaError::Step { step, .. } | OtaError::Cancelled { step } => Some(*step),
            OtaError::EmptyImage | OtaError::TooLarge(_) => None,
        }
    }
}

/// Errors surfaced by the [`Bridge`](crate::Bridge).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid protocol data supplied by the caller.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Firmware transfer failure.
    #[error(transparent)]
    Ota(#[from] OtaError),

    /// A firmware transfer is already running.
    #[error("firmware transfer already in progress")]
    OtaInProgress,

    /// The operation needs an open, connected sender.
    #[error("no sender connected")]
    NotConnected,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
