//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding Nowde SysEx frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Frame is not delimited by `F0 … F7`.
    #[error("not a SysEx frame")]
    NotSysEx,

    /// Frame belongs to another manufacturer (another device on the bus).
    #[error("foreign manufacturer ID: 0x{0:02X}")]
    ForeignManufacturer(u8),

    /// Unknown command ID.
    #[error("unknown command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// A 7-bit encoded field ended before all of its bytes were present.
    #[error("truncated 7-bit field: expected {expected} bytes, decoded {actual}")]
    TruncatedEncoding {
        /// Number of raw bytes the field should carry.
        expected: usize,
        /// Number of raw bytes actually decoded.
        actual: usize,
    },

    /// Invalid data in frame.
    #[error("invalid frame data: {0}")]
    InvalidData(String),
}

/// Error codes reported by the sender in ERROR_REPORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorCode {
    /// Pushed configuration was rejected.
    ConfigInvalid,
    /// The sender could not parse a SysEx frame.
    SysExParseError,
    /// A mesh transmission failed.
    EspNowSendFailed,
    /// The mesh clock lost synchronization.
    MeshClockLostSync,
    /// A receiver stopped answering.
    ReceiverTimeout,
    /// Unspecified error.
    UnknownError,
    /// Code outside the known table.
    Unknown(u8),
}

impl DeviceErrorCode {
    /// Name of the error as printed by the firmware tooling.
    pub fn name(&self) -> String {
        match self {
            DeviceErrorCode::ConfigInvalid => "CONFIG_INVALID".to_string(),
            DeviceErrorCode::SysExParseError => "SYSEX_PARSE_ERROR".to_string(),
            DeviceErrorCode::EspNowSendFailed => "ESPNOW_SEND_FAILED".to_string(),
            DeviceErrorCode::MeshClockLostSync => "MESH_CLOCK_LOST_SYNC".to_string(),
            DeviceErrorCode::ReceiverTimeout => "RECEIVER_TIMEOUT".to_string(),
            DeviceErrorCode::UnknownError => "UNKNOWN_ERROR".to_string(),
            DeviceErrorCode::Unknown(code) => format!("UNKNOWN_0x{:02X}", code),
        }
    }
}

impl std::fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), u8::from(*self))
    }
}

impl From<u8> for DeviceErrorCode {
    fn from(code: u8) -> Self {
        use crate::constants::*;
        match code {
            ERR_CODE_CONFIG_INVALID => DeviceErrorCode::ConfigInvalid,
            ERR_CODE_SYSEX_PARSE_ERROR => DeviceErrorCode::SysExParseError,
            ERR_CODE_ESPNOW_SEND_FAILED => DeviceErrorCode::EspNowSendFailed,
            ERR_CODE_MESH_CLOCK_LOST_SYNC => DeviceErrorCode::MeshClockLostSync,
            ERR_CODE_RECEIVER_TIMEOUT => DeviceErrorCode::ReceiverTimeout,
            ERR_CODE_UNKNOWN_ERROR => DeviceErrorCode::UnknownError,
            _ => DeviceErrorCode::Unknown(code),
        }
    }
}

impl From<DeviceErrorCode> for u8 {
    fn from(code: DeviceErrorCode) -> Self {
        use crate::constants::*;
        match code {
            DeviceErrorCode::ConfigInvalid => ERR_CODE_CONFIG_INVALID,
            DeviceErrorCode::SysExParseError => ERR_CODE_SYSEX_PARSE_ERROR,
            DeviceErrorCode::EspNowSendFailed => ERR_CODE_ESPNOW_SEND_FAILED,
            DeviceErrorCode::MeshClockLostSync => ERR_CODE_MESH_CLOCK_LOST_SYNC,
            DeviceErrorCode::ReceiverTimeout => ERR_CODE_RECEIVER_TIMEOUT,
            DeviceErrorCode::UnknownError => ERR_CODE_UNKNOWN_ERROR,
            DeviceErrorCode::Unknown(code) => code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_names() {
        assert_eq!(DeviceErrorCode::from(0x04).name(), "MESH_CLOCK_LOST_SYNC");
        assert_eq!(DeviceErrorCode::from(0xFF), DeviceErrorCode::UnknownError);
        assert_eq!(DeviceErrorCode::from(0x42).name(), "UNKNOWN_0x42");
        assert_eq!(u8::from(DeviceErrorCode::from(0x42)), 0x42);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(
            DeviceErrorCode::ReceiverTimeout.to_string(),
            "RECEIVER_TIMEOUT (0x05)"
        );
    }
}
