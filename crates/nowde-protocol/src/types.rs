//! Common types used in the protocol.

use crate::constants::*;
use crate::{DeviceErrorCode, ProtocolError};

/// A 6-byte receiver MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; MAC_SIZE]);

impl MacAddress {
    /// Create a new MAC address from bytes.
    pub fn new(bytes: [u8; MAC_SIZE]) -> Self {
        MacAddress(bytes)
    }

    /// Create from a slice. Returns None if the slice is too short.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= MAC_SIZE {
            let mut bytes = [0u8; MAC_SIZE];
            bytes.copy_from_slice(&slice[..MAC_SIZE]);
            Some(MacAddress(bytes))
        } else {
            None
        }
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_SIZE] {
        &self.0
    }

    /// Short identifier: the last three bytes in upper-case hex.
    pub fn uuid(&self) -> String {
        hex_encode(&self.0[3..])
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        MacAddress([0u8; MAC_SIZE])
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl std::str::FromStr for MacAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != MAC_SIZE {
            return Err(ProtocolError::InvalidData(format!(
                "invalid MAC address format: {}",
                s
            )));
        }
        let mut bytes = [0u8; MAC_SIZE];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            *byte = u8::from_str_radix(part, 16).map_err(|_| {
                ProtocolError::InvalidData(format!("invalid MAC address hex values: {}", s))
            })?;
        }
        Ok(MacAddress(bytes))
    }
}

/// Playback state carried by MEDIA_SYNC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackState {
    /// Media is stopped.
    #[default]
    Stopped,
    /// Media is playing.
    Playing,
}

impl PlaybackState {
    /// Lower-case name, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
        }
    }
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        if value == PLAYBACK_PLAYING {
            PlaybackState::Playing
        } else {
            PlaybackState::Stopped
        }
    }
}

impl From<PlaybackState> for u8 {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Stopped => PLAYBACK_STOPPED,
            PlaybackState::Playing => PLAYBACK_PLAYING,
        }
    }
}

/// Reset reason reported in HELLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootReason {
    /// Power-on reset.
    PowerOn,
    /// Software reset.
    Software,
    /// Watchdog reset.
    Watchdog,
    /// Wake from deep sleep.
    DeepSleep,
    /// Brownout reset.
    Brownout,
    /// SDIO reset.
    Sdio,
    /// CPU0 reset.
    Cpu0Reset,
    /// CPU1 reset.
    Cpu1Reset,
    /// Unrecognized reason code.
    Unknown(u8),
}

impl BootReason {
    /// Name as printed in logs (`UNKNOWN_0xNN` for unrecognized codes).
    pub fn name(&self) -> String {
        match self {
            BootReason::PowerOn => "POWERON".to_string(),
            BootReason::Software => "SOFTWARE".to_string(),
            BootReason::Watchdog => "WATCHDOG".to_string(),
            BootReason::DeepSleep => "DEEP_SLEEP".to_string(),
            BootReason::Brownout => "BROWNOUT".to_string(),
            BootReason::Sdio => "SDIO".to_string(),
            BootReason::Cpu0Reset => "CPU0_RESET".to_string(),
            BootReason::Cpu1Reset => "CPU1_RESET".to_string(),
            BootReason::Unknown(code) => format!("UNKNOWN_0x{:02X}", code),
        }
    }
}

impl From<u8> for BootReason {
    fn from(code: u8) -> Self {
        match code {
            BOOT_REASON_POWERON => BootReason::PowerOn,
            BOOT_REASON_SOFTWARE => BootReason::Software,
            BOOT_REASON_WATCHDOG => BootReason::Watchdog,
            BOOT_REASON_DEEP_SLEEP => BootReason::DeepSleep,
            BOOT_REASON_BROWNOUT => BootReason::Brownout,
            BOOT_REASON_SDIO => BootReason::Sdio,
            BOOT_REASON_CPU0_RESET => BootReason::Cpu0Reset,
            BOOT_REASON_CPU1_RESET => BootReason::Cpu1Reset,
            _ => BootReason::Unknown(code),
        }
    }
}

impl From<BootReason> for u8 {
    fn from(reason: BootReason) -> Self {
        match reason {
            BootReason::PowerOn => BOOT_REASON_POWERON,
            BootReason::Software => BOOT_REASON_SOFTWARE,
            BootReason::Watchdog => BOOT_REASON_WATCHDOG,
            BootReason::DeepSleep => BOOT_REASON_DEEP_SLEEP,
            BootReason::Brownout => BOOT_REASON_BROWNOUT,
            BootReason::Sdio => BOOT_REASON_SDIO,
            BootReason::Cpu0Reset => BOOT_REASON_CPU0_RESET,
            BootReason::Cpu1Reset => BOOT_REASON_CPU1_RESET,
            BootReason::Unknown(code) => code,
        }
    }
}

impl std::fmt::Display for BootReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Sender configuration, as pushed by PUSH_FULL_CONFIG and reported by CONFIG_STATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Whether the sender simulates RF delay on relayed messages.
    pub rf_simulation_enabled: bool,
    /// Maximum simulated delay in milliseconds (14-bit on the wire).
    pub max_delay_ms: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            rf_simulation_enabled: false,
            max_delay_ms: 400,
        }
    }
}

impl DeviceConfig {
    /// Encode as the three payload bytes `enabled hi lo`.
    pub fn to_payload(&self) -> [u8; 3] {
        let delay = self.max_delay_ms.min(MAX_DELAY_MS);
        [
            u8::from(self.rf_simulation_enabled),
            ((delay >> 7) & 0x7F) as u8,
            (delay & 0x7F) as u8,
        ]
    }

    /// Decode from the three payload bytes `enabled hi lo`.
    pub fn from_payload(payload: &[u8; 3]) -> Self {
        DeviceConfig {
            rf_simulation_enabled: payload[0] != 0,
            max_delay_ms: (u16::from(payload[1] & 0x7F) << 7) | u16::from(payload[2] & 0x7F),
        }
    }
}

/// Contents of a HELLO frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloInfo {
    /// Firmware version string.
    pub version: String,
    /// Sender uptime in milliseconds.
    pub uptime_ms: u32,
    /// Why the sender booted.
    pub boot_reason: BootReason,
}

/// One receiver as reported by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverRecord {
    /// Receiver MAC address (identity key).
    pub mac: MacAddress,
    /// Layer the receiver follows.
    pub layer: String,
    /// Receiver firmware version.
    pub version: String,
    /// Milliseconds since the sender last heard from this receiver.
    pub last_seen_ms: u32,
    /// Whether the sender considers the receiver active.
    pub active: bool,
    /// Media currently playing (0 = stopped).
    pub media_index: u8,
}

impl ReceiverRecord {
    /// Short identifier derived from the MAC address.
    pub fn uuid(&self) -> String {
        self.mac.uuid()
    }

    /// Display name (`Nowde-<uuid>`).
    pub fn name(&self) -> String {
        format!("Nowde-{}", self.uuid())
    }

    /// Decode a record from its 36 raw (already 7-bit decoded) bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() < RECEIVER_RECORD_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: RECEIVER_RECORD_SIZE,
                actual: raw.len(),
            });
        }
        let mac = MacAddress::from_slice(&raw[0..6]).unwrap_or_default();
        Ok(ReceiverRecord {
            mac,
            layer: decode_text(&raw[6..22]),
            version: decode_text(&raw[22..30]),
            last_seen_ms: u32::from_be_bytes([raw[30], raw[31], raw[32], raw[33]]),
            active: raw[34] != 0,
            media_index: raw[35],
        })
    }

    /// Encode the record into its 36 raw bytes.
    pub fn to_bytes(&self) -> [u8; RECEIVER_RECORD_SIZE] {
        let mut raw = [0u8; RECEIVER_RECORD_SIZE];
        raw[0..6].copy_from_slice(self.mac.as_bytes());
        raw[6..22].copy_from_slice(&encode_text(&self.layer, LAYER_NAME_SIZE));
        raw[22..30].copy_from_slice(&encode_text(&self.version, VERSION_SIZE));
        raw[30..34].copy_from_slice(&self.last_seen_ms.to_be_bytes());
        raw[34] = u8::from(self.active);
        raw[35] = self.media_index;
        raw
    }
}

/// One chunk of a RUNNING_STATE snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStateChunk {
    /// Sender uptime in milliseconds.
    pub uptime_ms: u32,
    /// Whether the mesh clock is synchronized.
    pub mesh_synced: bool,
    /// Index of this chunk within the snapshot.
    pub chunk_index: u8,
    /// Number of chunks in the snapshot.
    pub chunk_count: u8,
    /// Number of receivers across all chunks.
    pub total_receivers: u8,
    /// Receivers the sender declared for this chunk.
    pub declared_receivers: u8,
    /// Receivers actually decoded from this chunk.
    pub receivers: Vec<ReceiverRecord>,
}

/// Contents of an ERROR_REPORT frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Error code.
    pub code: DeviceErrorCode,
    /// Raw context bytes (often a MAC address).
    pub context: Vec<u8>,
}

/// Encode text into a fixed-width field: non-ASCII characters are dropped,
/// the rest truncated to `width` and zero-padded.
pub fn encode_text(text: &str, width: usize) -> Vec<u8> {
    let mut out: Vec<u8> = text.bytes().filter(u8::is_ascii).take(width).collect();
    out.resize(width, 0);
    out
}

/// Decode a fixed-width text field: bytes above 0x7F are dropped and
/// trailing NULs trimmed.
pub fn decode_text(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|b| *b as char)
        .collect();
    text.trim_end_matches('\0').to_string()
}

/// Helper to encode bytes as upper-case hex.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddress = "aa:bb:cc:01:02:03".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "AA:BB:CC:01:02:03");
        assert_eq!(mac.uuid(), "010203");
    }

    #[test]
    fn test_mac_parse_rejects_bad_input() {
        assert!("AA:BB:CC".parse::<MacAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:GG".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_device_config_delay_split() {
        let config = DeviceConfig {
            rf_simulation_enabled: true,
            max_delay_ms: 400,
        };
        assert_eq!(config.to_payload(), [1, 3, 16]);
        assert_eq!(DeviceConfig::from_payload(&[1, 3, 16]), config);
    }

    #[test]
    fn test_device_config_delay_clamped() {
        let config = DeviceConfig {
            rf_simulation_enabled: false,
            max_delay_ms: 20000,
        };
        assert_eq!(config.to_payload(), [0, 0x7F, 0x7F]);
    }

    #[test]
    fn test_text_fields() {
        assert_eq!(encode_text("Layer 1", 10), b"Layer 1\0\0\0".to_vec());
        assert_eq!(encode_text("abcdefghijklmnopqrs", 16).len(), 16);
        assert_eq!(encode_text("é1", 4), vec![b'1', 0, 0, 0]);
        assert_eq!(decode_text(b"v1.2\0\0\0\0"), "v1.2");
        assert_eq!(decode_text(&[b'a', 0xC3, b'b', 0]), "ab");
    }

    #[test]
    fn test_receiver_record_bytes() {
        let record = ReceiverRecord {
            mac: MacAddress::new([1, 2, 3, 0xAB, 0xCD, 0xEF]),
            layer: "Layer 1".to_string(),
            version: "1.4.0".to_string(),
            last_seen_ms: 1234,
            active: true,
            media_index: 42,
        };
        let raw = record.to_bytes();
        assert_eq!(ReceiverRecord::from_bytes(&raw).unwrap(), record);
        assert_eq!(record.name(), "Nowde-ABCDEF");
    }

    #[test]
    fn test_boot_reason_names() {
        assert_eq!(BootReason::from(1).name(), "POWERON");
        assert_eq!(BootReason::from(12), BootReason::Cpu0Reset);
        assert_eq!(BootReason::from(0x09).name(), "UNKNOWN_0x09");
    }
}
