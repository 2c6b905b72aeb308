//! Protocol constants
//!
//! These constants define the framing bytes, command IDs, field sizes and
//! code tables used by the Nowde SysEx control protocol.

// ============================================================================
// Framing
// ============================================================================

/// SysEx start byte.
pub const SYSEX_START: u8 = 0xF0;
/// SysEx end byte.
pub const SYSEX_END: u8 = 0xF7;
/// Manufacturer ID (MIDI non-commercial / educational use).
pub const MANUFACTURER_ID: u8 = 0x7D;
/// Bytes preceding the payload: start byte, manufacturer ID, command ID.
pub const HEADER_SIZE: usize = 3;
/// Smallest valid frame (`F0 7D CMD F7`).
pub const MIN_FRAME_SIZE: usize = 4;
/// Largest frame the framer will buffer before abandoning it.
pub const MAX_FRAME_SIZE: usize = 4096;

// ============================================================================
// Command IDs: host → sender (direct)
// ============================================================================

/// Ask the sender to report HELLO and CONFIG_STATE.
pub const CMD_QUERY_CONFIG: u8 = 0x01;
/// Push the complete device configuration.
pub const CMD_PUSH_FULL_CONFIG: u8 = 0x02;
/// Ask the sender for its receiver table.
pub const CMD_QUERY_RUNNING_STATE: u8 = 0x03;
/// Reboot the sender into its bootloader.
pub const CMD_ENTER_BOOTLOADER: u8 = 0x04;
/// Start a firmware transfer (carries the image size).
pub const CMD_OTA_BEGIN: u8 = 0x05;
/// One chunk of firmware image.
pub const CMD_OTA_DATA: u8 = 0x06;
/// Finish a firmware transfer; the sender flashes and reboots.
pub const CMD_OTA_END: u8 = 0x07;

// ============================================================================
// Command IDs: host → sender (relayed to mesh)
// ============================================================================

/// Media position/index sync for one layer.
pub const CMD_MEDIA_SYNC: u8 = 0x10;
/// Reassign a receiver to another layer.
pub const CMD_CHANGE_RECEIVER_LAYER: u8 = 0x11;

// ============================================================================
// Command IDs: sender → host
// ============================================================================

/// Boot announcement.
pub const CMD_HELLO: u8 = 0x20;
/// Current device configuration.
pub const CMD_CONFIG_STATE: u8 = 0x21;
/// One chunk of the receiver table.
pub const CMD_RUNNING_STATE: u8 = 0x22;
/// Device-side error.
pub const CMD_ERROR_REPORT: u8 = 0x30;

// ============================================================================
// Field Sizes
// ============================================================================

/// Size of a receiver MAC address.
pub const MAC_SIZE: usize = 6;
/// Size of a layer name field.
pub const LAYER_NAME_SIZE: usize = 16;
/// Size of a firmware version field.
pub const VERSION_SIZE: usize = 8;
/// Raw size of one receiver record.
pub const RECEIVER_RECORD_SIZE: usize = 36;
/// Encoded size of one receiver record.
pub const RECEIVER_RECORD_ENCODED_SIZE: usize = 42;
/// Encoded size of a big-endian u32.
pub const U32_ENCODED_SIZE: usize = 5;

/// Highest media index a MEDIA_SYNC can carry.
pub const MAX_MEDIA_INDEX: u8 = 127;
/// Highest delay representable in the 14-bit config field.
pub const MAX_DELAY_MS: u16 = 0x3FFF;

// ============================================================================
// Frame Lengths
// ============================================================================

/// Frame length of HELLO.
pub const HELLO_FRAME_SIZE: usize = 20;
/// Frame length of PUSH_FULL_CONFIG and CONFIG_STATE.
pub const CONFIG_FRAME_SIZE: usize = 7;
/// Frame length of MEDIA_SYNC.
pub const MEDIA_SYNC_FRAME_SIZE: usize = 27;
/// Frame length of CHANGE_RECEIVER_LAYER.
pub const CHANGE_RECEIVER_LAYER_FRAME_SIZE: usize = 30;
/// Minimum frame length of RUNNING_STATE (no receiver records).
pub const RUNNING_STATE_MIN_FRAME_SIZE: usize = 14;
/// Minimum frame length of ERROR_REPORT.
pub const ERROR_REPORT_MIN_FRAME_SIZE: usize = 6;

/// Longest ERROR_REPORT context that fits the one-byte length field.
pub const ERROR_REPORT_MAX_CONTEXT: usize = 0x7F;

// ============================================================================
// Boot Reasons (HELLO)
// ============================================================================

/// Power-on reset.
pub const BOOT_REASON_POWERON: u8 = 1;
/// Software reset.
pub const BOOT_REASON_SOFTWARE: u8 = 3;
/// Watchdog reset.
pub const BOOT_REASON_WATCHDOG: u8 = 4;
/// Wake from deep sleep.
pub const BOOT_REASON_DEEP_SLEEP: u8 = 5;
/// Brownout reset.
pub const BOOT_REASON_BROWNOUT: u8 = 6;
/// SDIO reset.
pub const BOOT_REASON_SDIO: u8 = 7;
/// CPU0 reset.
pub const BOOT_REASON_CPU0_RESET: u8 = 12;
/// CPU1 reset.
pub const BOOT_REASON_CPU1_RESET: u8 = 13;

// ============================================================================
// Error Codes (ERROR_REPORT)
// ============================================================================

/// Pushed configuration was rejected.
pub const ERR_CODE_CONFIG_INVALID: u8 = 0x01;
/// The sender could not parse a SysEx frame.
pub const ERR_CODE_SYSEX_PARSE_ERROR: u8 = 0x02;
/// A mesh transmission failed.
pub const ERR_CODE_ESPNOW_SEND_FAILED: u8 = 0x03;
/// The mesh clock lost synchronization.
pub const ERR_CODE_MESH_CLOCK_LOST_SYNC: u8 = 0x04;
/// A receiver stopped answering.
pub const ERR_CODE_RECEIVER_TIMEOUT: u8 = 0x05;
/// Unspecified error.
pub const ERR_CODE_UNKNOWN_ERROR: u8 = 0xFF;

// ============================================================================
// Playback State (MEDIA_SYNC)
// ============================================================================

/// Media is stopped.
pub const PLAYBACK_STOPPED: u8 = 0;
/// Media is playing.
pub const PLAYBACK_PLAYING: u8 = 1;
