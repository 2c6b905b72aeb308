//! Commands that can be sent to a Nowde sender.

use crate::constants::*;
use crate::frame::{encode_frame, frame_command, frame_payload};
use crate::sevenbit;
use crate::types::*;
use crate::ProtocolError;

/// Commands that can be sent to a Nowde sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the sender to report HELLO and CONFIG_STATE.
    QueryConfig,

    /// Push the complete device configuration.
    PushFullConfig(DeviceConfig),

    /// Ask the sender for its receiver table.
    QueryRunningState,

    /// Reboot the sender into its bootloader.
    EnterBootloader,

    /// Start a firmware transfer.
    OtaBegin {
        /// Size of the firmware image in bytes.
        total_size: u32,
    },

    /// One chunk of firmware image.
    OtaData {
        /// Raw chunk bytes (7-bit packed on the wire).
        chunk: Vec<u8>,
    },

    /// Finish a firmware transfer.
    OtaEnd,

    /// Media position/index sync for one layer, relayed to the mesh.
    MediaSync {
        /// Layer name (at most 16 ASCII characters).
        layer: String,
        /// Media index (0 = stopped, 1-127 = media number).
        media_index: u8,
        /// Playback position in milliseconds.
        position_ms: u32,
        /// Playback state.
        state: PlaybackState,
    },

    /// Reassign a receiver to another layer, relayed to the mesh.
    ChangeReceiverLayer {
        /// Receiver MAC address.
        mac: MacAddress,
        /// New layer name (at most 16 ASCII characters).
        layer: String,
    },
}

impl Command {
    /// Get the command ID for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::QueryConfig => CMD_QUERY_CONFIG,
            Command::PushFullConfig(_) => CMD_PUSH_FULL_CONFIG,
            Command::QueryRunningState => CMD_QUERY_RUNNING_STATE,
            Command::EnterBootloader => CMD_ENTER_BOOTLOADER,
            Command::OtaBegin { .. } => CMD_OTA_BEGIN,
            Command::OtaData { .. } => CMD_OTA_DATA,
            Command::OtaEnd => CMD_OTA_END,
            Command::MediaSync { .. } => CMD_MEDIA_SYNC,
            Command::ChangeReceiverLayer { .. } => CMD_CHANGE_RECEIVER_LAYER,
        }
    }

    /// Protocol name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::QueryConfig => "QUERY_CONFIG",
            Command::PushFullConfig(_) => "PUSH_FULL_CONFIG",
            Command::QueryRunningState => "QUERY_RUNNING_STATE",
            Command::EnterBootloader => "ENTER_BOOTLOADER",
            Command::OtaBegin { .. } => "OTA_BEGIN",
            Command::OtaData { .. } => "OTA_DATA",
            Command::OtaEnd => "OTA_END",
            Command::MediaSync { .. } => "MEDIA_SYNC",
            Command::ChangeReceiverLayer { .. } => "CHANGE_RECEIVER_LAYER",
        }
    }

    /// Encode the command into a complete SysEx frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();

        match self {
            Command::QueryConfig
            | Command::QueryRunningState
            | Command::EnterBootloader
            | Command::OtaEnd => {}

            Command::PushFullConfig(config) => {
                payload.extend_from_slice(&config.to_payload());
            }

            Command::OtaBegin { total_size } => {
                payload.extend_from_slice(&sevenbit::encode_u32(*total_size));
            }

            Command::OtaData { chunk } => {
                payload.extend_from_slice(&sevenbit::encode(chunk));
            }

            Command::MediaSync {
                layer,
                media_index,
                position_ms,
                state,
            } => {
                // Layer text is plain ASCII, already bus-safe.
                payload.extend_from_slice(&encode_text(layer, LAYER_NAME_SIZE));
                payload.push((*media_index).min(MAX_MEDIA_INDEX));
                payload.extend_from_slice(&sevenbit::encode_u32(*position_ms));
                payload.push((*state).into());
            }

            Command::ChangeReceiverLayer { mac, layer } => {
                payload.extend_from_slice(&sevenbit::encode(mac.as_bytes()));
                payload.extend_from_slice(&sevenbit::encode(&encode_text(layer, LAYER_NAME_SIZE)));
            }
        }

        encode_frame(self.code(), &payload)
    }

    /// Decode a host → sender frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let code = frame_command(frame)?;
        let payload = frame_payload(frame);

        match code {
            CMD_QUERY_CONFIG => Ok(Command::QueryConfig),
            CMD_QUERY_RUNNING_STATE => Ok(Command::QueryRunningState),
            CMD_ENTER_BOOTLOADER => Ok(Command::EnterBootloader),
            CMD_OTA_END => Ok(Command::OtaEnd),

            CMD_PUSH_FULL_CONFIG => {
                require_len(frame, CONFIG_FRAME_SIZE)?;
                Ok(Command::PushFullConfig(DeviceConfig::from_payload(&[
                    payload[0], payload[1], payload[2],
                ])))
            }

            CMD_OTA_BEGIN => {
                require_len(frame, MIN_FRAME_SIZE + U32_ENCODED_SIZE)?;
                Ok(Command::OtaBegin {
                    total_size: sevenbit::decode_u32(payload)?,
                })
            }

            CMD_OTA_DATA => {
                let decoded = sevenbit::decode(payload);
                if decoded.truncated {
                    return Err(ProtocolError::TruncatedEncoding {
                        expected: sevenbit::decoded_len(payload.len()),
                        actual: decoded.bytes.len(),
                    });
                }
                Ok(Command::OtaData {
                    chunk: decoded.bytes,
                })
            }

            CMD_MEDIA_SYNC => {
                require_len(frame, MEDIA_SYNC_FRAME_SIZE)?;
                Ok(Command::MediaSync {
                    layer: decode_text(&payload[0..16]),
                    media_index: payload[16],
                    position_ms: sevenbit::decode_u32(&payload[17..22])?,
                    state: PlaybackState::from(payload[22]),
                })
            }

            CMD_CHANGE_RECEIVER_LAYER => {
                require_len(frame, CHANGE_RECEIVER_LAYER_FRAME_SIZE)?;
                let mac = sevenbit::decode_exact(&payload[0..7], MAC_SIZE)?;
                let layer = sevenbit::decode_exact(&payload[7..26], LAYER_NAME_SIZE)?;
                Ok(Command::ChangeReceiverLayer {
                    mac: MacAddress::from_slice(&mac).unwrap_or_default(),
                    layer: decode_text(&layer),
                })
            }

            _ => Err(ProtocolError::UnknownCommand(code)),
        }
    }
}

/// Check a frame against the minimum length of its command.
pub(crate) fn require_len(frame: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if frame.len() < expected {
        return Err(ProtocolError::FrameTooShort {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::QueryConfig.encode(), vec![0xF0, 0x7D, 0x01, 0xF7]);
        assert_eq!(Command::QueryRunningState.encode(), vec![0xF0, 0x7D, 0x03, 0xF7]);
        assert_eq!(Command::EnterBootloader.encode(), vec![0xF0, 0x7D, 0x04, 0xF7]);
        assert_eq!(Command::OtaEnd.encode(), vec![0xF0, 0x7D, 0x07, 0xF7]);
    }

    #[test]
    fn test_push_full_config_layout() {
        let frame = Command::PushFullConfig(DeviceConfig {
            rf_simulation_enabled: true,
            max_delay_ms: 16383,
        })
        .encode();
        assert_eq!(frame, vec![0xF0, 0x7D, 0x02, 0x01, 0x7F, 0x7F, 0xF7]);
    }

    #[test]
    fn test_media_sync_layout() {
        let frame = Command::MediaSync {
            layer: "Layer 1".to_string(),
            media_index: 42,
            position_ms: 0x0001_E240,
            state: PlaybackState::Playing,
        }
        .encode();

        assert_eq!(frame.len(), MEDIA_SYNC_FRAME_SIZE);
        assert_eq!(&frame[0..3], &[0xF0, 0x7D, 0x10]);
        assert_eq!(&frame[3..10], b"Layer 1");
        assert!(frame[10..19].iter().all(|b| *b == 0));
        assert_eq!(frame[19], 42);
        // 0x0001E240 = [00 01 E2 40]; 0xE2 carries the only high bit.
        assert_eq!(&frame[20..25], &[0b0100, 0x00, 0x01, 0x62, 0x40]);
        assert_eq!(frame[25], 1);
        assert_eq!(frame[26], 0xF7);
    }

    #[test]
    fn test_media_sync_clamps_and_truncates() {
        let frame = Command::MediaSync {
            layer: "a-very-long-layer-name".to_string(),
            media_index: 200,
            position_ms: 0,
            state: PlaybackState::Stopped,
        }
        .encode();
        assert_eq!(frame.len(), MEDIA_SYNC_FRAME_SIZE);
        assert_eq!(&frame[3..19], b"a-very-long-laye");
        assert_eq!(frame[19], 127);
        assert_eq!(frame[25], 0);
    }

    #[test]
    fn test_change_receiver_layer_layout() {
        let command = Command::ChangeReceiverLayer {
            mac: MacAddress::new([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]),
            layer: "Stage".to_string(),
        };
        let frame = command.encode();
        assert_eq!(frame.len(), CHANGE_RECEIVER_LAYER_FRAME_SIZE);
        assert_eq!(frame[3], 0b0111);
        assert_eq!(&frame[4..10], &[0x2A, 0x3B, 0x4C, 0x01, 0x02, 0x03]);
        assert_eq!(Command::decode(&frame), Ok(command));
    }

    #[test]
    fn test_ota_frames() {
        let begin = Command::OtaBegin { total_size: 256000 }.encode();
        assert_eq!(begin.len(), 9);
        assert_eq!(
            Command::decode(&begin),
            Ok(Command::OtaBegin { total_size: 256000 })
        );

        let chunk: Vec<u8> = (0..100).map(|i| (i * 3) as u8 | 0x80).collect();
        let data = Command::OtaData { chunk: chunk.clone() }.encode();
        assert_eq!(data.len(), 3 + 115 + 1);
        assert!(data[1..data.len() - 1].iter().all(|b| *b < 0x80));
        assert_eq!(Command::decode(&data), Ok(Command::OtaData { chunk }));
    }

    #[test]
    fn test_decode_short_media_sync() {
        let frame = [0xF0, 0x7D, 0x10, 0x41, 0xF7];
        assert_eq!(
            Command::decode(&frame),
            Err(ProtocolError::FrameTooShort {
                expected: MEDIA_SYNC_FRAME_SIZE,
                actual: 5
            })
        );
    }

    #[test]
    fn test_decode_unknown() {
        assert_eq!(
            Command::decode(&[0xF0, 0x7D, 0x0E, 0xF7]),
            Err(ProtocolError::UnknownCommand(0x0E))
        );
    }
}
