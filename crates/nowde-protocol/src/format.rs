//! Human-readable one-line descriptions of frames, for logs and dumps.

use crate::{frame_command, Command, Message, ProtocolError, Response};

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::PushFullConfig(config) => write!(
                f,
                "SysEx: PUSH_FULL_CONFIG RF={}, MaxDelay={}ms",
                on_off(config.rf_simulation_enabled),
                config.max_delay_ms
            ),
            Command::OtaBegin { total_size } => {
                write!(f, "SysEx: OTA_BEGIN Size={} bytes", total_size)
            }
            Command::OtaData { chunk } => write!(f, "SysEx: OTA_DATA {} bytes", chunk.len()),
            Command::MediaSync {
                layer,
                media_index,
                position_ms,
                state,
            } => write!(
                f,
                "SysEx: MEDIA_SYNC Layer='{}', Index={}, Pos={:.2}s, State={}",
                layer,
                media_index,
                f64::from(*position_ms) / 1000.0,
                state.as_str()
            ),
            Command::ChangeReceiverLayer { mac, layer } => write!(
                f,
                "SysEx: CHANGE_RECEIVER_LAYER MAC={}, Layer='{}'",
                mac, layer
            ),
            other => write!(f, "SysEx: {}", other.name()),
        }
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Hello(hello) => write!(
                f,
                "SysEx: HELLO - Version: {}, Uptime: {}ms, Boot: {}",
                hello.version, hello.uptime_ms, hello.boot_reason
            ),
            Response::ConfigState(config) => write!(
                f,
                "SysEx: CONFIG_STATE - RF Sim: {}, Max Delay: {}ms",
                on_off(config.rf_simulation_enabled),
                config.max_delay_ms
            ),
            Response::RunningState(chunk) => {
                write!(
                    f,
                    "SysEx: RUNNING_STATE - Uptime: {:.1}s, Mesh: {}, Chunk: {}/{}, Receivers: {}/{}",
                    f64::from(chunk.uptime_ms) / 1000.0,
                    if chunk.mesh_synced { "SYNCED" } else { "NOT SYNCED" },
                    u16::from(chunk.chunk_index) + 1,
                    chunk.chunk_count.max(1),
                    chunk.receivers.len(),
                    chunk.total_receivers
                )?;
                if !chunk.receivers.is_empty() {
                    let list: Vec<String> = chunk
                        .receivers
                        .iter()
                        .map(|r| format!("{} v{}({})", r.uuid(), r.version, r.layer))
                        .collect();
                    write!(f, " [{}]", list.join(", "))?;
                }
                Ok(())
            }
            Response::ErrorReport(report) => {
                write!(f, "SysEx: ERROR_REPORT - {}", report.code)?;
                match report.context.len() {
                    0 => Ok(()),
                    6 => write!(
                        f,
                        " MAC: {}",
                        report
                            .context
                            .iter()
                            .map(|b| format!("{:02X}", b))
                            .collect::<Vec<_>>()
                            .join(":")
                    ),
                    _ => write!(f, " Context: {}", hex_dump(&report.context)),
                }
            }
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Command(command) => write!(f, "{}", command),
            Message::Response(response) => write!(f, "{}", response),
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// Describe any frame in one line, whether or not it decodes.
pub fn describe_frame(frame: &[u8]) -> String {
    match Message::decode(frame) {
        Ok(message) => message.to_string(),
        Err(ProtocolError::UnknownCommand(code)) => {
            format!("SysEx: Unknown command 0x{:02X} ({})", code, hex_dump(frame))
        }
        Err(ProtocolError::ForeignManufacturer(_)) => {
            format!("SysEx (Unknown): {}", hex_dump(frame))
        }
        Err(e) => match frame_command(frame) {
            Ok(code) => format!("SysEx (CMD 0x{:02X}) malformed: {} ({})", code, e, hex_dump(frame)),
            Err(_) => format!("Raw: {}", hex_dump(frame)),
        },
    }
}

/// Space-separated upper-case hex (`F0 7D 01 F7`).
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex text into bytes. Whitespace, commas and `0x` prefixes are ignored.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let digits: String = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    hex::decode(&digits).map_err(|e| ProtocolError::InvalidData(format!("invalid hex '{}': {}", text, e)))
}
