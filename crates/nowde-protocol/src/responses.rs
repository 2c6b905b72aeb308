//! Messages sent by a Nowde sender to the host.

use crate::commands::require_len;
use crate::constants::*;
use crate::frame::{encode_frame, frame_command, frame_payload};
use crate::sevenbit;
use crate::types::*;
use crate::{Command, DeviceErrorCode, ProtocolError};

/// Messages sent by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Boot announcement, sent on every boot and on QUERY_CONFIG.
    Hello(HelloInfo),
    /// Current device configuration.
    ConfigState(DeviceConfig),
    /// One chunk of the receiver table.
    RunningState(RunningStateChunk),
    /// Device-side error.
    ErrorReport(ErrorReport),
}

/// Either direction of traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A host → sender command.
    Command(Command),
    /// A sender → host response.
    Response(Response),
}

impl Message {
    /// Decode a message from a complete frame.
    ///
    /// IDs below `0x20` are host commands, the rest sender responses; the
    /// band is only used to pick a decoder.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let code = frame_command(frame)?;
        if code < CMD_HELLO {
            Ok(Message::Command(Command::decode(frame)?))
        } else {
            Ok(Message::Response(Response::decode(frame)?))
        }
    }

    /// Tolerant decode: any rejected frame is logged and yields `None`.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        match Message::decode(frame) {
            Ok(message) => Some(message),
            Err(ProtocolError::ForeignManufacturer(id)) => {
                log::trace!("ignoring SysEx for manufacturer 0x{:02X}", id);
                None
            }
            Err(e) => {
                log::debug!("dropping SysEx frame ({} bytes): {}", frame.len(), e);
                None
            }
        }
    }
}

impl Response {
    /// Get the command ID for this response.
    pub fn code(&self) -> u8 {
        match self {
            Response::Hello(_) => CMD_HELLO,
            Response::ConfigState(_) => CMD_CONFIG_STATE,
            Response::RunningState(_) => CMD_RUNNING_STATE,
            Response::ErrorReport(_) => CMD_ERROR_REPORT,
        }
    }

    /// Wire name of the response.
    pub fn name(&self) -> &'static str {
        match self {
            Response::Hello(_) => "HELLO",
            Response::ConfigState(_) => "CONFIG_STATE",
            Response::RunningState(_) => "RUNNING_STATE",
            Response::ErrorReport(_) => "ERROR_REPORT",
        }
    }

    /// Decode a response from a complete frame.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let code = frame_command(frame)?;

        match code {
            CMD_HELLO => Ok(Response::Hello(decode_hello(frame)?)),

            CMD_CONFIG_STATE => {
                require_len(frame, CONFIG_FRAME_SIZE)?;
                let payload = frame_payload(frame);
                Ok(Response::ConfigState(DeviceConfig::from_payload(&[
                    payload[0], payload[1], payload[2],
                ])))
            }

            CMD_RUNNING_STATE => Ok(Response::RunningState(decode_running_state(frame)?)),

            CMD_ERROR_REPORT => Ok(Response::ErrorReport(decode_error_report(frame)?)),

            _ => Err(ProtocolError::UnknownCommand(code)),
        }
    }

    /// Encode the response into a complete frame, as the sender would.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();

        match self {
            Response::Hello(hello) => {
                payload.extend_from_slice(&sevenbit::encode(&encode_text(&hello.version, VERSION_SIZE)));
                payload.extend_from_slice(&sevenbit::encode_u32(hello.uptime_ms));
                payload.push(u8::from(hello.boot_reason) & 0x7F);
            }

            Response::ConfigState(config) => {
                payload.extend_from_slice(&config.to_payload());
            }

            Response::RunningState(chunk) => {
                payload.extend_from_slice(&sevenbit::encode_u32(chunk.uptime_ms));
                payload.push(u8::from(chunk.mesh_synced));
                payload.push(chunk.chunk_index);
                payload.push(chunk.chunk_count);
                payload.push(chunk.total_receivers);
                payload.push(chunk.declared_receivers);
                for record in &chunk.receivers {
                    payload.extend_from_slice(&sevenbit::encode(&record.to_bytes()));
                }
            }

            // The length is a single data byte, so at most 127 context bytes
            // are sent. Context bytes are masked to 7 bits.
            Response::ErrorReport(report) => {
                let context = &report.context[..report.context.len().min(ERROR_REPORT_MAX_CONTEXT)];
                payload.push(u8::from(report.code) & 0x7F);
                payload.push(context.len() as u8);
                payload.extend(context.iter().map(|b| b & 0x7F));
            }
        }

        encode_frame(self.code(), &payload)
    }
}

/// Decode a HELLO frame.
fn decode_hello(frame: &[u8]) -> Result<HelloInfo, ProtocolError> {
    require_len(frame, HELLO_FRAME_SIZE)?;
    let payload = frame_payload(frame);

    let version = sevenbit::decode_exact(&payload[0..10], VERSION_SIZE)?;
    let uptime_ms = sevenbit::decode_u32(&payload[10..15])?;

    Ok(HelloInfo {
        version: decode_text(&version),
        uptime_ms,
        boot_reason: BootReason::from(payload[15]),
    })
}

/// Decode one RUNNING_STATE chunk.
///
/// Only complete receiver records are returned; a trailing partial record is
/// ignored.
fn decode_running_state(frame: &[u8]) -> Result<RunningStateChunk, ProtocolError> {
    require_len(frame, RUNNING_STATE_MIN_FRAME_SIZE)?;
    let payload = frame_payload(frame);

    let uptime_ms = sevenbit::decode_u32(&payload[0..5])?;
    let mesh_synced = payload[5] != 0;
    let chunk_index = payload[6];
    let chunk_count = payload[7];
    let total_receivers = payload[8];
    let declared_receivers = payload[9];

    let mut receivers = Vec::with_capacity(declared_receivers as usize);
    for encoded in payload[10..]
        .chunks_exact(RECEIVER_RECORD_ENCODED_SIZE)
        .take(declared_receivers as usize)
    {
        let raw = match sevenbit::decode_exact(encoded, RECEIVER_RECORD_SIZE) {
            Ok(raw) => raw,
            Err(e) => {
                log::debug!("RUNNING_STATE record decode failed: {}", e);
                break;
            }
        };
        receivers.push(ReceiverRecord::from_bytes(&raw)?);
    }

    if receivers.len() < declared_receivers as usize {
        log::debug!(
            "RUNNING_STATE chunk {} declared {} receivers, decoded {}",
            chunk_index,
            declared_receivers,
            receivers.len()
        );
    }

    Ok(RunningStateChunk {
        uptime_ms,
        mesh_synced,
        chunk_index,
        chunk_count,
        total_receivers,
        declared_receivers,
        receivers,
    })
}

/// Decode an ERROR_REPORT frame.
///
/// A context that runs past the end of the frame is dropped rather than cut.
fn decode_error_report(frame: &[u8]) -> Result<ErrorReport, ProtocolError> {
    require_len(frame, ERROR_REPORT_MIN_FRAME_SIZE)?;
    let payload = frame_payload(frame);

    let code = DeviceErrorCode::from(payload[0]);
    let context_len = payload[1] as usize;
    let context = if context_len > 0 && payload.len() >= 2 + context_len {
        payload[2..2 + context_len].to_vec()
    } else {
        Vec::new()
    };

    Ok(ErrorReport { code, context })
}
