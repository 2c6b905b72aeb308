//! Frame extraction and construction.
//!
//! Every message is a SysEx frame carrying the Nowde manufacturer ID:
//!
//! ```text
//! +------+------+-----+-------------+------+
//! | 0xF0 | 0x7D | CMD | payload ... | 0xF7 |
//! +------+------+-----+-------------+------+
//! ```
//!
//! The incoming MIDI stream may interleave unrelated messages and is chunked
//! arbitrarily by the transport, so the framer is permissive: a
//! start byte always begins a new frame, bytes outside a frame are ignored, and
//! nothing is ever treated as an error.

use std::collections::VecDeque;

use bytes::BytesMut;

use crate::constants::*;
use crate::ProtocolError;

/// Extracts complete `F0 … F7` frames from a byte stream.
#[derive(Debug, Default)]
pub struct SysExFramer {
    /// Whether a start byte has been seen without a matching end byte.
    in_frame: bool,
    /// Bytes of the frame in progress, start byte included.
    buffer: BytesMut,
    /// Completed frames not yet taken by [`SysExFramer::decode`].
    ready: VecDeque<Vec<u8>>,
}

impl SysExFramer {
    /// Create a new framer.
    pub fn new() -> Self {
        SysExFramer {
            in_frame: false,
            buffer: BytesMut::with_capacity(256),
            ready: VecDeque::new(),
        }
    }

    /// Feed received bytes.
    pub fn push(&mut self, data: &[u8]) {
        for &byte in data {
            self.push_byte(byte);
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if byte == SYSEX_START {
            if self.in_frame {
                log::trace!("SysEx start inside frame, dropping {} buffered bytes", self.buffer.len());
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&[byte]);
            self.in_frame = true;
            return;
        }

        if !self.in_frame {
            return;
        }

        self.buffer.extend_from_slice(&[byte]);

        if byte == SYSEX_END {
            let frame = self.buffer.split().to_vec();
            self.ready.push_back(frame);
            self.in_frame = false;
        } else if self.buffer.len() > MAX_FRAME_SIZE {
            log::debug!("SysEx frame exceeded {} bytes, abandoning", MAX_FRAME_SIZE);
            self.buffer.clear();
            self.in_frame = false;
        }
    }

    /// Take the next complete frame, delimiters included.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        self.ready.pop_front()
    }

    /// Whether a frame is partially received.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Get the number of bytes of the frame in progress.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop the frame in progress and any frames not yet taken.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.ready.clear();
        self.in_frame = false;
    }
}

/// Wrap a command ID and payload into a complete frame.
pub fn encode_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.iter().all(|b| *b < 0x80), "SysEx payload byte above 0x7F");
    let mut buf = Vec::with_capacity(MIN_FRAME_SIZE + payload.len());
    buf.push(SYSEX_START);
    buf.push(MANUFACTURER_ID);
    buf.push(command);
    buf.extend_from_slice(payload);
    buf.push(SYSEX_END);
    buf
}

/// Validate a frame's delimiters and manufacturer ID, returning its command ID.
pub fn frame_command(frame: &[u8]) -> Result<u8, ProtocolError> {
    if frame.len() < MIN_FRAME_SIZE {
        return Err(ProtocolError::FrameTooShort {
            expected: MIN_FRAME_SIZE,
            actual: frame.len(),
        });
    }
    if frame[0] != SYSEX_START || frame[frame.len() - 1] != SYSEX_END {
        return Err(ProtocolError::NotSysEx);
    }
    if frame[1] != MANUFACTURER_ID {
        return Err(ProtocolError::ForeignManufacturer(frame[1]));
    }
    Ok(frame[2])
}

/// Payload of a validated frame (between the command ID and the end byte).
pub fn frame_payload(frame: &[u8]) -> &[u8] {
    if frame.len() < MIN_FRAME_SIZE {
        return &[];
    }
    &frame[HEADER_SIZE..frame.len() - 1]
}
