//! 7-bit safe packing of arbitrary bytes.
//!
//! SysEx data bytes must stay below `0x80`. Raw bytes are packed in groups of
//! up to seven: one header byte whose bit *i* holds the high bit of group
//! member *i*, followed by the low seven bits of each member.
//!
//! ```text
//! +---------+---------+---------+-----+---------+
//! | msbs    | b0&0x7F | b1&0x7F | ... | b6&0x7F |
//! +---------+---------+---------+-----+---------+
//! ```
//!
//! A trailing partial group is encoded the same way with fewer members, so
//! `n` raw bytes occupy `n + ceil(n / 7)` encoded bytes.

use crate::ProtocolError;

/// Number of raw bytes covered by one header byte.
pub const GROUP_SIZE: usize = 7;

/// Encoded length of `raw_len` raw bytes.
pub const fn encoded_len(raw_len: usize) -> usize {
    raw_len + (raw_len + GROUP_SIZE - 1) / GROUP_SIZE
}

/// Raw length carried by `encoded_len` well-formed encoded bytes.
pub const fn decoded_len(encoded_len: usize) -> usize {
    let full = encoded_len / (GROUP_SIZE + 1);
    let rem = encoded_len % (GROUP_SIZE + 1);
    full * GROUP_SIZE + rem.saturating_sub(1)
}

/// Output of [`decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Bytes recovered from the input.
    pub bytes: Vec<u8>,
    /// The input ended before a group was complete: either a header byte
    /// with no members, or header bits set for members that never arrived.
    pub truncated: bool,
}

/// Pack raw bytes into a 7-bit safe sequence.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(data.len()));
    for group in data.chunks(GROUP_SIZE) {
        let msbs = group
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, b)| acc | ((b >> 7) << i));
        out.push(msbs);
        out.extend(group.iter().map(|b| b & 0x7F));
    }
    out
}

/// Unpack a 7-bit sequence.
///
/// Never fails: malformed input yields as many bytes as can be recovered
/// and sets [`Decoded::truncated`].
pub fn decode(data: &[u8]) -> Decoded {
    let mut decoded = Decoded {
        bytes: Vec::with_capacity(decoded_len(data.len())),
        truncated: false,
    };

    for group in data.chunks(GROUP_SIZE + 1) {
        let msbs = group[0] & 0x7F;
        let members = &group[1..];
        if members.is_empty() {
            decoded.truncated = true;
            break;
        }
        for (i, b) in members.iter().enumerate() {
            decoded.bytes.push((b & 0x7F) | (((msbs >> i) & 0x01) << 7));
        }
        if members.len() < GROUP_SIZE && (msbs >> members.len()) != 0 {
            decoded.truncated = true;
        }
    }

    decoded
}

/// Unpack exactly `len` raw bytes from the start of `data`.
///
/// Extra decoded bytes are discarded; too few is a
/// [`ProtocolError::TruncatedEncoding`].
pub fn decode_exact(data: &[u8], len: usize) -> Result<Vec<u8>, ProtocolError> {
    let take = encoded_len(len).min(data.len());
    let mut bytes = decode(&data[..take]).bytes;
    if bytes.len() < len {
        return Err(ProtocolError::TruncatedEncoding {
            expected: len,
            actual: bytes.len(),
        });
    }
    bytes.truncate(len);
    Ok(bytes)
}

/// Encode a `u32` as four big-endian bytes, 7-bit packed.
pub fn encode_u32(value: u32) -> Vec<u8> {
    encode(&value.to_be_bytes())
}

/// Decode a big-endian `u32` packed by [`encode_u32`].
pub fn decode_u32(data: &[u8]) -> Result<u32, ProtocolError> {
    let bytes = decode_exact(data, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
