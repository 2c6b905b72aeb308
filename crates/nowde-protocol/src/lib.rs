//! Nowde SysEx Control Protocol
//!
//! This crate provides types and utilities for talking to a Nowde sender over a
//! USB-MIDI link. Every message is a MIDI System Exclusive frame carrying the
//! non-commercial manufacturer ID `0x7D`, followed by a command byte and a
//! payload that never uses the high bit of a data byte.
//!
//! # Protocol Overview
//!
//! ```text
//! +------+------+-----+----------------------+------+
//! | 0xF0 | 0x7D | CMD | payload (0x00..0x7F) | 0xF7 |
//! +------+------+-----+----------------------+------+
//! ```
//!
//! Command IDs are grouped by direction:
//!
//! - **0x01-0x0F**: host → sender (handled by the sender itself)
//! - **0x10-0x1F**: host → sender, relayed to the mesh
//! - **0x20-0x2F**: sender → host responses
//! - **0x30-0x3F**: sender → host error reports
//!
//! Multi-byte binary fields are packed with the [`sevenbit`] codec.
//!
//! # Example
//!
//! ```rust,ignore
//! use nowde_protocol::{Command, Message, SysExFramer};
//!
//! // Build a command
//! let frame = Command::QueryRunningState.encode();
//!
//! // Parse incoming bytes
//! let mut framer = SysExFramer::new();
//! framer.push(&received_bytes);
//! while let Some(frame) = framer.decode() {
//!     let message = Message::decode(&frame)?;
//! }
//! ```

mod commands;
mod constants;
mod error;
mod format;
mod frame;
mod responses;
pub mod sevenbit;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use format::*;
pub use frame::*;
pub use responses::*;
pub use types::*;
