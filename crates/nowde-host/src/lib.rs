//! Nowde Host Bridge
//!
//! Host-side half of the Nowde SysEx control plane. A [`Bridge`] owns one
//! USB-MIDI connection to a sender and keeps everything the host knows about
//! it: the handshake, the configuration mirror, the receiver table rebuilt
//! from chunked RUNNING_STATE replies, per-layer media sync and firmware
//! transfers.
//!
//! # Architecture
//!
//! ```text
//!  application ──BridgeCommand──▶ Bridge ──Command──▶ Transport ──▶ sender
//!       ▲                           │  ▲
//!       └──────BridgeEvent──────────┘  └── Bridge::receive(bytes) ◀── sender
//! ```
//!
//! Background work (media-sync heartbeat, running-state poll, OTA) runs on
//! [`Worker`] threads that can be cancelled promptly.
//!
//! # Example
//!
//! ```rust,ignore
//! use nowde_host::{Bridge, BridgeConfig, MemoryTransport};
//!
//! let transport = MemoryTransport::new(["Nowde Sender"]);
//! let bridge = Bridge::new(transport, BridgeConfig::default());
//! bridge.connect("Nowde Sender")?;
//! for event in bridge.events().try_iter() {
//!     println!("{:?}", event);
//! }
//! ```

mod bridge;
mod config;
mod error;
mod handshake;
mod layers;
mod media_sync;
mod ota;
mod receivers;
mod running_state;
mod simulation;
mod transport;
mod workers;

pub use bridge::*;
pub use config::*;
pub use error::*;
pub use handshake::*;
pub use layers::*;
pub use media_sync::*;
pub use ota::*;
pub use receivers::*;
pub use running_state::*;
pub use simulation::*;
pub use transport::*;
pub use workers::*;
