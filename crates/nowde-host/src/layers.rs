//! Playback state of show-control layers.
//!
//! Layer events arrive as `(layer, route, args)` tuples from whatever receives
//! them upstream. Only the three media routes below change state; anything
//! else is ignored.

use std::collections::BTreeMap;

use nowde_protocol::PlaybackState;
use tracing::trace;

/// Position update: `(position_s, duration_s)`.
pub const ROUTE_MEDIA_TIME: &str = "/media/time";
/// Media started: `(index, filename, duration_s)`.
pub const ROUTE_MEDIA_STARTED: &str = "/mediaStarted";
/// Media stopped: `(index, filename, duration_s)`.
pub const ROUTE_MEDIA_STOPPED: &str = "/mediaStopped";

/// One argument of a layer event.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerArg {
    /// Integer argument.
    Int(i64),
    /// Floating-point argument.
    Float(f64),
    /// Text argument.
    Str(String),
}

impl LayerArg {
    /// Numeric value, if the argument is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LayerArg::Int(v) => Some(*v as f64),
            LayerArg::Float(v) => Some(*v),
            LayerArg::Str(_) => None,
        }
    }

    /// Text form of the argument.
    pub fn as_text(&self) -> String {
        match self {
            LayerArg::Int(v) => v.to_string(),
            LayerArg::Float(v) => v.to_string(),
            LayerArg::Str(s) => s.clone(),
        }
    }
}

impl From<i64> for LayerArg {
    fn from(v: i64) -> Self {
        LayerArg::Int(v)
    }
}

impl From<f64> for LayerArg {
    fn from(v: f64) -> Self {
        LayerArg::Float(v)
    }
}

impl From<&str> for LayerArg {
    fn from(v: &str) -> Self {
        LayerArg::Str(v.to_string())
    }
}

/// Playback state of one layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerPlayback {
    /// Current media filename (empty when none).
    pub filename: String,
    /// Position in seconds.
    pub position_s: f64,
    /// Duration in seconds.
    pub duration_s: f64,
    /// Playback state.
    pub state: PlaybackState,
}

impl LayerPlayback {
    /// Whether this state should be forwarded: playing a known file, or stopped.
    pub fn is_sendable(&self) -> bool {
        match self.state {
            PlaybackState::Playing => !self.filename.is_empty(),
            PlaybackState::Stopped => true,
        }
    }
}

/// Playback state for every layer seen.
#[derive(Debug, Clone, Default)]
pub struct LayerTracker {
    layers: BTreeMap<String, LayerPlayback>,
}

impl LayerTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Returns the layer's state if the route was recognised.
    pub fn apply(&mut self, layer: &str, route: &str, args: &[LayerArg]) -> Option<&LayerPlayback> {
        let update = match route {
            ROUTE_MEDIA_TIME if args.len() >= 2 => {
                Update::Time(args[0].as_f64()?, args[1].as_f64()?)
            }
            ROUTE_MEDIA_STARTED if args.len() >= 2 => {
                let duration = match args.get(2) {
                    Some(arg) => arg.as_f64()?,
                    None => 0.0,
                };
                Update::Started(args[1].as_text(), duration)
            }
            ROUTE_MEDIA_STOPPED if args.len() >= 2 => Update::Stopped(args[1].as_text()),
            _ => return None,
        };

        let playback = self.layers.entry(layer.to_string()).or_default();
        match update {
            Update::Time(position_s, duration_s) => {
                playback.position_s = position_s;
                playback.duration_s = duration_s;
                if !playback.filename.is_empty() {
                    playback.state = PlaybackState::Playing;
                }
            }
            Update::Started(filename, duration_s) => {
                trace!("Layer '{}' started '{}'", layer, filename);
                playback.filename = filename;
                playback.duration_s = duration_s;
                playback.position_s = 0.0;
                playback.state = PlaybackState::Playing;
            }
            Update::Stopped(filename) => {
                // A stop for a file other than the current one is stale.
                if playback.filename.is_empty() || playback.filename == filename {
                    trace!("Layer '{}' stopped", layer);
                    *playback = LayerPlayback::default();
                } else {
                    trace!("Layer '{}' ignored stale stop for '{}'", layer, filename);
                }
            }
        }
        Some(playback)
    }

    /// State of one layer.
    pub fn get(&self, layer: &str) -> Option<&LayerPlayback> {
        self.layers.get(layer)
    }

    /// Every layer and its state.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &LayerPlayback)> {
        self.layers.iter()
    }
}

enum Update {
    Time(f64, f64),
    Started(String, f64),
    Stopped(String),
}
