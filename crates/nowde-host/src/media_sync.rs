//! Per-layer MEDIA_SYNC throttling.
//!
//! Each layer is sent on two triggers: immediately when its media index
//! changes, and as a heartbeat once the throttle interval has elapsed since
//! the last send. Positions are shifted by a frame-count correction before
//! they go on the wire.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use nowde_metrics::metric_defs;
use nowde_protocol::{Command, PlaybackState, MAX_MEDIA_INDEX};
use tracing::trace;

use crate::config::{MediaSyncConfig, MIN_THROTTLE_INTERVAL_MS};

/// Media index encoded in a filename: 1 to 3 leading digits followed by `_`.
///
/// `"042_intro.mp4"` is 42, `"intro.mp4"` is 0, `"999_x.mp4"` is clamped to 127.
pub fn parse_media_index(filename: &str) -> u8 {
    let digits = filename.bytes().take_while(u8::is_ascii_digit).count();
    if !(1..=3).contains(&digits) || filename.as_bytes().get(digits) != Some(&b'_') {
        return 0;
    }
    filename[..digits]
        .parse::<u16>()
        .map(|index| index.clamp(1, u16::from(MAX_MEDIA_INDEX)) as u8)
        .unwrap_or(0)
}

/// Last known state of one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSyncState {
    /// Media index (0 when stopped).
    pub media_index: u8,
    /// Playback position in seconds.
    pub position_s: f64,
    /// Media duration in seconds.
    pub duration_s: f64,
    /// Playback state.
    pub state: PlaybackState,
    last_sent_at: Option<Instant>,
    last_sent_index: Option<u8>,
}

impl LayerSyncState {
    fn new() -> Self {
        LayerSyncState {
            media_index: 0,
            position_s: 0.0,
            duration_s: 0.0,
            state: PlaybackState::Stopped,
            last_sent_at: None,
            last_sent_index: None,
        }
    }

    /// When MEDIA_SYNC was last emitted for this layer.
    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    /// Media index carried by the last MEDIA_SYNC for this layer.
    pub fn last_sent_index(&self) -> Option<u8> {
        self.last_sent_index
    }

    fn is_due(&self, now: Instant, interval: Duration) -> bool {
        if self.last_sent_index != Some(self.media_index) {
            return true;
        }
        match self.last_sent_at {
            Some(at) => now.saturating_duration_since(at) >= interval,
            None => true,
        }
    }
}

/// Decides when each layer needs a MEDIA_SYNC.
#[derive(Debug, Clone)]
pub struct MediaSyncEngine {
    layers: BTreeMap<String, LayerSyncState>,
    throttle_interval: Duration,
    frame_correction_frames: i32,
    fps: f64,
}

impl Default for MediaSyncEngine {
    fn default() -> Self {
        Self::new(&MediaSyncConfig::default())
    }
}

impl MediaSyncEngine {
    /// Create an engine with no tracked layers.
    pub fn new(config: &MediaSyncConfig) -> Self {
        MediaSyncEngine {
            layers: BTreeMap::new(),
            throttle_interval: config.throttle_interval(),
            frame_correction_frames: config.frame_correction_frames,
            fps: config.fps,
        }
    }

    /// Record a layer update from a filename. Returns the MEDIA_SYNC to send, if any.
    pub fn update(
        &mut self,
        layer: &str,
        filename: &str,
        position_s: f64,
        duration_s: f64,
        state: PlaybackState,
        now: Instant,
    ) -> Option<Command> {
        let media_index = match state {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => parse_media_index(filename),
        };
        self.update_index(layer, media_index, position_s, duration_s, state, now)
    }

    /// Record a layer update with an explicit media index.
    pub fn update_index(
        &mut self,
        layer: &str,
        media_index: u8,
        position_s: f64,
        duration_s: f64,
        state: PlaybackState,
        now: Instant,
    ) -> Option<Command> {
        let media_index = match state {
            PlaybackState::Stopped => 0,
            PlaybackState::Playing => media_index.min(MAX_MEDIA_INDEX),
        };
        let entry = self
            .layers
            .entry(layer.to_string())
            .or_insert_with(LayerSyncState::new);
        entry.media_index = media_index;
        entry.position_s = position_s;
        entry.duration_s = duration_s;
        entry.state = state;

        if !entry.is_due(now, self.throttle_interval) {
            return None;
        }
        entry.last_sent_at = Some(now);
        entry.last_sent_index = Some(media_index);

        let position_ms = self.corrected_position_ms(position_s);
        trace!(
            "MEDIA_SYNC due for layer '{}': index {}, {}ms, {}",
            layer,
            media_index,
            position_ms,
            state.as_str()
        );
        metrics::counter!(metric_defs::MEDIA_SYNC_SENT.name, "layer" => layer.to_string()).increment(1);
        Some(Command::MediaSync {
            layer: layer.to_string(),
            media_index,
            position_ms,
            state,
        })
    }

    /// Re-evaluate a tracked layer with its last known state.
    pub fn refresh(&mut self, layer: &str, now: Instant) -> Option<Command> {
        let current = self.layers.get(layer)?;
        let (index, position_s, duration_s, state) =
            (current.media_index, current.position_s, current.duration_s, current.state);
        self.update_index(layer, index, position_s, duration_s, state, now)
    }

    /// Position in milliseconds with the frame correction applied, floored at 0.
    pub fn corrected_position_ms(&self, position_s: f64) -> u32 {
        let position_ms = (position_s * 1000.0) as i64;
        let correction_ms = if self.fps > 0.0 {
            (f64::from(self.frame_correction_frames) / self.fps * 1000.0) as i64
        } else {
            0
        };
        (position_ms + correction_ms).clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Change the heartbeat interval. Values under 10 ms are raised to 10 ms.
    pub fn set_throttle_interval(&mut self, interval: Duration) {
        self.throttle_interval = interval.max(Duration::from_millis(MIN_THROTTLE_INTERVAL_MS));
    }

    /// Current heartbeat interval.
    pub fn throttle_interval(&self) -> Duration {
        self.throttle_interval
    }

    /// Change the frame correction.
    pub fn set_frame_correction(&mut self, frames: i32, fps: f64) {
        self.frame_correction_frames = frames;
        self.fps = fps;
    }

    /// State of one layer.
    pub fn layer(&self, name: &str) -> Option<&LayerSyncState> {
        self.layers.get(name)
    }

    /// Names of all tracked layers.
    pub fn layer_names(&self) -> Vec<String> {
        self.layers.keys().cloned().collect()
    }
}
