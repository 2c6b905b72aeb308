//! Bridge configuration.
//!
//! All durations are stored as integer milliseconds so the configuration reads
//! naturally in YAML. Accessors return [`Duration`]s with limits applied.

use std::path::Path;
use std::time::Duration;

use nowde_protocol::DeviceConfig;
use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Smallest accepted media-sync throttle interval.
pub const MIN_THROTTLE_INTERVAL_MS: u64 = 10;

/// Complete bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Device configuration pushed after every HELLO.
    /// Overwritten by CONFIG_STATE, since the sender is authoritative.
    pub rf_simulation_enabled: bool,

    /// Maximum simulated RF delay (milliseconds, 14-bit on the wire).
    pub rf_simulation_max_delay_ms: u16,

    /// Media-sync throttling and clock correction.
    pub media_sync: MediaSyncConfig,

    /// Interval between QUERY_RUNNING_STATE polls (milliseconds).
    pub running_state_poll_ms: u64,

    /// Receivers whose apparent last-seen age exceeds this are evicted (milliseconds).
    pub receiver_retention_ms: u64,

    /// Firmware transfer pacing.
    pub ota: OtaConfig,

    /// Loop length of the simulation clock (seconds).
    pub simulation_duration_s: f64,

    /// Events held for the application before older ones are discarded.
    pub event_queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            rf_simulation_enabled: false,
            rf_simulation_max_delay_ms: 400,
            media_sync: MediaSyncConfig::default(),
            running_state_poll_ms: 2000,
            receiver_retention_ms: 15 * 60 * 1000,
            ota: OtaConfig::default(),
            simulation_duration_s: 30.0,
            event_queue_capacity: 4096,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self, BridgeError> {
        serde_yaml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Load a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, BridgeError> {
        serde_yaml::to_string(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Device configuration to push to the sender.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            rf_simulation_enabled: self.rf_simulation_enabled,
            max_delay_ms: self.rf_simulation_max_delay_ms,
        }
    }

    /// Replace the device configuration mirror.
    pub fn set_device_config(&mut self, config: DeviceConfig) {
        self.rf_simulation_enabled = config.rf_simulation_enabled;
        self.rf_simulation_max_delay_ms = config.max_delay_ms;
    }

    /// Running-state poll interval.
    pub fn running_state_poll_interval(&self) -> Duration {
        Duration::from_millis(self.running_state_poll_ms.max(1))
    }

    /// Receiver retention ceiling.
    pub fn receiver_retention(&self) -> Duration {
        Duration::from_millis(self.receiver_retention_ms)
    }

    /// Loop length of the simulation clock. Invalid values fall back to 30 s.
    pub fn simulation_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.simulation_duration_s)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(30))
    }

    /// Event queue capacity, at least one.
    pub fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity.max(1)
    }

    /// Set the event queue capacity.
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Set the media-sync throttle interval.
    pub fn with_throttle_interval_ms(mut self, interval_ms: u64) -> Self {
        self.media_sync.throttle_interval_ms = interval_ms;
        self
    }

    /// Set the running-state poll interval.
    pub fn with_running_state_poll_ms(mut self, interval_ms: u64) -> Self {
        self.running_state_poll_ms = interval_ms;
        self
    }

    /// Set the receiver retention ceiling.
    pub fn with_receiver_retention_ms(mut self, retention_ms: u64) -> Self {
        self.receiver_retention_ms = retention_ms;
        self
    }

    /// Set the firmware transfer pacing.
    pub fn with_ota(mut self, ota: OtaConfig) -> Self {
        self.ota = ota;
        self
    }
}

/// Media-sync throttling and clock correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSyncConfig {
    /// Heartbeat interval per layer (milliseconds, at least 10).
    pub throttle_interval_ms: u64,

    /// Frames added to every position to compensate upstream latency.
    /// May be negative.
    pub frame_correction_frames: i32,

    /// Frame rate used to convert the correction to milliseconds.
    pub fps: f64,
}

impl Default for MediaSyncConfig {
    fn default() -> Self {
        MediaSyncConfig {
            throttle_interval_ms: 100,
            frame_correction_frames: 0,
            fps: 30.0,
        }
    }
}

impl MediaSyncConfig {
    /// Throttle interval, clamped to the minimum.
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms.max(MIN_THROTTLE_INTERVAL_MS))
    }
}

/// Firmware transfer pacing.
///
/// There is no acknowledgment per chunk; reliability rests on these delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    /// Raw bytes per OTA_DATA frame.
    pub chunk_size: usize,
    /// Delay after every chunk (milliseconds).
    pub chunk_delay_ms: u64,
    /// A longer pause is taken after every this many chunks.
    pub pause_every: usize,
    /// Length of the longer pause (milliseconds).
    pub pause_delay_ms: u64,
    /// Wait after OTA_BEGIN for the sender to prepare (milliseconds).
    pub prepare_delay_ms: u64,
    /// Wait after the last chunk for the flash write to finish (milliseconds).
    pub flash_settle_delay_ms: u64,
    /// Wait after OTA_END for the sender to reboot and re-enumerate (milliseconds).
    pub reboot_delay_ms: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        OtaConfig {
            chunk_size: 100,
            chunk_delay_ms: 25,
            pause_every: 100,
            pause_delay_ms: 150,
            prepare_delay_ms: 200,
            flash_settle_delay_ms: 2000,
            reboot_delay_ms: 8000,
        }
    }
}

impl OtaConfig {
    /// Same chunking with every delay removed.
    pub fn unpaced() -> Self {
        OtaConfig {
            chunk_delay_ms: 0,
            pause_delay_ms: 0,
            prepare_delay_ms: 0,
            flash_settle_delay_ms: 0,
            reboot_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Chunk size, at least one byte.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Delay to take after sending chunk `index` (zero-based).
    pub fn delay_after_chunk(&self, index: usize) -> Duration {
        if self.pause_every > 0 && (index + 1) % self.pause_every == 0 {
            Duration::from_millis(self.pause_delay_ms)
        } else {
            Duration::from_millis(self.chunk_delay_ms)
        }
    }

    /// Number of OTA_DATA frames for an image of `size` bytes.
    pub fn chunk_count(&self, size: usize) -> usize {
        size.div_ceil(self.chunk_size())
    }

    /// Lower bound on the wall-clock duration of a transfer of `size` bytes.
    pub fn estimated_duration(&self, size: usize) -> Duration {
        let chunks = self.chunk_count(size);
        let paced: Duration = (0..chunks).map(|i| self.delay_after_chunk(i)).sum();
        Duration::from_millis(self.prepare_delay_ms + self.flash_settle_delay_ms) + paced
    }
}
