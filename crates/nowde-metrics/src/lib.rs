//! Metric declarations for the Nowde bridge.
//!
//! Every metric the host emits is declared once here as a [`Metric`] constant,
//! so names never drift between the emitting code and whatever recorder the
//! application installs. The crate re-exports `metrics` for convenience.
//!
//! # Example
//!
//! ```rust,ignore
//! use nowde_metrics::{describe_metrics, metric_defs};
//!
//! // Register descriptions once at startup
//! describe_metrics();
//!
//! metrics::counter!(metric_defs::SYSEX_TX_FRAMES.name).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A value that can go up and down.
    Gauge,
    /// A distribution of samples.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use nowde_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("nowde.example.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count);
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "nowde.sysex.tx_frames").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declares a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declares a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declares a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the bridge.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // SysEx Link
    // ========================================================================

    /// Frames written to the transport.
    ///
    /// Labels: command
    pub const SYSEX_TX_FRAMES: Metric = Metric::counter("nowde.sysex.tx_frames")
        .with_description("SysEx frames written to the transport")
        .with_unit(Unit::Count)
        .with_labels(&["command"]);

    /// Frames decoded from the transport.
    ///
    /// Labels: command
    pub const SYSEX_RX_FRAMES: Metric = Metric::counter("nowde.sysex.rx_frames")
        .with_description("SysEx frames decoded from the transport")
        .with_unit(Unit::Count)
        .with_labels(&["command"]);

    /// Frames discarded as foreign, truncated or unknown.
    pub const SYSEX_DROPPED_FRAMES: Metric = Metric::counter("nowde.sysex.dropped_frames")
        .with_description("SysEx frames discarded by the decoder")
        .with_unit(Unit::Count);

    /// Bridge events discarded because the application did not drain the queue.
    pub const EVENTS_DROPPED: Metric = Metric::counter("nowde.events.dropped")
        .with_description("Bridge events discarded from a full event queue")
        .with_unit(Unit::Count);

    /// Transport write failures.
    pub const SYSEX_TX_ERRORS: Metric = Metric::counter("nowde.sysex.tx_errors")
        .with_description("Failed transport writes")
        .with_unit(Unit::Count);

    // ========================================================================
    // Running State
    // ========================================================================

    /// Complete receiver snapshots delivered.
    pub const RUNNING_STATE_SNAPSHOTS: Metric = Metric::counter("nowde.running_state.snapshots")
        .with_description("Complete running-state snapshots reassembled")
        .with_unit(Unit::Count);

    /// Reassembly sessions discarded.
    ///
    /// Labels: reason
    pub const RUNNING_STATE_RESETS: Metric = Metric::counter("nowde.running_state.resets")
        .with_description("Partial running-state sessions discarded")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Receivers currently tracked.
    pub const RECEIVERS_KNOWN: Metric = Metric::gauge("nowde.receivers.known")
        .with_description("Receivers currently held in the receiver table")
        .with_unit(Unit::Count);

    // ========================================================================
    // Media Sync
    // ========================================================================

    /// MEDIA_SYNC frames emitted.
    ///
    /// Labels: layer
    pub const MEDIA_SYNC_SENT: Metric = Metric::counter("nowde.media_sync.sent")
        .with_description("MEDIA_SYNC frames emitted")
        .with_unit(Unit::Count)
        .with_labels(&["layer"]);

    // ========================================================================
    // Firmware Transfer
    // ========================================================================

    /// Firmware bytes pushed.
    pub const OTA_BYTES_SENT: Metric = Metric::counter("nowde.ota.bytes_sent")
        .with_description("Firmware bytes pushed over SysEx")
        .with_unit(Unit::Bytes);

    /// Duration of completed firmware transfers.
    pub const OTA_DURATION: Metric = Metric::histogram("nowde.ota.duration_seconds")
        .with_description("Wall-clock duration of firmware transfers")
        .with_unit(Unit::Seconds);

    /// Every declared metric.
    pub const ALL: &[Metric] = &[
        SYSEX_TX_FRAMES,
        SYSEX_RX_FRAMES,
        SYSEX_DROPPED_FRAMES,
        SYSEX_TX_ERRORS,
        EVENTS_DROPPED,
        RUNNING_STATE_SNAPSHOTS,
        RUNNING_STATE_RESETS,
        RECEIVERS_KNOWN,
        MEDIA_SYNC_SENT,
        OTA_BYTES_SENT,
        OTA_DURATION,
    ];
}

/// Registers descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let mut seen = HashSet::new();
        for metric in metric_defs::ALL {
            assert!(seen.insert(metric.name), "duplicate metric {}", metric.name);
            assert!(metric.name.starts_with("nowde."));
            assert!(!metric.description.is_empty());
        }
    }

    #[test]
    fn test_metric_kinds() {
        assert_eq!(metric_defs::RECEIVERS_KNOWN.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::OTA_DURATION.kind.as_str(), "histogram");
        assert_eq!(metric_defs::MEDIA_SYNC_SENT.labels, &["layer"]);
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing is a no-op and must not panic.
        describe_metrics();
    }
}
