//! Table of receivers reported by the sender.
//!
//! Receivers are keyed by MAC. A receiver that drops out of a snapshot is not
//! removed straight away: its `last_seen_ms` keeps ageing with local wall-clock
//! time, measured from the moment it was first noticed missing, until it
//! passes the retention ceiling and is evicted.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use nowde_metrics::metric_defs;
use nowde_protocol::{MacAddress, ReceiverRecord};
use tracing::{debug, info};

/// Receivers heard from more recently than this are ACTIVE (if flagged active).
pub const ACTIVE_THRESHOLD_MS: u32 = 3_000;

/// Receivers heard from more recently than this are MISSING rather than GONE.
pub const MISSING_THRESHOLD_MS: u32 = 10_000;

/// Presence of a receiver, derived from its last-seen age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    /// Active and heard from within [`ACTIVE_THRESHOLD_MS`].
    Active,
    /// Heard from within [`MISSING_THRESHOLD_MS`].
    Missing,
    /// Not heard from for longer.
    Gone,
}

impl PresenceStatus {
    /// Classify a receiver record.
    pub fn classify(record: &ReceiverRecord) -> Self {
        if record.active && record.last_seen_ms < ACTIVE_THRESHOLD_MS {
            PresenceStatus::Active
        } else if record.last_seen_ms < MISSING_THRESHOLD_MS {
            PresenceStatus::Missing
        } else {
            PresenceStatus::Gone
        }
    }

    /// Upper-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Active => "ACTIVE",
            PresenceStatus::Missing => "MISSING",
            PresenceStatus::Gone => "GONE",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A receiver and its ageing markers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedReceiver {
    /// Latest record; `last_seen_ms` is advanced locally while missing.
    pub record: ReceiverRecord,
    missing_since: Option<Instant>,
    base_last_seen_ms: u32,
}

impl TrackedReceiver {
    fn new(record: ReceiverRecord) -> Self {
        TrackedReceiver {
            base_last_seen_ms: record.last_seen_ms,
            record,
            missing_since: None,
        }
    }

    /// Presence status.
    pub fn status(&self) -> PresenceStatus {
        PresenceStatus::classify(&self.record)
    }

    /// Whether the receiver was absent from the latest snapshot.
    pub fn is_missing(&self) -> bool {
        self.missing_since.is_some()
    }

    fn age(&mut self, now: Instant) {
        let since = *self.missing_since.get_or_insert_with(|| {
            self.base_last_seen_ms = self.record.last_seen_ms;
            now
        });
        let elapsed_ms = now.saturating_duration_since(since).as_millis();
        let elapsed_ms = u32::try_from(elapsed_ms).unwrap_or(u32::MAX);
        self.record.last_seen_ms = self.base_last_seen_ms.saturating_add(elapsed_ms);
    }
}

/// Known receivers, keyed by MAC.
#[derive(Debug, Clone)]
pub struct ReceiverTable {
    receivers: BTreeMap<MacAddress, TrackedReceiver>,
    retention: Duration,
}

impl ReceiverTable {
    /// Create an empty table with the given retention ceiling.
    pub fn new(retention: Duration) -> Self {
        ReceiverTable {
            receivers: BTreeMap::new(),
            retention,
        }
    }

    /// Apply a complete snapshot. Returns the MACs evicted by it.
    pub fn apply_snapshot(&mut self, receivers: &[ReceiverRecord], now: Instant) -> Vec<MacAddress> {
        let mut present = HashSet::with_capacity(receivers.len());
        for record in receivers {
            present.insert(record.mac);
            if !self.receivers.contains_key(&record.mac) {
                info!("Receiver {} ({}) joined on layer '{}'", record.name(), record.mac, record.layer);
            }
            self.receivers.insert(record.mac, TrackedReceiver::new(record.clone()));
        }

        for (mac, tracked) in self.receivers.iter_mut() {
            if !present.contains(mac) {
                tracked.age(now);
            }
        }

        let retention_ms = u32::try_from(self.retention.as_millis()).unwrap_or(u32::MAX);
        let evicted: Vec<MacAddress> = self
            .receivers
            .iter()
            .filter(|(_, tracked)| tracked.record.last_seen_ms > retention_ms)
            .map(|(mac, _)| *mac)
            .collect();
        for mac in &evicted {
            if let Some(tracked) = self.receivers.remove(mac) {
                debug!(
                    "Receiver {} evicted after {}s unseen",
                    tracked.record.name(),
                    tracked.record.last_seen_ms / 1000
                );
            }
        }

        metrics::gauge!(metric_defs::RECEIVERS_KNOWN.name).set(self.receivers.len() as f64);
        evicted
    }

    /// Forget every receiver.
    pub fn clear(&mut self) {
        self.receivers.clear();
        metrics::gauge!(metric_defs::RECEIVERS_KNOWN.name).set(0.0);
    }

    /// Number of known receivers.
    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Look up a receiver.
    pub fn get(&self, mac: &MacAddress) -> Option<&TrackedReceiver> {
        self.receivers.get(mac)
    }

    /// All receivers, ordered by MAC.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedReceiver> {
        self.receivers.values()
    }

    /// Receivers following `layer`.
    pub fn on_layer<'a>(&'a self, layer: &'a str) -> impl Iterator<Item = &'a TrackedReceiver> + 'a {
        self.receivers.values().filter(move |r| r.record.layer == layer)
    }

    /// Snapshot of the current records, ordered by MAC.
    pub fn records(&self) -> Vec<ReceiverRecord> {
        self.receivers.values().map(|r| r.record.clone()).collect()
    }
}

impl Default for ReceiverTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}
