//! Reassembly of chunked RUNNING_STATE snapshots.
//!
//! The sender splits its receiver table across several RUNNING_STATE frames.
//! Chunks can be lost or arrive out of order, so a session is kept per snapshot
//! cycle and thrown away whenever the incoming chunks stop agreeing with it.
//! A chunk 0 starts a new cycle unless the open session is still waiting for
//! its own chunk 0, so a session may complete in any arrival order.
//! There is no background timer: staleness is only checked when a chunk arrives.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use nowde_metrics::metric_defs;
use nowde_protocol::{ReceiverRecord, RunningStateChunk};
use tracing::{debug, trace};

/// A session with no chunk for longer than this is discarded.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// A complete receiver table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStateSnapshot {
    /// Sender uptime in milliseconds.
    pub uptime_ms: u32,
    /// Whether the mesh clock is synchronized.
    pub mesh_synced: bool,
    /// Receiver count declared by the sender.
    pub total_receivers: u8,
    /// Receivers in chunk-index order.
    pub receivers: Vec<ReceiverRecord>,
}

impl RunningStateSnapshot {
    /// Sender uptime in seconds.
    pub fn uptime_s(&self) -> f64 {
        f64::from(self.uptime_ms) / 1000.0
    }
}

/// Why a partially collected session was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    /// Chunk 0 arrived while the session already held one.
    NewCycle,
    /// No chunk arrived within [`SESSION_TIMEOUT`].
    Stale,
    /// Chunk count or receiver total disagreed with the session.
    Mismatch,
}

impl ResetReason {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResetReason::NewCycle => "new_cycle",
            ResetReason::Stale => "stale",
            ResetReason::Mismatch => "mismatch",
        }
    }
}

#[derive(Debug)]
struct Session {
    chunk_count: u8,
    total_receivers: u8,
    chunks: BTreeMap<u8, Vec<ReceiverRecord>>,
    last_activity: Instant,
    uptime_ms: u32,
    mesh_synced: bool,
}

impl Session {
    fn new(chunk_count: u8, total_receivers: u8, now: Instant) -> Self {
        Session {
            chunk_count,
            total_receivers,
            chunks: BTreeMap::new(),
            last_activity: now,
            uptime_ms: 0,
            mesh_synced: false,
        }
    }

    fn into_snapshot(mut self) -> RunningStateSnapshot {
        let receivers = (0..self.chunk_count)
            .flat_map(|index| self.chunks.remove(&index).unwrap_or_default())
            .collect();
        RunningStateSnapshot {
            uptime_ms: self.uptime_ms,
            mesh_synced: self.mesh_synced,
            total_receivers: self.total_receivers,
            receivers,
        }
    }
}

/// Collects RUNNING_STATE chunks into complete snapshots.
#[derive(Debug)]
pub struct RunningStateAggregator {
    session: Option<Session>,
    timeout: Duration,
    resets: u64,
}

impl Default for RunningStateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStateAggregator {
    /// Create an idle aggregator with the standard staleness window.
    pub fn new() -> Self {
        Self::with_timeout(SESSION_TIMEOUT)
    }

    /// Create an idle aggregator with a custom staleness window.
    pub fn with_timeout(timeout: Duration) -> Self {
        RunningStateAggregator {
            session: None,
            timeout,
            resets: 0,
        }
    }

    /// Whether a session is being collected.
    pub fn is_collecting(&self) -> bool {
        self.session.is_some()
    }

    /// Chunk indices collected by the open session.
    pub fn received_chunks(&self) -> Vec<u8> {
        self.session
            .as_ref()
            .map(|s| s.chunks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Number of sessions discarded so far.
    pub fn reset_count(&self) -> u64 {
        self.resets
    }

    /// Drop any partial session.
    pub fn clear(&mut self) {
        self.session = None;
    }

    /// Add a chunk. Returns the snapshot once every chunk of a session is present.
    pub fn ingest(&mut self, chunk: RunningStateChunk, now: Instant) -> Option<RunningStateSnapshot> {
        let chunk_count = chunk.chunk_count.max(1);
        let mut index = chunk.chunk_index;

        if let Some(reason) = self.reset_reason(&chunk, chunk_count, now) {
            if reason == ResetReason::Mismatch {
                index = 0;
            }
            self.discard(reason);
        }

        if index >= chunk_count {
            trace!(
                "RUNNING_STATE chunk index {} clamped to {}",
                index,
                chunk_count - 1
            );
            index = chunk_count - 1;
        }

        let session = self
            .session
            .get_or_insert_with(|| Session::new(chunk_count, chunk.total_receivers, now));
        session.chunks.insert(index, chunk.receivers);
        session.last_activity = now;
        session.uptime_ms = chunk.uptime_ms;
        session.mesh_synced = chunk.mesh_synced;

        trace!(
            "RUNNING_STATE chunk {}/{} stored ({} of {} received)",
            index + 1,
            session.chunk_count,
            session.chunks.len(),
            session.chunk_count
        );

        if session.chunks.len() < session.chunk_count as usize {
            return None;
        }

        let snapshot = self.session.take().map(Session::into_snapshot)?;
        metrics::counter!(metric_defs::RUNNING_STATE_SNAPSHOTS.name).increment(1);
        debug!(
            "RUNNING_STATE complete: {} receivers (declared {}), mesh {}",
            snapshot.receivers.len(),
            snapshot.total_receivers,
            if snapshot.mesh_synced { "synced" } else { "not synced" }
        );
        Some(snapshot)
    }

    fn reset_reason(&self, chunk: &RunningStateChunk, chunk_count: u8, now: Instant) -> Option<ResetReason> {
        let session = self.session.as_ref()?;
        if chunk.chunk_index == 0 && session.chunks.contains_key(&0) {
            Some(ResetReason::NewCycle)
        } else if session.chunk_count != chunk_count || session.total_receivers != chunk.total_receivers {
            // Checked before staleness so a mismatched chunk always restarts at index 0.
            Some(ResetReason::Mismatch)
        } else if now.saturating_duration_since(session.last_activity) > self.timeout {
            Some(ResetReason::Stale)
        } else {
            None
        }
    }

    fn discard(&mut self, reason: ResetReason) {
        if let Some(session) = self.session.take() {
            self.resets += 1;
            metrics::counter!(metric_defs::RUNNING_STATE_RESETS.name, "reason" => reason.as_str())
                .increment(1);
            debug!(
                "RUNNING_STATE session reset ({}), dropped {} of {} chunks",
                reason.as_str(),
                session.chunks.len(),
                session.chunk_count
            );
        }
    }
}
