//! Receiver simulation.
//!
//! A receiver can be driven from a local looping clock instead of the real
//! show-control feed. While any receiver on a layer is simulated, real updates
//! for that layer are discarded.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nowde_protocol::{Command, MacAddress, PlaybackState, ProtocolError};
use tracing::info;

use crate::receivers::{ReceiverTable, MISSING_THRESHOLD_MS};

/// Highest media index a simulated receiver can play.
pub const MAX_SIMULATED_MEDIA: u8 = 10;

/// Simulation mode of one receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    /// Follow the real feed.
    #[default]
    Disabled,
    /// Hold the layer stopped.
    Stop,
    /// Play media 1 to 10 from the simulation clock.
    Media(u8),
}

impl SimulationMode {
    /// Index and state sent for this mode, or None when disabled.
    pub fn media(&self) -> Option<(u8, PlaybackState)> {
        match self {
            SimulationMode::Disabled => None,
            SimulationMode::Stop => Some((0, PlaybackState::Stopped)),
            SimulationMode::Media(index) => Some((*index, PlaybackState::Playing)),
        }
    }
}

impl std::fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulationMode::Disabled => write!(f, "Disabled"),
            SimulationMode::Stop => write!(f, "Stop"),
            SimulationMode::Media(index) => write!(f, "{}", index),
        }
    }
}

impl std::str::FromStr for SimulationMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            m if m.eq_ignore_ascii_case("disabled") => Ok(SimulationMode::Disabled),
            m if m.eq_ignore_ascii_case("stop") => Ok(SimulationMode::Stop),
            m => match m.parse::<u8>() {
                Ok(index) if (1..=MAX_SIMULATED_MEDIA).contains(&index) => Ok(SimulationMode::Media(index)),
                _ => Err(ProtocolError::InvalidData(format!("invalid simulation mode: {}", s))),
            },
        }
    }
}

/// Looping clock and per-receiver simulation modes.
#[derive(Debug, Clone)]
pub struct Simulation {
    modes: HashMap<MacAddress, SimulationMode>,
    duration: Duration,
    position: Duration,
    last_tick: Option<Instant>,
}

impl Simulation {
    /// Create a simulation whose clock loops every `duration`.
    pub fn new(duration: Duration) -> Self {
        Simulation {
            modes: HashMap::new(),
            duration,
            position: Duration::ZERO,
            last_tick: None,
        }
    }

    /// Set a receiver's mode. The clock restarts when the first receiver is enabled.
    pub fn set_mode(&mut self, mac: MacAddress, mode: SimulationMode) {
        let was_running = self.is_running();
        if mode == SimulationMode::Disabled {
            self.modes.remove(&mac);
        } else {
            self.modes.insert(mac, mode);
        }
        info!("Simulation for {}: {}", mac.uuid(), mode);

        match (was_running, self.is_running()) {
            (false, true) => {
                info!("Simulation clock started");
                self.position = Duration::ZERO;
                self.last_tick = None;
            }
            (true, false) => info!("Simulation clock stopped"),
            _ => {}
        }
    }

    /// Mode of a receiver.
    pub fn mode(&self, mac: &MacAddress) -> SimulationMode {
        self.modes.get(mac).copied().unwrap_or_default()
    }

    /// Whether any receiver is simulated.
    pub fn is_running(&self) -> bool {
        !self.modes.is_empty()
    }

    /// Whether a known receiver on `layer` is simulated.
    pub fn is_layer_simulated(&self, layer: &str, table: &ReceiverTable) -> bool {
        self.is_running()
            && table
                .on_layer(layer)
                .any(|r| self.mode(&r.record.mac) != SimulationMode::Disabled)
    }

    /// Current clock position.
    pub fn position(&self) -> Duration {
        self.position
    }

    /// Loop length of the clock.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Advance the clock to `now`, wrapping to zero at the end of the loop.
    pub fn advance(&mut self, now: Instant) -> Duration {
        if let Some(last) = self.last_tick {
            self.position += now.saturating_duration_since(last);
            if self.position >= self.duration {
                self.position = Duration::ZERO;
            }
        }
        self.last_tick = Some(now);
        self.position
    }

    /// MEDIA_SYNC commands for every simulated receiver that is still reachable.
    pub fn sync_commands(&self, table: &ReceiverTable) -> Vec<Command> {
        let position_ms = u32::try_from(self.position.as_millis()).unwrap_or(u32::MAX);
        table
            .iter()
            .filter(|r| r.record.last_seen_ms <= MISSING_THRESHOLD_MS && !r.record.layer.is_empty())
            .filter_map(|r| {
                let (media_index, state) = self.mode(&r.record.mac).media()?;
                Some(Command::MediaSync {
                    layer: r.record.layer.clone(),
                    media_index,
                    position_ms,
                    state,
                })
            })
            .collect()
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowde_protocol::ReceiverRecord;

    fn record(id: u8, layer: &str, last_seen_ms: u32) -> ReceiverRecord {
        ReceiverRecord {
            mac: MacAddress::new([0x24, 0x6F, 0x28, 0, 0, id]),
            layer: layer.to_string(),
            version: "1.0".to_string(),
            last_seen_ms,
            active: true,
            media_index: 0,
        }
    }

    fn table(records: &[ReceiverRecord]) -> ReceiverTable {
        let mut table = ReceiverTable::default();
        table.apply_snapshot(records, Instant::now());
        table
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Disabled".parse::<SimulationMode>().unwrap(), SimulationMode::Disabled);
        assert_eq!("stop".parse::<SimulationMode>().unwrap(), SimulationMode::Stop);
        assert_eq!("7".parse::<SimulationMode>().unwrap(), SimulationMode::Media(7));
        assert!("0".parse::<SimulationMode>().is_err());
        assert!("11".parse::<SimulationMode>().is_err());
        assert_eq!(SimulationMode::Media(3).to_string(), "3");
    }

    #[test]
    fn test_layer_simulated() {
        let a = record(1, "Main", 100);
        let b = record(2, "Side", 100);
        let table = table(&[a.clone(), b]);
        let mut sim = Simulation::default();
        assert!(!sim.is_layer_simulated("Main", &table));

        sim.set_mode(a.mac, SimulationMode::Stop);
        assert!(sim.is_layer_simulated("Main", &table));
        assert!(!sim.is_layer_simulated("Side", &table));

        sim.set_mode(a.mac, SimulationMode::Disabled);
        assert!(!sim.is_running());
        assert!(!sim.is_layer_simulated("Main", &table));
    }

    #[test]
    fn test_clock_loops() {
        let mut sim = Simulation::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert_eq!(sim.advance(t0), Duration::ZERO);
        assert_eq!(sim.advance(t0 + Duration::from_secs(10)), Duration::from_secs(10));
        assert_eq!(sim.advance(t0 + Duration::from_secs(29)), Duration::from_secs(29));
        assert_eq!(sim.advance(t0 + Duration::from_secs(31)), Duration::ZERO);
        assert_eq!(sim.advance(t0 + Duration::from_secs(33)), Duration::from_secs(2));
    }

    #[test]
    fn test_sync_commands_skip_unreachable() {
        let playing = record(1, "Main", 100);
        let gone = record(2, "Side", 20_000);
        let no_layer = record(3, "", 100);
        let stopped = record(4, "Back", 100);
        let table = table(&[playing.clone(), gone.clone(), no_layer.clone(), stopped.clone()]);

        let mut sim = Simulation::default();
        for (mac, mode) in [
            (playing.mac, SimulationMode::Media(4)),
            (gone.mac, SimulationMode::Media(1)),
            (no_layer.mac, SimulationMode::Media(1)),
            (stopped.mac, SimulationMode::Stop),
        ] {
            sim.set_mode(mac, mode);
        }
        let t0 = Instant::now();
        sim.advance(t0);
        sim.advance(t0 + Duration::from_millis(1500));

        let commands = sim.sync_commands(&table);
        assert_eq!(
            commands,
            vec![
                Command::MediaSync {
                    layer: "Main".to_string(),
                    media_index: 4,
                    position_ms: 1500,
                    state: PlaybackState::Playing,
                },
                Command::MediaSync {
                    layer: "Back".to_string(),
                    media_index: 0,
                    position_ms: 1500,
                    state: PlaybackState::Stopped,
                },
            ]
        );
    }
}
