use crate::countdown::CountdownPredictor;
use crate::{CommandTarget, FleetSnapshot, WorldSnapshot, WorldStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

pub const FAST_POLL_INTERVAL: Duration = Duration::from_millis(5_000);
pub const SLOW_POLL_INTERVAL: Duration = Duration::from_millis(15_000);

/// Any world counting down switches the fleet to the fast cadence.
pub fn poll_interval_for(worlds: &[WorldSnapshot]) -> Duration {
    if worlds.iter().any(WorldSnapshot::is_countdown) {
        FAST_POLL_INTERVAL
    } else {
        SLOW_POLL_INTERVAL
    }
}

/// Issued for every fleet fetch. Only the latest issued ticket may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollTicket {
    generation: u64,
}

impl PollTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalDecision {
    Keep,
    Restart(Duration),
}

#[derive(Debug, Clone)]
pub struct PollTransition {
    pub state: FleetState,
    pub interval: IntervalDecision,
    pub discarded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetKpis {
    pub total: usize,
    pub live: usize,
    pub countdown: usize,
    pub unreachable: usize,
    pub players: u64,
}

/// Immutable view of the fleet as last polled, plus the local countdown
/// prediction. Transitions consume the state and return the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetState {
    worlds: Vec<WorldSnapshot>,
    countdowns: CountdownPredictor,
    poll_interval: Duration,
    issued_generation: u64,
    applied_generation: u64,
    last_updated: Option<DateTime<Utc>>,
    last_error: Option<String>,
    actions_in_flight: BTreeSet<u32>,
    fleet_action_in_flight: bool,
}

impl Default for FleetState {
    fn default() -> Self {
        Self {
            worlds: Vec::new(),
            countdowns: CountdownPredictor::default(),
            poll_interval: SLOW_POLL_INTERVAL,
            issued_generation: 0,
            applied_generation: 0,
            last_updated: None,
            last_error: None,
            actions_in_flight: BTreeSet::new(),
            fleet_action_in_flight: false,
        }
    }
}

impl FleetState {
    pub fn begin_poll(mut self) -> (Self, PollTicket) {
        self.issued_generation = self.issued_generation.saturating_add(1);
        let ticket = PollTicket {
            generation: self.issued_generation,
        };
        (self, ticket)
    }

    pub fn on_poll_tick(
        mut self,
        ticket: PollTicket,
        result: Result<FleetSnapshot, String>,
        now: DateTime<Utc>,
    ) -> PollTransition {
        if ticket.generation != self.issued_generation {
            return PollTransition {
                state: self,
                interval: IntervalDecision::Keep,
                discarded: true,
            };
        }
        self.applied_generation = ticket.generation;
        match result {
            Ok(snapshot) => {
                self.countdowns.reset_from(&snapshot.worlds);
                self.worlds = snapshot.worlds;
                self.worlds.sort_by_key(|world| world.id);
                self.last_updated = Some(now);
                self.last_error = None;
                self.actions_in_flight.clear();
                self.fleet_action_in_flight = false;
                let next = poll_interval_for(&self.worlds);
                let interval = if next != self.poll_interval {
                    self.poll_interval = next;
                    IntervalDecision::Restart(next)
                } else {
                    IntervalDecision::Keep
                };
                PollTransition {
                    state: self,
                    interval,
                    discarded: false,
                }
            }
            Err(message) => {
                self.last_error = Some(message);
                PollTransition {
                    state: self,
                    interval: IntervalDecision::Keep,
                    discarded: false,
                }
            }
        }
    }

    pub fn on_countdown_tick(mut self) -> Self {
        self.countdowns.tick();
        self
    }

    pub fn mark_action_in_flight(mut self, target: CommandTarget) -> Self {
        match target {
            CommandTarget::World(id) => {
                self.actions_in_flight.insert(id);
            }
            CommandTarget::All => {
                self.fleet_action_in_flight = true;
            }
        }
        self
    }

    pub fn is_action_in_flight(&self, target: CommandTarget) -> bool {
        if self.fleet_action_in_flight {
            return true;
        }
        match target {
            CommandTarget::World(id) => self.actions_in_flight.contains(&id),
            CommandTarget::All => !self.actions_in_flight.is_empty(),
        }
    }

    pub fn worlds(&self) -> &[WorldSnapshot] {
        &self.worlds
    }

    pub fn world(&self, id: u32) -> Option<&WorldSnapshot> {
        self.worlds.iter().find(|world| world.id == id)
    }

    pub fn countdowns(&self) -> &CountdownPredictor {
        &self.countdowns
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn latest_generation(&self) -> u64 {
        self.issued_generation
    }

    pub fn applied_generation(&self) -> u64 {
        self.applied_generation
    }

    /// Status line for a card: the live countdown for counting-down worlds,
    /// otherwise the wire status.
    pub fn status_label(&self, world: &WorldSnapshot) -> String {
        if world.status == WorldStatus::Countdown {
            if let Some(label) = self.countdowns.label(world.id) {
                return label;
            }
        }
        world.status.to_string()
    }

    pub fn updated_ago_label(&self, now: DateTime<Utc>) -> String {
        match self.last_updated {
            Some(at) => {
                let secs = now.signed_duration_since(at).num_seconds().max(0);
                format!("updated {secs}s ago")
            }
            None => "never updated".to_string(),
        }
    }

    pub fn kpis(&self) -> FleetKpis {
        let mut kpis = FleetKpis {
            total: self.worlds.len(),
            ..FleetKpis::default()
        };
        for world in &self.worlds {
            if world.status.is_live() {
                kpis.live += 1;
            }
            match world.status {
                WorldStatus::Countdown => kpis.countdown += 1,
                WorldStatus::Unreachable => kpis.unreachable += 1,
                _ => {}
            }
            kpis.players += u64::from(world.players);
        }
        kpis
    }
}
