use crate::WorldSnapshot;
use std::collections::BTreeMap;

/// Local 1 Hz prediction of each world's remaining countdown.
///
/// Values are display-only. Every authoritative poll replaces the whole map,
/// so ticks missed while the console was suspended correct themselves within
/// one poll interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownPredictor {
    remaining: BTreeMap<u32, u32>,
}

impl CountdownPredictor {
    pub fn from_worlds(worlds: &[WorldSnapshot]) -> Self {
        let mut predictor = Self::default();
        predictor.reset_from(worlds);
        predictor
    }

    /// Overwrites (never merges) the prediction with the polled values.
    pub fn reset_from(&mut self, worlds: &[WorldSnapshot]) {
        self.remaining = worlds
            .iter()
            .filter(|world| world.is_countdown())
            .map(|world| (world.id, world.countdown_remaining_sec.unwrap_or(0)))
            .collect();
    }

    pub fn tick(&mut self) {
        for value in self.remaining.values_mut() {
            *value = value.saturating_sub(1);
        }
    }

    pub fn remaining(&self, world_id: u32) -> Option<u32> {
        self.remaining.get(&world_id).copied()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn label(&self, world_id: u32) -> Option<String> {
        self.remaining(world_id)
            .map(|secs| format!("COUNTDOWN {}", format_countdown(secs)))
    }
}

/// `M:SS`, floored at `0:00`.
pub fn format_countdown(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
