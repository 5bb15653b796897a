use crate::CommandTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

pub const COMMAND_LOG_CAPACITY: usize = 50;

/// Assigned when a dispatch starts; the response is matched back by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Success => "success",
            EntryStatus::Failed => "failed",
        }
    }

    pub fn from_ok(ok: bool) -> Self {
        if ok {
            EntryStatus::Success
        } else {
            EntryStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandLogEntry {
    pub id: CorrelationId,
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub target: CommandTarget,
    pub status: EntryStatus,
    pub message: String,
}

impl CommandLogEntry {
    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }
}

/// One row of a fan-out result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldOutcome {
    pub world_id: u32,
    pub ok: bool,
    pub message: String,
}

/// Bounded execution history, oldest at the front.
#[derive(Debug, Clone)]
pub struct CommandLog {
    entries: VecDeque<CommandLogEntry>,
    capacity: usize,
    evicted: u64,
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::with_capacity(COMMAND_LOG_CAPACITY)
    }
}

impl CommandLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    pub fn append_pending(
        &mut self,
        command: &str,
        target: CommandTarget,
        now: DateTime<Utc>,
    ) -> CorrelationId {
        let id = CorrelationId::new();
        self.push(CommandLogEntry {
            id,
            timestamp: now,
            command: command.to_string(),
            target,
            status: EntryStatus::Pending,
            message: "dispatching".to_string(),
        });
        id
    }

    fn push(&mut self, entry: CommandLogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        self.entries.push_back(entry);
    }

    /// Moves a pending entry to its terminal status. Returns false when the
    /// entry is gone (evicted) or already resolved.
    pub fn resolve(&mut self, id: CorrelationId, ok: bool, message: impl Into<String>) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.is_pending())
        else {
            return false;
        };
        entry.status = EntryStatus::from_ok(ok);
        entry.message = message.into();
        true
    }

    /// Replaces the pending row with one resolved row per world. Per-world
    /// rows are appended even if the pending row was already evicted.
    /// Returns whether the pending row was still present.
    pub fn replace_with_fanout(
        &mut self,
        id: CorrelationId,
        command: &str,
        outcomes: &[WorldOutcome],
        now: DateTime<Utc>,
    ) -> bool {
        let found = match self.entries.iter().position(|entry| entry.id == id) {
            Some(index) => self.entries.remove(index).is_some(),
            None => false,
        };
        for outcome in outcomes {
            self.push(CommandLogEntry {
                id: CorrelationId::new(),
                timestamp: now,
                command: command.to_string(),
                target: CommandTarget::World(outcome.world_id),
                status: EntryStatus::from_ok(outcome.ok),
                message: outcome.message.clone(),
            });
        }
        found
    }

    pub fn get(&self, id: CorrelationId) -> Option<&CommandLogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Most recent first, as rendered.
    pub fn iter_recent(&self) -> impl Iterator<Item = &CommandLogEntry> {
        self.entries.iter().rev()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_pending()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
