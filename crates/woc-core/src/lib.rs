pub mod command_log;
pub mod commands;
pub mod console;
pub mod countdown;
pub mod dispatch;
pub mod fleet;
pub mod panel;
pub mod recent;
pub mod telemetry;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorldStatus {
    Offline,
    Running,
    Updating,
    Countdown,
    Unreachable,
}

impl WorldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorldStatus::Offline => "OFFLINE",
            WorldStatus::Running => "RUNNING",
            WorldStatus::Updating => "UPDATING",
            WorldStatus::Countdown => "COUNTDOWN",
            WorldStatus::Unreachable => "UNREACHABLE",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            WorldStatus::Running | WorldStatus::Updating | WorldStatus::Countdown
        )
    }
}

impl fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorldStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "OFFLINE" => Ok(WorldStatus::Offline),
            "RUNNING" => Ok(WorldStatus::Running),
            "UPDATING" => Ok(WorldStatus::Updating),
            "COUNTDOWN" => Ok(WorldStatus::Countdown),
            "UNREACHABLE" => Ok(WorldStatus::Unreachable),
            other => Err(format!("Unknown world status: {other}")),
        }
    }
}

/// One world as reported by the fleet endpoint. Produced fresh on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorldSnapshot {
    pub id: u32,
    pub status: WorldStatus,
    #[serde(default, rename = "type")]
    pub world_type: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub players: u32,
    #[serde(default)]
    pub tick_ms: f64,
    #[serde(default)]
    pub memory_pct: u32,
    #[serde(default)]
    pub cpu_load: f64,
    #[serde(default)]
    pub uptime_ms: u64,
    /// Negative values (an expired countdown) are clamped to 0.
    #[serde(
        default,
        alias = "countdownRemaining",
        deserialize_with = "deserialize_countdown_secs"
    )]
    pub countdown_remaining_sec: Option<u32>,
}

impl WorldSnapshot {
    pub fn is_countdown(&self) -> bool {
        self.status == WorldStatus::Countdown
    }

    pub fn cpu_percent(&self) -> f64 {
        (self.cpu_load.clamp(0.0, 1.0) * 100.0).round()
    }
}

fn deserialize_countdown_secs<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<i64>::deserialize(deserializer)?;
    Ok(value.map(|secs| secs.clamp(0, i64::from(u32::MAX)) as u32))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub worlds: Vec<WorldSnapshot>,
}

/// Dispatch target: a single world or the whole fleet (`"all"` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    World(u32),
    All,
}

impl CommandTarget {
    pub fn label(&self) -> String {
        match self {
            CommandTarget::World(id) => format!("World {id}"),
            CommandTarget::All => "All Worlds".to_string(),
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::World(id) => write!(f, "{id}"),
            CommandTarget::All => f.write_str("all"),
        }
    }
}

impl Serialize for CommandTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CommandTarget::World(id) => serializer.serialize_u32(*id),
            CommandTarget::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for CommandTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CommandTargetVisitor;

        impl<'de> Visitor<'de> for CommandTargetVisitor {
            type Value = CommandTarget;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a world id or the string \"all\"")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let id = u32::try_from(value)
                    .map_err(|_| E::custom(format!("world id out of range: {value}")))?;
                Ok(CommandTarget::World(id))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("world id cannot be negative: {value}")));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let cleaned = value.trim();
                if cleaned.eq_ignore_ascii_case("all") {
                    return Ok(CommandTarget::All);
                }
                let id = cleaned
                    .parse::<u32>()
                    .map_err(|err| E::custom(format!("invalid target '{value}': {err}")))?;
                Ok(CommandTarget::World(id))
            }
        }

        deserializer.deserialize_any(CommandTargetVisitor)
    }
}

pub fn format_uptime(uptime_ms: u64) -> String {
    let total_secs = uptime_ms / 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_snapshot_parses_wire_shape() {
        let value = serde_json::json!({
            "id": 7,
            "status": "COUNTDOWN",
            "type": "survival",
            "region": "eu-west",
            "players": 42,
            "tickMs": 12.5,
            "memoryPct": 61,
            "cpuLoad": 0.37,
            "uptimeMs": 3_600_000,
            "countdownRemainingSec": 125
        });
        let world: WorldSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(world.id, 7);
        assert!(world.is_countdown());
        assert_eq!(world.world_type, "survival");
        assert_eq!(world.countdown_remaining_sec, Some(125));
        assert_eq!(world.cpu_percent(), 37.0);
    }

    #[test]
    fn world_snapshot_accepts_short_countdown_alias() {
        let value = serde_json::json!({
            "id": 3,
            "status": "COUNTDOWN",
            "countdownRemaining": 30
        });
        let world: WorldSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(world.countdown_remaining_sec, Some(30));
        assert_eq!(world.players, 0);
    }

    #[test]
    fn negative_countdown_clamps_instead_of_failing_the_fleet() {
        let value = serde_json::json!({
            "worlds": [
                {"id": 1, "status": "RUNNING"},
                {"id": 7, "status": "COUNTDOWN", "countdownRemainingSec": -2}
            ]
        });
        let fleet: FleetSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(fleet.worlds.len(), 2);
        assert_eq!(fleet.worlds[0].countdown_remaining_sec, None);
        assert_eq!(fleet.worlds[1].countdown_remaining_sec, Some(0));

        let nulled: WorldSnapshot = serde_json::from_value(serde_json::json!({
            "id": 2,
            "status": "RUNNING",
            "countdownRemainingSec": null
        }))
        .unwrap();
        assert_eq!(nulled.countdown_remaining_sec, None);
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(
            "unreachable".parse::<WorldStatus>().unwrap(),
            WorldStatus::Unreachable
        );
        assert!("booting".parse::<WorldStatus>().is_err());
        assert_eq!(WorldStatus::Countdown.to_string(), "COUNTDOWN");
    }

    #[test]
    fn command_target_wire_form() {
        assert_eq!(
            serde_json::to_value(CommandTarget::World(4)).unwrap(),
            serde_json::json!(4)
        );
        assert_eq!(
            serde_json::to_value(CommandTarget::All).unwrap(),
            serde_json::json!("all")
        );
        let parsed: CommandTarget = serde_json::from_value(serde_json::json!("ALL")).unwrap();
        assert_eq!(parsed, CommandTarget::All);
        let parsed: CommandTarget = serde_json::from_value(serde_json::json!("12")).unwrap();
        assert_eq!(parsed, CommandTarget::World(12));
        assert_eq!(CommandTarget::World(2).label(), "World 2");
        assert_eq!(CommandTarget::All.label(), "All Worlds");
    }

    #[test]
    fn uptime_formats_by_magnitude() {
        assert_eq!(format_uptime(59_000), "0m");
        assert_eq!(format_uptime(5_400_000), "1h 30m");
        assert_eq!(format_uptime(90_000_000), "1d 1h");
    }
}
