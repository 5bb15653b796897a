use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Period of the in-place chart refresh for short ranges.
pub const SMOOTH_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TelemetryRange {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl TelemetryRange {
    pub const ALL: [TelemetryRange; 5] = [
        TelemetryRange::OneHour,
        TelemetryRange::SixHours,
        TelemetryRange::Day,
        TelemetryRange::Week,
        TelemetryRange::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryRange::OneHour => "1h",
            TelemetryRange::SixHours => "6h",
            TelemetryRange::Day => "24h",
            TelemetryRange::Week => "7d",
            TelemetryRange::Month => "30d",
        }
    }

    pub fn supports_smooth_refresh(&self) -> bool {
        matches!(self, TelemetryRange::OneHour | TelemetryRange::SixHours)
    }

    pub fn next(self) -> Self {
        match self {
            TelemetryRange::OneHour => TelemetryRange::SixHours,
            TelemetryRange::SixHours => TelemetryRange::Day,
            TelemetryRange::Day => TelemetryRange::Week,
            TelemetryRange::Week => TelemetryRange::Month,
            TelemetryRange::Month => TelemetryRange::OneHour,
        }
    }
}

impl Default for TelemetryRange {
    fn default() -> Self {
        Self::OneHour
    }
}

impl fmt::Display for TelemetryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetryRange {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(TelemetryRange::OneHour),
            "6h" => Ok(TelemetryRange::SixHours),
            "24h" | "1d" => Ok(TelemetryRange::Day),
            "7d" => Ok(TelemetryRange::Week),
            "30d" => Ok(TelemetryRange::Month),
            other => Err(format!("Unknown telemetry range: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub t: DateTime<Utc>,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem_mb: f64,
    #[serde(default)]
    pub avg_cycle_ms: f64,
    #[serde(default)]
    pub players: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryHistory {
    #[serde(default)]
    pub data: Vec<TelemetrySample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKey {
    Cpu,
    Memory,
    TickCycle,
    Players,
}

impl MetricKey {
    pub const ALL: [MetricKey; 4] = [
        MetricKey::Cpu,
        MetricKey::Memory,
        MetricKey::TickCycle,
        MetricKey::Players,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Cpu => "cpu",
            MetricKey::Memory => "memory",
            MetricKey::TickCycle => "tick_cycle",
            MetricKey::Players => "players",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MetricKey::Cpu => "CPU %",
            MetricKey::Memory => "Memory MB",
            MetricKey::TickCycle => "Tick Cycle ms",
            MetricKey::Players => "Players",
        }
    }

    pub fn value(&self, sample: &TelemetrySample) -> f64 {
        match self {
            MetricKey::Cpu => sample.cpu,
            MetricKey::Memory => sample.mem_mb,
            MetricKey::TickCycle => sample.avg_cycle_ms,
            MetricKey::Players => sample.players,
        }
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        match self {
            MetricKey::Cpu => Some(Thresholds {
                warn: 70.0,
                crit: 90.0,
            }),
            MetricKey::TickCycle => Some(Thresholds {
                warn: 40.0,
                crit: 50.0,
            }),
            MetricKey::Memory | MetricKey::Players => None,
        }
    }

    /// Y-axis floor for an empty or flat series.
    pub fn min_ceiling(&self) -> f64 {
        match self {
            MetricKey::Cpu => 100.0,
            MetricKey::Memory => 1024.0,
            MetricKey::TickCycle => 60.0,
            MetricKey::Players => 10.0,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warn: f64,
    pub crit: f64,
}

impl Thresholds {
    pub fn band(&self, value: f64) -> Band {
        if value >= self.crit {
            Band::Red
        } else if value >= self.warn {
            Band::Yellow
        } else {
            Band::Green
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    pub now: f64,
    pub avg: f64,
    pub peak: f64,
}

impl MetricSummary {
    pub fn from_samples(metric: MetricKey, samples: &[TelemetrySample]) -> Option<Self> {
        let last = samples.last()?;
        let mut total = 0.0;
        let mut peak = f64::MIN;
        for sample in samples {
            let value = metric.value(sample);
            total += value;
            if value > peak {
                peak = value;
            }
        }
        Some(Self {
            now: metric.value(last),
            avg: total / samples.len() as f64,
            peak,
        })
    }

    pub fn label(&self) -> String {
        format!(
            "Now {} | Avg {} | Peak {}",
            format_metric_value(self.now),
            format_metric_value(self.avg),
            format_metric_value(self.peak)
        )
    }
}

pub fn format_metric_value(value: f64) -> String {
    if value.abs() >= 100.0 || value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// `(seconds since first sample, value)` points for one metric.
pub fn series_points(metric: MetricKey, samples: &[TelemetrySample]) -> Vec<(f64, f64)> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|sample| {
            let offset = sample.t.signed_duration_since(first.t).num_milliseconds() as f64 / 1000.0;
            (offset, metric.value(sample))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(offset_secs: i64, cpu: f64) -> TelemetrySample {
        TelemetrySample {
            t: Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap(),
            cpu,
            mem_mb: 2048.0,
            avg_cycle_ms: 12.5,
            players: 8.0,
        }
    }

    #[test]
    fn range_wire_strings_round_trip_through_parse() {
        for range in TelemetryRange::ALL {
            assert_eq!(range.as_str().parse::<TelemetryRange>().unwrap(), range);
        }
        assert_eq!(
            serde_json::to_value(TelemetryRange::Week).unwrap(),
            serde_json::json!("7d")
        );
        assert!("2h".parse::<TelemetryRange>().is_err());
    }

    #[test]
    fn only_short_ranges_refresh_smoothly() {
        assert!(TelemetryRange::OneHour.supports_smooth_refresh());
        assert!(TelemetryRange::SixHours.supports_smooth_refresh());
        assert!(!TelemetryRange::Day.supports_smooth_refresh());
        assert!(!TelemetryRange::Week.supports_smooth_refresh());
        assert!(!TelemetryRange::Month.supports_smooth_refresh());
    }

    #[test]
    fn summary_reports_now_avg_peak() {
        let samples = vec![sample(0, 10.0), sample(60, 50.0), sample(120, 30.0)];
        let summary = MetricSummary::from_samples(MetricKey::Cpu, &samples).unwrap();
        assert_eq!(summary.now, 30.0);
        assert_eq!(summary.avg, 30.0);
        assert_eq!(summary.peak, 50.0);
        assert_eq!(summary.label(), "Now 30 | Avg 30 | Peak 50");
        assert!(MetricSummary::from_samples(MetricKey::Cpu, &[]).is_none());
    }

    #[test]
    fn thresholds_classify_into_bands() {
        let cpu = MetricKey::Cpu.thresholds().unwrap();
        assert_eq!(cpu.band(20.0), Band::Green);
        assert_eq!(cpu.band(70.0), Band::Yellow);
        assert_eq!(cpu.band(95.0), Band::Red);
        assert!(MetricKey::Players.thresholds().is_none());
    }

    #[test]
    fn series_points_are_relative_to_first_sample() {
        let samples = vec![sample(0, 1.0), sample(30, 2.0)];
        let points = series_points(MetricKey::Cpu, &samples);
        assert_eq!(points, vec![(0.0, 1.0), (30.0, 2.0)]);
    }

    #[test]
    fn history_parses_camel_case_samples() {
        let value = serde_json::json!({
            "data": [
                {"t": "2024-01-01T00:00:00Z", "cpu": 12.0, "memMb": 900.0, "avgCycleMs": 9.5, "players": 3}
            ]
        });
        let history: TelemetryHistory = serde_json::from_value(value).unwrap();
        assert_eq!(history.data.len(), 1);
        assert_eq!(history.data[0].avg_cycle_ms, 9.5);
        assert_eq!(history.data[0].players, 3.0);
    }
}
