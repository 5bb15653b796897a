use crate::telemetry::{
    series_points, MetricKey, MetricSummary, TelemetryRange, TelemetrySample, Thresholds,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChartId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartSize {
    Normal,
    Enlarged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub metric: MetricKey,
    pub points: Vec<(f64, f64)>,
    pub thresholds: Option<Thresholds>,
    pub x_max: f64,
    pub y_max: f64,
}

impl ChartData {
    pub fn from_samples(metric: MetricKey, samples: &[TelemetrySample]) -> Self {
        let points = series_points(metric, samples);
        let x_max = points.last().map(|(x, _)| *x).unwrap_or(0.0).max(1.0);
        let peak = points
            .iter()
            .map(|(_, y)| *y)
            .fold(0.0_f64, |acc, value| acc.max(value));
        let thresholds = metric.thresholds();
        let band_top = thresholds.map(|bands| bands.crit).unwrap_or(0.0);
        let y_max = (peak * 1.1).max(band_top * 1.1).max(metric.min_ceiling());
        Self {
            metric,
            points,
            thresholds,
            x_max,
            y_max,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("chart backend unavailable")]
    Unavailable,
    #[error("unknown chart {0:?}")]
    UnknownChart(ChartId),
}

/// Rendering-context owner. Each created chart must be destroyed exactly once.
pub trait ChartBackend {
    fn create(&mut self, world_id: u32, data: ChartData) -> Result<ChartId, ChartError>;
    /// Replaces the data of a live chart without recreating it.
    fn update(&mut self, id: ChartId, data: ChartData) -> Result<(), ChartError>;
    fn set_visible(&mut self, id: ChartId, visible: bool) -> Result<(), ChartError>;
    fn resize(&mut self, id: ChartId, size: ChartSize) -> Result<(), ChartError>;
    fn destroy(&mut self, id: ChartId);
    fn live_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartHandle {
    pub id: ChartId,
    pub world_id: u32,
    pub metric: MetricKey,
    pub visible: bool,
    pub size: ChartSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelPhase {
    Loading,
    Ready,
    Empty,
    Failed(String),
    /// No chart backend; the panel shows a textual placeholder.
    NoRenderer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelUpdate {
    Applied,
    Ignored,
}

/// Telemetry panel for one world: four metric charts over one range.
#[derive(Debug, Clone)]
pub struct TelemetryPanel {
    world_id: u32,
    range: TelemetryRange,
    phase: PanelPhase,
    charts: Vec<ChartHandle>,
    expanded: Option<MetricKey>,
    summaries: BTreeMap<MetricKey, MetricSummary>,
    sample_count: usize,
    refreshed_at: Option<DateTime<Utc>>,
    refresh_error: Option<String>,
}

impl TelemetryPanel {
    pub fn open(world_id: u32, range: TelemetryRange) -> Self {
        Self {
            world_id,
            range,
            phase: PanelPhase::Loading,
            charts: Vec::new(),
            expanded: None,
            summaries: BTreeMap::new(),
            sample_count: 0,
            refreshed_at: None,
            refresh_error: None,
        }
    }

    /// Full build from a history response. Responses for a range other than
    /// the active one are dropped.
    pub fn apply_history(
        &mut self,
        range: TelemetryRange,
        result: Result<Vec<TelemetrySample>, String>,
        backend: &mut dyn ChartBackend,
        now: DateTime<Utc>,
    ) -> PanelUpdate {
        if range != self.range {
            return PanelUpdate::Ignored;
        }
        self.teardown(backend);
        self.expanded = None;
        self.refresh_error = None;
        let samples = match result {
            Ok(samples) => samples,
            Err(message) => {
                self.summaries.clear();
                self.phase = PanelPhase::Failed(message);
                return PanelUpdate::Applied;
            }
        };
        self.refresh_summaries(&samples, now);
        if samples.is_empty() {
            self.phase = PanelPhase::Empty;
            return PanelUpdate::Applied;
        }
        for metric in MetricKey::ALL {
            match backend.create(self.world_id, ChartData::from_samples(metric, &samples)) {
                Ok(id) => self.charts.push(ChartHandle {
                    id,
                    world_id: self.world_id,
                    metric,
                    visible: true,
                    size: ChartSize::Normal,
                }),
                Err(_) => {
                    self.teardown(backend);
                    self.phase = PanelPhase::NoRenderer;
                    return PanelUpdate::Applied;
                }
            }
        }
        self.phase = PanelPhase::Ready;
        PanelUpdate::Applied
    }

    /// Any range change discards every chart; nothing is reused.
    pub fn change_range(&mut self, range: TelemetryRange, backend: &mut dyn ChartBackend) -> bool {
        if range == self.range {
            return false;
        }
        self.teardown(backend);
        self.range = range;
        self.expanded = None;
        self.summaries.clear();
        self.sample_count = 0;
        self.refresh_error = None;
        self.phase = PanelPhase::Loading;
        true
    }

    /// In-place data update of the existing charts.
    pub fn apply_smooth_refresh(
        &mut self,
        range: TelemetryRange,
        result: Result<Vec<TelemetrySample>, String>,
        backend: &mut dyn ChartBackend,
        now: DateTime<Utc>,
    ) -> PanelUpdate {
        if range != self.range || !range.supports_smooth_refresh() {
            return PanelUpdate::Ignored;
        }
        if self.phase != PanelPhase::Ready {
            return PanelUpdate::Ignored;
        }
        let samples = match result {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => return PanelUpdate::Ignored,
            Err(message) => {
                self.refresh_error = Some(message);
                return PanelUpdate::Ignored;
            }
        };
        self.refresh_error = None;
        for chart in &self.charts {
            let data = ChartData::from_samples(chart.metric, &samples);
            if let Err(err) = backend.update(chart.id, data) {
                self.refresh_error = Some(err.to_string());
            }
        }
        self.refresh_summaries(&samples, now);
        PanelUpdate::Applied
    }

    /// Expands `metric` (hiding the other three) or collapses it if it is
    /// already expanded. Every mounted chart is resized afterwards.
    pub fn toggle_expand(&mut self, metric: MetricKey, backend: &mut dyn ChartBackend) -> bool {
        if self.phase != PanelPhase::Ready {
            return false;
        }
        self.expanded = if self.expanded == Some(metric) {
            None
        } else {
            Some(metric)
        };
        for chart in &mut self.charts {
            let (visible, size) = match self.expanded {
                None => (true, ChartSize::Normal),
                Some(selected) if selected == chart.metric => (true, ChartSize::Enlarged),
                Some(_) => (false, ChartSize::Normal),
            };
            chart.visible = visible;
            chart.size = size;
            let _ = backend.set_visible(chart.id, visible);
        }
        for chart in &self.charts {
            let _ = backend.resize(chart.id, chart.size);
        }
        true
    }

    /// Destroys every chart owned by the panel and returns how many were live.
    pub fn close(&mut self, backend: &mut dyn ChartBackend) -> usize {
        let destroyed = self.charts.len();
        self.teardown(backend);
        self.expanded = None;
        destroyed
    }

    fn teardown(&mut self, backend: &mut dyn ChartBackend) {
        for chart in self.charts.drain(..) {
            backend.destroy(chart.id);
        }
    }

    fn refresh_summaries(&mut self, samples: &[TelemetrySample], now: DateTime<Utc>) {
        self.summaries = MetricKey::ALL
            .into_iter()
            .filter_map(|metric| {
                MetricSummary::from_samples(metric, samples).map(|summary| (metric, summary))
            })
            .collect();
        self.sample_count = samples.len();
        self.refreshed_at = Some(now);
    }

    pub fn world_id(&self) -> u32 {
        self.world_id
    }

    pub fn range(&self) -> TelemetryRange {
        self.range
    }

    pub fn phase(&self) -> &PanelPhase {
        &self.phase
    }

    pub fn charts(&self) -> &[ChartHandle] {
        &self.charts
    }

    pub fn expanded(&self) -> Option<MetricKey> {
        self.expanded
    }

    pub fn expanded_count(&self) -> usize {
        self.charts
            .iter()
            .filter(|chart| chart.size == ChartSize::Enlarged)
            .count()
    }

    pub fn summary(&self, metric: MetricKey) -> Option<&MetricSummary> {
        self.summaries.get(&metric)
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn refresh_error(&self) -> Option<&str> {
        self.refresh_error.as_deref()
    }

    pub fn wants_smooth_refresh(&self) -> bool {
        self.range.supports_smooth_refresh()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    #[derive(Default)]
    pub(crate) struct RecordingBackend {
        pub next_id: u64,
        pub live: HashMap<ChartId, (u32, ChartData, bool, ChartSize)>,
        pub created: usize,
        pub updated: usize,
        pub destroyed: usize,
        pub resized: usize,
        pub unavailable: bool,
    }

    impl ChartBackend for RecordingBackend {
        fn create(&mut self, world_id: u32, data: ChartData) -> Result<ChartId, ChartError> {
            if self.unavailable {
                return Err(ChartError::Unavailable);
            }
            self.next_id += 1;
            let id = ChartId(self.next_id);
            self.live
                .insert(id, (world_id, data, true, ChartSize::Normal));
            self.created += 1;
            Ok(id)
        }

        fn update(&mut self, id: ChartId, data: ChartData) -> Result<(), ChartError> {
            let entry = self.live.get_mut(&id).ok_or(ChartError::UnknownChart(id))?;
            entry.1 = data;
            self.updated += 1;
            Ok(())
        }

        fn set_visible(&mut self, id: ChartId, visible: bool) -> Result<(), ChartError> {
            let entry = self.live.get_mut(&id).ok_or(ChartError::UnknownChart(id))?;
            entry.2 = visible;
            Ok(())
        }

        fn resize(&mut self, id: ChartId, size: ChartSize) -> Result<(), ChartError> {
            let entry = self.live.get_mut(&id).ok_or(ChartError::UnknownChart(id))?;
            entry.3 = size;
            self.resized += 1;
            Ok(())
        }

        fn destroy(&mut self, id: ChartId) {
            if self.live.remove(&id).is_some() {
                self.destroyed += 1;
            }
        }

        fn live_count(&self) -> usize {
            self.live.len()
        }
    }

    pub(crate) fn samples(count: i64, cpu: f64) -> Vec<TelemetrySample> {
        (0..count)
            .map(|index| TelemetrySample {
                t: Utc.timestamp_opt(1_700_000_000 + index * 60, 0).unwrap(),
                cpu,
                mem_mb: 1500.0,
                avg_cycle_ms: 20.0,
                players: 12.0,
            })
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_010_000, 0).unwrap()
    }

    fn ready_panel(backend: &mut RecordingBackend) -> TelemetryPanel {
        let mut panel = TelemetryPanel::open(4, TelemetryRange::OneHour);
        panel.apply_history(TelemetryRange::OneHour, Ok(samples(5, 30.0)), backend, now());
        panel
    }

    #[test]
    fn history_builds_exactly_four_charts() {
        let mut backend = RecordingBackend::default();
        let panel = ready_panel(&mut backend);
        assert_eq!(panel.phase(), &PanelPhase::Ready);
        assert_eq!(panel.charts().len(), 4);
        assert_eq!(backend.live_count(), 4);
        let metrics: Vec<MetricKey> = panel.charts().iter().map(|c| c.metric).collect();
        assert_eq!(metrics, MetricKey::ALL.to_vec());
        assert_eq!(panel.summary(MetricKey::Cpu).map(|s| s.now), Some(30.0));
        assert_eq!(panel.sample_count(), 5);
    }

    #[test]
    fn smooth_refresh_updates_in_place() {
        let mut backend = RecordingBackend::default();
        let mut panel = ready_panel(&mut backend);
        let ids: Vec<ChartId> = panel.charts().iter().map(|c| c.id).collect();

        let update = panel.apply_smooth_refresh(
            TelemetryRange::OneHour,
            Ok(samples(6, 55.0)),
            &mut backend,
            now(),
        );
        assert_eq!(update, PanelUpdate::Applied);
        let after: Vec<ChartId> = panel.charts().iter().map(|c| c.id).collect();
        assert_eq!(ids, after);
        assert_eq!(backend.created, 4);
        assert_eq!(backend.destroyed, 0);
        assert_eq!(backend.updated, 4);
        assert_eq!(panel.summary(MetricKey::Cpu).map(|s| s.now), Some(55.0));
        let cpu = &backend.live[&ids[0]].1;
        assert_eq!(cpu.points.len(), 6);
    }

    #[test]
    fn smooth_refresh_ignored_for_long_ranges() {
        let mut backend = RecordingBackend::default();
        let mut panel = TelemetryPanel::open(4, TelemetryRange::Week);
        panel.apply_history(TelemetryRange::Week, Ok(samples(5, 30.0)), &mut backend, now());
        let update =
            panel.apply_smooth_refresh(TelemetryRange::Week, Ok(samples(5, 40.0)), &mut backend, now());
        assert_eq!(update, PanelUpdate::Ignored);
        assert_eq!(backend.updated, 0);
        assert!(!panel.wants_smooth_refresh());
    }

    #[test]
    fn smooth_refresh_failure_keeps_charts() {
        let mut backend = RecordingBackend::default();
        let mut panel = ready_panel(&mut backend);
        let update = panel.apply_smooth_refresh(
            TelemetryRange::OneHour,
            Err("503".to_string()),
            &mut backend,
            now(),
        );
        assert_eq!(update, PanelUpdate::Ignored);
        assert_eq!(panel.phase(), &PanelPhase::Ready);
        assert_eq!(panel.refresh_error(), Some("503"));
        assert_eq!(backend.live_count(), 4);
    }

    #[test]
    fn range_change_tears_down_and_resets_expansion() {
        let mut backend = RecordingBackend::default();
        let mut panel = ready_panel(&mut backend);
        panel.toggle_expand(MetricKey::Memory, &mut backend);
        assert_eq!(panel.expanded(), Some(MetricKey::Memory));

        assert!(panel.change_range(TelemetryRange::Day, &mut backend));
        assert_eq!(backend.live_count(), 0);
        assert_eq!(panel.expanded(), None);
        assert_eq!(panel.phase(), &PanelPhase::Loading);
        assert!(!panel.change_range(TelemetryRange::Day, &mut backend));

        let stale = panel.apply_history(
            TelemetryRange::OneHour,
            Ok(samples(3, 10.0)),
            &mut backend,
            now(),
        );
        assert_eq!(stale, PanelUpdate::Ignored);
        assert_eq!(backend.live_count(), 0);

        panel.apply_history(TelemetryRange::Day, Ok(samples(3, 10.0)), &mut backend, now());
        assert_eq!(backend.live_count(), 4);
        assert_eq!(backend.created, 8);
    }

    #[test]
    fn expansion_is_mutually_exclusive() {
        let mut backend = RecordingBackend::default();
        let mut panel = ready_panel(&mut backend);

        panel.toggle_expand(MetricKey::Cpu, &mut backend);
        assert_eq!(panel.expanded_count(), 1);
        let visible: Vec<bool> = panel.charts().iter().map(|c| c.visible).collect();
        assert_eq!(visible, vec![true, false, false, false]);

        panel.toggle_expand(MetricKey::Players, &mut backend);
        assert_eq!(panel.expanded_count(), 1);
        assert_eq!(panel.expanded(), Some(MetricKey::Players));
        let visible: Vec<bool> = panel.charts().iter().map(|c| c.visible).collect();
        assert_eq!(visible, vec![false, false, false, true]);

        panel.toggle_expand(MetricKey::Players, &mut backend);
        assert_eq!(panel.expanded_count(), 0);
        assert!(panel.charts().iter().all(|c| c.visible));
        assert_eq!(backend.live_count(), 4);
        assert_eq!(backend.resized, 12);
    }

    #[test]
    fn close_destroys_all_and_reopen_creates_new_instances() {
        let mut backend = RecordingBackend::default();
        let mut panel = ready_panel(&mut backend);
        let before: Vec<ChartId> = panel.charts().iter().map(|c| c.id).collect();
        assert_eq!(panel.close(&mut backend), 4);
        assert_eq!(backend.live_count(), 0);

        let reopened = ready_panel(&mut backend);
        let after: Vec<ChartId> = reopened.charts().iter().map(|c| c.id).collect();
        assert!(after.iter().all(|id| !before.contains(id)));
        assert_eq!(backend.live_count(), 4);
    }

    #[test]
    fn missing_renderer_degrades_to_placeholder() {
        let mut backend = RecordingBackend {
            unavailable: true,
            ..RecordingBackend::default()
        };
        let mut panel = TelemetryPanel::open(2, TelemetryRange::OneHour);
        panel.apply_history(TelemetryRange::OneHour, Ok(samples(3, 5.0)), &mut backend, now());
        assert_eq!(panel.phase(), &PanelPhase::NoRenderer);
        assert!(panel.charts().is_empty());
        assert!(!panel.toggle_expand(MetricKey::Cpu, &mut backend));
    }

    #[test]
    fn failed_and_empty_history_render_placeholders() {
        let mut backend = RecordingBackend::default();
        let mut panel = TelemetryPanel::open(2, TelemetryRange::SixHours);
        panel.apply_history(
            TelemetryRange::SixHours,
            Err("history unavailable".to_string()),
            &mut backend,
            now(),
        );
        assert_eq!(
            panel.phase(),
            &PanelPhase::Failed("history unavailable".to_string())
        );
        panel.apply_history(TelemetryRange::SixHours, Ok(Vec::new()), &mut backend, now());
        assert_eq!(panel.phase(), &PanelPhase::Empty);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn chart_data_scales_to_threshold_band() {
        let data = ChartData::from_samples(MetricKey::TickCycle, &samples(2, 1.0));
        assert!(data.y_max >= 60.0);
        assert_eq!(data.x_max, 60.0);
        assert!(data.thresholds.is_some());
    }
}
