use crate::app::AppEvent;
use crate::charts::TerminalCharts;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use woc_core::panel::{PanelUpdate, TelemetryPanel};
use woc_core::telemetry::{MetricKey, TelemetryRange, TelemetrySample, SMOOTH_REFRESH_INTERVAL};

/// Periodic task that is aborted when the handle is dropped.
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn spawn_smooth_refresh(
    world_id: u32,
    range: TelemetryRange,
    tx: mpsc::Sender<AppEvent>,
) -> TimerHandle {
    TimerHandle(tokio::spawn(async move {
        let start = tokio::time::Instant::now() + SMOOTH_REFRESH_INTERVAL;
        let mut ticker = tokio::time::interval_at(start, SMOOTH_REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            if tx
                .send(AppEvent::SmoothRefreshDue { world_id, range })
                .await
                .is_err()
            {
                break;
            }
        }
    }))
}

struct PanelSlot {
    panel: TelemetryPanel,
    timer: Option<TimerHandle>,
}

/// Owns every open telemetry panel, its charts and its refresh timer.
/// Dropping the session releases all of them.
pub struct TelemetrySession {
    charts: TerminalCharts,
    panels: BTreeMap<u32, PanelSlot>,
    tx: mpsc::Sender<AppEvent>,
}

impl TelemetrySession {
    pub fn new(charts: TerminalCharts, tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            charts,
            panels: BTreeMap::new(),
            tx,
        }
    }

    fn timer_for(&self, world_id: u32, range: TelemetryRange) -> Option<TimerHandle> {
        range
            .supports_smooth_refresh()
            .then(|| spawn_smooth_refresh(world_id, range, self.tx.clone()))
    }

    /// Returns false if the panel was already open.
    pub fn open(&mut self, world_id: u32, range: TelemetryRange) -> bool {
        if self.panels.contains_key(&world_id) {
            return false;
        }
        let timer = self.timer_for(world_id, range);
        self.panels.insert(
            world_id,
            PanelSlot {
                panel: TelemetryPanel::open(world_id, range),
                timer,
            },
        );
        debug!(event = "telemetry_panel_open", world_id, range = %range);
        true
    }

    /// Destroys the panel's charts and stops its timer.
    pub fn close(&mut self, world_id: u32) -> Option<usize> {
        let mut slot = self.panels.remove(&world_id)?;
        let destroyed = slot.panel.close(&mut self.charts);
        drop(slot.timer.take());
        info!(event = "telemetry_panel_closed", world_id, charts_destroyed = destroyed);
        Some(destroyed)
    }

    pub fn change_range(&mut self, world_id: u32, range: TelemetryRange) -> bool {
        let Some(slot) = self.panels.get_mut(&world_id) else {
            return false;
        };
        if !slot.panel.change_range(range, &mut self.charts) {
            return false;
        }
        slot.timer = None;
        let timer = self.timer_for(world_id, range);
        if let Some(slot) = self.panels.get_mut(&world_id) {
            slot.timer = timer;
        }
        true
    }

    pub fn apply_history(
        &mut self,
        world_id: u32,
        range: TelemetryRange,
        result: Result<Vec<TelemetrySample>, String>,
        now: DateTime<Utc>,
    ) -> PanelUpdate {
        let Some(slot) = self.panels.get_mut(&world_id) else {
            return PanelUpdate::Ignored;
        };
        let update = slot.panel.apply_history(range, result, &mut self.charts, now);
        if update == PanelUpdate::Applied {
            debug!(
                event = "telemetry_charts_built",
                world_id,
                range = %range,
                charts = slot.panel.charts().len()
            );
        }
        update
    }

    pub fn apply_smooth_refresh(
        &mut self,
        world_id: u32,
        range: TelemetryRange,
        result: Result<Vec<TelemetrySample>, String>,
        now: DateTime<Utc>,
    ) -> PanelUpdate {
        match self.panels.get_mut(&world_id) {
            Some(slot) => slot
                .panel
                .apply_smooth_refresh(range, result, &mut self.charts, now),
            None => PanelUpdate::Ignored,
        }
    }

    pub fn toggle_expand(&mut self, world_id: u32, metric: MetricKey) -> bool {
        match self.panels.get_mut(&world_id) {
            Some(slot) => slot.panel.toggle_expand(metric, &mut self.charts),
            None => false,
        }
    }

    /// Whether a smooth refresh for this panel and range should be fetched.
    pub fn accepts_smooth_refresh(&self, world_id: u32, range: TelemetryRange) -> bool {
        self.panels.get(&world_id).is_some_and(|slot| {
            slot.panel.range() == range && slot.panel.wants_smooth_refresh()
        })
    }

    pub fn panel(&self, world_id: u32) -> Option<&TelemetryPanel> {
        self.panels.get(&world_id).map(|slot| &slot.panel)
    }

    pub fn is_open(&self, world_id: u32) -> bool {
        self.panels.contains_key(&world_id)
    }

    pub fn charts(&self) -> &TerminalCharts {
        &self.charts
    }

    pub fn live_timers(&self) -> usize {
        self.panels
            .values()
            .filter(|slot| slot.timer.is_some())
            .count()
    }

    /// Closes every panel; returns how many charts were destroyed.
    pub fn dispose(&mut self) -> usize {
        let world_ids: Vec<u32> = self.panels.keys().copied().collect();
        world_ids
            .into_iter()
            .filter_map(|world_id| self.close(world_id))
            .sum()
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use woc_core::panel::ChartBackend;
    use woc_core::panel::PanelPhase;

    fn samples(count: usize) -> Vec<TelemetrySample> {
        (0..count)
            .map(|index| TelemetrySample {
                t: Utc
                    .timestamp_opt(1_700_000_000 + index as i64 * 60, 0)
                    .unwrap(),
                cpu: 40.0,
                mem_mb: 900.0,
                avg_cycle_ms: 20.0,
                players: 5.0,
            })
            .collect()
    }

    fn session() -> (TelemetrySession, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (TelemetrySession::new(TerminalCharts::new(), tx), rx)
    }

    #[tokio::test]
    async fn close_destroys_charts_and_stops_timer() {
        let (mut session, _rx) = session();
        assert!(session.open(7, TelemetryRange::OneHour));
        assert!(!session.open(7, TelemetryRange::OneHour));
        session.apply_history(7, TelemetryRange::OneHour, Ok(samples(5)), Utc::now());
        assert_eq!(session.charts().live_count(), 4);
        assert_eq!(session.live_timers(), 1);

        assert_eq!(session.close(7), Some(4));
        assert_eq!(session.charts().live_count(), 0);
        assert_eq!(session.live_timers(), 0);
        assert_eq!(session.close(7), None);
    }

    #[tokio::test]
    async fn long_ranges_run_without_a_timer() {
        let (mut session, _rx) = session();
        session.open(2, TelemetryRange::Week);
        assert_eq!(session.live_timers(), 0);
        assert!(!session.accepts_smooth_refresh(2, TelemetryRange::Week));

        assert!(session.change_range(2, TelemetryRange::SixHours));
        assert_eq!(session.live_timers(), 1);
        assert!(session.accepts_smooth_refresh(2, TelemetryRange::SixHours));
        assert_eq!(
            session.panel(2).map(|panel| panel.phase().clone()),
            Some(PanelPhase::Loading)
        );
    }

    #[tokio::test]
    async fn reopen_builds_fresh_chart_instances() {
        let (mut session, _rx) = session();
        session.open(3, TelemetryRange::OneHour);
        session.apply_history(3, TelemetryRange::OneHour, Ok(samples(3)), Utc::now());
        let first: Vec<_> = session
            .panel(3)
            .unwrap()
            .charts()
            .iter()
            .map(|chart| chart.id)
            .collect();
        session.close(3);
        session.open(3, TelemetryRange::OneHour);
        session.apply_history(3, TelemetryRange::OneHour, Ok(samples(3)), Utc::now());
        let second: Vec<_> = session
            .panel(3)
            .unwrap()
            .charts()
            .iter()
            .map(|chart| chart.id)
            .collect();
        assert_eq!(second.len(), 4);
        assert!(second.iter().all(|id| !first.contains(id)));
    }

    #[tokio::test]
    async fn dispose_releases_everything() {
        let (mut session, _rx) = session();
        for world_id in [1, 2, 3] {
            session.open(world_id, TelemetryRange::OneHour);
            session.apply_history(world_id, TelemetryRange::OneHour, Ok(samples(2)), Utc::now());
        }
        assert_eq!(session.charts().live_count(), 12);
        assert_eq!(session.dispose(), 12);
        assert_eq!(session.charts().live_count(), 0);
        assert_eq!(session.live_timers(), 0);
        assert!([1, 2, 3].iter().all(|world_id| !session.is_open(*world_id)));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_emits_refresh_events_every_interval() {
        let (mut session, mut rx) = session();
        session.open(9, TelemetryRange::OneHour);
        tokio::time::advance(SMOOTH_REFRESH_INTERVAL).await;
        let event = rx.recv().await.expect("refresh event");
        assert!(matches!(
            event,
            AppEvent::SmoothRefreshDue {
                world_id: 9,
                range: TelemetryRange::OneHour
            }
        ));
        session.close(9);
        tokio::time::advance(SMOOTH_REFRESH_INTERVAL * 3).await;
        assert!(rx.try_recv().is_err());
    }
}
