use crate::charts::TerminalCharts;
use crate::config::Config;
use crate::telemetry_session::TelemetrySession;
use chrono::{DateTime, Utc};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use woc_control_api::ControlApi;
use woc_core::command_log::CorrelationId;
use woc_core::commands::{
    quick_action_for_key, CommandCatalog, CommandDescriptor, CommandKind, ConfirmationPolicy,
    QuickAction,
};
use woc_core::console::{CommandConsole, ConsoleStep};
use woc_core::dispatch::{DispatchRequest, DispatchResponse, Toast, ToastLevel};
use woc_core::fleet::{FleetState, IntervalDecision, PollTicket};
use woc_core::panel::PanelUpdate;
use woc_core::recent::{RecentCommands, RecentStore};
use woc_core::telemetry::{MetricKey, TelemetryRange, TelemetrySample};
use woc_core::{CommandTarget, FleetSnapshot, WorldSnapshot};

pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Completions and timer ticks delivered back to the UI task.
#[derive(Debug)]
pub enum AppEvent {
    FleetPolled {
        ticket: PollTicket,
        result: Result<FleetSnapshot, String>,
    },
    CatalogLoaded(Result<CommandCatalog, String>),
    HistoryLoaded {
        world_id: u32,
        range: TelemetryRange,
        smooth: bool,
        result: Result<Vec<TelemetrySample>, String>,
    },
    DispatchFinished {
        id: CorrelationId,
        result: Result<DispatchResponse, String>,
    },
    SmoothRefreshDue {
        world_id: u32,
        range: TelemetryRange,
    },
}

pub struct App {
    pub(crate) config: Config,
    api: Arc<dyn ControlApi>,
    tx: mpsc::Sender<AppEvent>,
    pub(crate) fleet: FleetState,
    pub(crate) console: CommandConsole,
    pub(crate) telemetry: TelemetrySession,
    pub(crate) selected: usize,
    pub(crate) palette_open: bool,
    pub(crate) palette_selected: usize,
    pub(crate) palette_fleet_wide: bool,
    pub(crate) form_target: Option<CommandTarget>,
    pub(crate) help_open: bool,
    pub(crate) status_note: Option<Toast>,
    pub(crate) catalog_error: Option<String>,
    poll_restart: Option<Duration>,
}

impl App {
    pub fn new(
        config: Config,
        api: Arc<dyn ControlApi>,
        tx: mpsc::Sender<AppEvent>,
        charts: TerminalCharts,
    ) -> Self {
        let store = RecentStore::for_session(&config.state_dir, &config.session_id);
        let recent = match store.load() {
            Ok(recent) => recent,
            Err(err) => {
                warn!(event = "recent_commands_load_failed", error = %err);
                RecentCommands::default()
            }
        };
        let console = CommandConsole::new(recent, Some(store), config.confirm_simple);
        let telemetry = TelemetrySession::new(charts, tx.clone());
        Self {
            config,
            api,
            tx,
            fleet: FleetState::default(),
            console,
            telemetry,
            selected: 0,
            palette_open: false,
            palette_selected: 0,
            palette_fleet_wide: false,
            form_target: None,
            help_open: false,
            status_note: None,
            catalog_error: None,
            poll_restart: None,
        }
    }

    fn spawn_task<F>(&self, task: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = task.await;
            if tx.send(event).await.is_err() {
                debug!(event = "app_event_dropped", reason = "ui_closed");
            }
        });
    }

    fn note(&mut self, level: ToastLevel, message: impl Into<String>) {
        self.status_note = Some(Toast::new(level, message));
    }

    pub fn load_catalog(&self) {
        let api = Arc::clone(&self.api);
        self.spawn_task(async move {
            AppEvent::CatalogLoaded(api.fetch_catalog().await.map_err(|err| err.to_string()))
        });
    }

    /// Issues a fleet fetch. Overlapping fetches are fine: only the latest
    /// ticket's response is applied.
    pub fn request_poll(&mut self) {
        let (fleet, ticket) = std::mem::take(&mut self.fleet).begin_poll();
        self.fleet = fleet;
        let api = Arc::clone(&self.api);
        self.spawn_task(async move {
            let result = api.fetch_fleet().await.map_err(|err| err.to_string());
            AppEvent::FleetPolled { ticket, result }
        });
    }

    pub fn on_clock_tick(&mut self) {
        self.fleet = std::mem::take(&mut self.fleet).on_countdown_tick();
    }

    /// New poll period if the last applied poll changed it.
    pub fn take_poll_restart(&mut self) -> Option<Duration> {
        self.poll_restart.take()
    }

    fn fetch_history(&self, world_id: u32, range: TelemetryRange, smooth: bool) {
        let api = Arc::clone(&self.api);
        self.spawn_task(async move {
            let result = api
                .fetch_history(world_id, range)
                .await
                .map(|history| history.data)
                .map_err(|err| err.to_string());
            AppEvent::HistoryLoaded {
                world_id,
                range,
                smooth,
                result,
            }
        });
    }

    pub fn handle_event(&mut self, event: AppEvent, now: DateTime<Utc>) {
        match event {
            AppEvent::FleetPolled { ticket, result } => self.apply_poll(ticket, result, now),
            AppEvent::CatalogLoaded(Ok(catalog)) => {
                info!(
                    event = "command_catalog_loaded",
                    agent = catalog.agent_commands.len(),
                    game = catalog.game_commands.len()
                );
                self.catalog_error = None;
                self.console.set_catalog(catalog);
            }
            AppEvent::CatalogLoaded(Err(err)) => {
                warn!(event = "command_catalog_failed", error = %err);
                self.note(ToastLevel::Error, format!("command catalog failed: {err}"));
                self.catalog_error = Some(err);
            }
            AppEvent::HistoryLoaded {
                world_id,
                range,
                smooth,
                result,
            } => {
                if let Err(err) = &result {
                    warn!(event = "telemetry_fetch_failed", world_id, range = %range, smooth, error = %err);
                }
                let update = if smooth {
                    self.telemetry
                        .apply_smooth_refresh(world_id, range, result, now)
                } else {
                    self.telemetry.apply_history(world_id, range, result, now)
                };
                if update == PanelUpdate::Ignored {
                    debug!(event = "telemetry_response_ignored", world_id, range = %range, smooth);
                }
            }
            AppEvent::DispatchFinished { id, result } => {
                if let Err(err) = &result {
                    warn!(event = "command_dispatch_failed", correlation_id = %id, error = %err);
                }
                let evicted_before = self.console.log().evicted();
                let toast = self.console.complete_dispatch(id, result, now);
                self.log_evictions(evicted_before);
                match toast {
                    Some(toast) => {
                        info!(event = "command_dispatch_finished", correlation_id = %id, summary = %toast.message);
                        self.status_note = Some(toast);
                    }
                    None => {
                        debug!(event = "command_dispatch_unknown", correlation_id = %id);
                    }
                }
                // Pick up the effect of the command without waiting a full period.
                self.request_poll();
            }
            AppEvent::SmoothRefreshDue { world_id, range } => {
                if self.telemetry.accepts_smooth_refresh(world_id, range) {
                    self.fetch_history(world_id, range, true);
                }
            }
        }
    }

    fn apply_poll(
        &mut self,
        ticket: PollTicket,
        result: Result<FleetSnapshot, String>,
        now: DateTime<Utc>,
    ) {
        if let Err(err) = &result {
            warn!(event = "fleet_poll_failed", generation = ticket.generation(), error = %err);
        }
        let transition = std::mem::take(&mut self.fleet).on_poll_tick(ticket, result, now);
        self.fleet = transition.state;
        if transition.discarded {
            debug!(
                event = "fleet_poll_stale",
                generation = ticket.generation(),
                latest = self.fleet.latest_generation()
            );
            return;
        }
        if let IntervalDecision::Restart(period) = transition.interval {
            info!(event = "fleet_poll_interval_changed", period_ms = period.as_millis() as u64);
            self.poll_restart = Some(period);
        }
        let count = self.fleet.worlds().len();
        if count == 0 {
            self.selected = 0;
        } else if self.selected >= count {
            self.selected = count - 1;
        }
    }

    pub fn selected_world(&self) -> Option<&WorldSnapshot> {
        self.fleet.worlds().get(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let count = self.fleet.worlds().len();
        if count == 0 {
            self.selected = 0;
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, count as isize - 1);
        self.selected = next as usize;
    }

    pub fn toggle_panel(&mut self) {
        let Some(world_id) = self.selected_world().map(|world| world.id) else {
            self.note(ToastLevel::Warning, "no world selected");
            return;
        };
        if self.telemetry.is_open(world_id) {
            self.telemetry.close(world_id);
            return;
        }
        let range = TelemetryRange::default();
        self.telemetry.open(world_id, range);
        self.fetch_history(world_id, range, false);
    }

    pub fn cycle_range(&mut self) {
        let Some(world_id) = self.selected_world().map(|world| world.id) else {
            return;
        };
        let Some(range) = self.telemetry.panel(world_id).map(|panel| panel.range().next()) else {
            self.note(ToastLevel::Warning, "open telemetry first (Enter)");
            return;
        };
        if self.telemetry.change_range(world_id, range) {
            self.fetch_history(world_id, range, false);
        }
    }

    pub fn toggle_expand(&mut self, metric: MetricKey) {
        if let Some(world_id) = self.selected_world().map(|world| world.id) {
            self.telemetry.toggle_expand(world_id, metric);
        }
    }

    fn selected_target(&self) -> Option<CommandTarget> {
        self.selected_world().map(|world| CommandTarget::World(world.id))
    }

    fn command_target(&self) -> Option<CommandTarget> {
        if self.palette_open && self.palette_fleet_wide {
            Some(CommandTarget::All)
        } else {
            self.selected_target()
        }
    }

    pub fn palette_entries(&self) -> Vec<CommandDescriptor> {
        self.console.catalog().entries()
    }

    pub fn open_palette(&mut self, fleet_wide: bool) {
        self.palette_open = true;
        self.palette_fleet_wide = fleet_wide;
        self.palette_selected = 0;
    }

    pub fn run_quick_action(&mut self, action: QuickAction) {
        let Some(target) = self.selected_target() else {
            self.note(ToastLevel::Warning, "no world selected");
            return;
        };
        self.request_command(action.kind, action.name, target);
    }

    /// Refuses any dispatch path while an action for `target` is in flight.
    fn target_busy(&mut self, target: CommandTarget) -> bool {
        if !self.fleet.is_action_in_flight(target) {
            return false;
        }
        self.note(
            ToastLevel::Warning,
            format!("{} busy until the next fleet update", target.label()),
        );
        true
    }

    pub fn request_command(&mut self, kind: CommandKind, name: &str, target: CommandTarget) {
        if self.target_busy(target) {
            return;
        }
        let step = self.console.request(kind, name, target);
        self.handle_step(step, target);
    }

    fn handle_step(&mut self, step: ConsoleStep, target: CommandTarget) {
        match step {
            ConsoleStep::Ready(request) => self.dispatch(request),
            ConsoleStep::NeedsConfirmation => {}
            ConsoleStep::FormOpened(key) => {
                self.form_target = Some(target);
                debug!(event = "command_form_opened", form = %key);
            }
            ConsoleStep::Rejected(reason) => self.note(ToastLevel::Error, reason),
        }
    }

    fn run_palette_selection(&mut self) {
        let Some(target) = self.command_target() else {
            self.note(ToastLevel::Warning, "no world selected");
            return;
        };
        let entries = self.palette_entries();
        let Some(descriptor) = entries.get(self.palette_selected) else {
            return;
        };
        self.request_command(descriptor.kind, &descriptor.name, target);
    }

    fn run_recent(&mut self, index: usize) {
        let Some(target) = self.command_target() else {
            self.note(ToastLevel::Warning, "no world selected");
            return;
        };
        if self.target_busy(target) {
            return;
        }
        let step = self.console.request_recent(index, target);
        self.handle_step(step, target);
    }

    fn submit_form(&mut self) {
        let Some(target) = self.form_target.take().or_else(|| self.command_target()) else {
            self.note(ToastLevel::Warning, "no world selected");
            return;
        };
        if self.target_busy(target) {
            self.form_target = Some(target);
            return;
        }
        let step = self.console.submit_form(target);
        self.handle_step(step, target);
    }

    fn confirm(&mut self) {
        match self.console.confirm() {
            Some(request) => self.dispatch(request),
            None => {
                if let Some(expected) = self
                    .console
                    .confirmation()
                    .and_then(|pending| match pending.policy() {
                        ConfirmationPolicy::Typed { expected } => Some(expected.clone()),
                        _ => None,
                    })
                {
                    self.note(ToastLevel::Warning, format!("type {expected} exactly to execute"));
                }
            }
        }
    }

    fn dispatch(&mut self, request: DispatchRequest) {
        if self.target_busy(request.target) {
            return;
        }
        self.fleet = std::mem::take(&mut self.fleet).mark_action_in_flight(request.target);
        let evicted_before = self.console.log().evicted();
        let pending = self.console.begin_dispatch(request, Utc::now());
        self.log_evictions(evicted_before);
        if let Err(err) = self.console.persist_recent() {
            warn!(event = "recent_commands_save_failed", error = %err);
        }
        info!(
            event = "command_dispatch_started",
            correlation_id = %pending.id,
            command = %pending.request.command,
            kind = %pending.request.kind,
            target = %pending.request.target
        );
        self.palette_open = false;
        self.note(
            ToastLevel::Success,
            format!(
                "{} sent to {}",
                pending.request.command,
                pending.request.target.label()
            ),
        );
        let api = Arc::clone(&self.api);
        let id = pending.id;
        let request = pending.request;
        self.spawn_task(async move {
            let result = api.execute(&request).await.map_err(|err| err.to_string());
            AppEvent::DispatchFinished { id, result }
        });
    }

    fn log_evictions(&self, before: u64) {
        let evicted = self.console.log().evicted().saturating_sub(before);
        if evicted > 0 {
            debug!(event = "command_log_evicted", rows = evicted);
        }
    }

    /// Releases every chart and timer.
    pub fn shutdown(&mut self) {
        let destroyed = self.telemetry.dispose();
        info!(event = "session_disposed", charts_destroyed = destroyed);
    }

    /// One item from the terminal event stream. Returns true when the loop
    /// should stop: the operator quit or the stream ended.
    pub fn handle_terminal_event(&mut self, event: Option<io::Result<Event>>) -> bool {
        match event {
            Some(Ok(event)) => self.handle_input(event),
            Some(Err(err)) => {
                warn!(event = "terminal_event_error", error = %err);
                false
            }
            None => {
                warn!(event = "terminal_event_stream_closed");
                true
            }
        }
    }

    /// Returns true when the operator asked to quit.
    pub fn handle_input(&mut self, event: Event) -> bool {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            _ => false,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        if self.console.confirmation().is_some() {
            self.handle_confirmation_key(key);
            return false;
        }
        if self.console.form().is_some() {
            self.handle_form_key(key);
            return false;
        }
        if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
            self.help_open = !self.help_open;
            return false;
        }
        if self.help_open {
            if key.code == KeyCode::Esc {
                self.help_open = false;
            }
            return false;
        }
        if self.palette_open {
            self.handle_palette_key(key);
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Char('g') => self.selected = 0,
            KeyCode::Enter => self.toggle_panel(),
            KeyCode::Esc => {
                if let Some(world_id) = self.selected_world().map(|world| world.id) {
                    self.telemetry.close(world_id);
                }
            }
            KeyCode::Char('t') => self.cycle_range(),
            KeyCode::Char(ch @ '1'..='4') => {
                let index = ch as usize - '1' as usize;
                self.toggle_expand(MetricKey::ALL[index]);
            }
            KeyCode::Char('r') => {
                self.request_poll();
                self.note(ToastLevel::Success, "refresh requested");
            }
            KeyCode::Char('c') => self.open_palette(false),
            KeyCode::Char('A') => self.open_palette(true),
            KeyCode::Char(ch) => {
                if let Some(action) = quick_action_for_key(ch) {
                    self.run_quick_action(action);
                }
            }
            _ => {}
        }
        false
    }

    fn handle_palette_key(&mut self, key: KeyEvent) {
        let count = self.palette_entries().len();
        match key.code {
            KeyCode::Esc => self.palette_open = false,
            KeyCode::Down | KeyCode::Char('j') => {
                if count > 0 {
                    self.palette_selected = (self.palette_selected + 1).min(count - 1);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.palette_selected = self.palette_selected.saturating_sub(1);
            }
            KeyCode::Char('a') => self.palette_fleet_wide = !self.palette_fleet_wide,
            KeyCode::Char(ch @ '1'..='5') => self.run_recent(ch as usize - '1' as usize),
            KeyCode::Enter => self.run_palette_selection(),
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.console.close_form();
                self.form_target = None;
            }
            KeyCode::Enter => self.submit_form(),
            KeyCode::Tab | KeyCode::Down => {
                if let Some(form) = self.console.form_mut() {
                    form.focus_next();
                }
            }
            KeyCode::BackTab | KeyCode::Up => {
                if let Some(form) = self.console.form_mut() {
                    form.focus_prev();
                }
            }
            KeyCode::Backspace => {
                if let Some(form) = self.console.form_mut() {
                    form.pop_char();
                }
            }
            KeyCode::Char(ch) => {
                if let Some(form) = self.console.form_mut() {
                    form.push_char(ch);
                }
            }
            _ => {}
        }
    }

    fn handle_confirmation_key(&mut self, key: KeyEvent) {
        let typed = self
            .console
            .confirmation()
            .is_some_and(|pending| pending.typed_input().is_some());
        match key.code {
            KeyCode::Esc => {
                self.console.cancel();
                self.note(ToastLevel::Warning, "command cancelled");
            }
            KeyCode::Enter => self.confirm(),
            KeyCode::Backspace if typed => self.console.backspace_confirmation(),
            KeyCode::Char(ch) if typed => self.console.type_confirmation(ch),
            KeyCode::Char('y') | KeyCode::Char('Y') => self.confirm(),
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.console.cancel();
                self.note(ToastLevel::Warning, "command cancelled");
            }
            _ => {}
        }
    }
}
