mod app;
mod charts;
mod config;
mod telemetry_session;
mod theme;
mod ui;

use crate::app::{App, EVENT_QUEUE_CAPACITY};
use crate::charts::TerminalCharts;
use crate::config::{init_logging, load_config, Args};
use crate::ui::render_ui;
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use crossterm::{
    event::EventStream,
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;
use woc_control_api::HttpControlApi;

const CLOCK_TICK: Duration = Duration::from_secs(1);

fn poll_ticker(period: Duration, immediate: bool) -> tokio::time::Interval {
    let start = if immediate {
        tokio::time::Instant::now()
    } else {
        tokio::time::Instant::now() + period
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args);
    init_logging(&config);

    let api = HttpControlApi::new(
        &config.api_url,
        config.api_token.as_deref(),
        config.request_timeout_ms,
    )
    .context("building control api client")?;
    info!(
        event = "mission_control_start",
        api_url = %api.base_url(),
        session_id = %config.session_id
    );

    let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let charts = if config.charts_enabled {
        TerminalCharts::new()
    } else {
        TerminalCharts::disabled()
    };
    let mut app = App::new(config, Arc::new(api), tx, charts);
    app.load_catalog();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    let mut poll = poll_ticker(app.fleet.poll_interval(), true);
    let mut clock = tokio::time::interval(CLOCK_TICK);
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        terminal.draw(|frame| render_ui(frame, &app, Utc::now()))?;
        tokio::select! {
            _ = poll.tick() => {
                app.request_poll();
            }
            _ = clock.tick() => {
                app.on_clock_tick();
            }
            Some(event) = rx.recv() => {
                app.handle_event(event, Utc::now());
            }
            maybe_event = events.next() => {
                if app.handle_terminal_event(maybe_event) {
                    break;
                }
            }
        }
        if let Some(period) = app.take_poll_restart() {
            poll = poll_ticker(period, false);
        }
    }

    app.shutdown();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    info!(event = "mission_control_exit");
    Ok(())
}
