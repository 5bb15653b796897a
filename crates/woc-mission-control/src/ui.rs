use crate::app::App;
use crate::charts::TerminalChart;
use crate::theme::{theme, Theme};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span, Text},
    widgets::{
        Axis, Block, Borders, Chart, Clear, Dataset, GraphType, List, ListItem, ListState,
        Paragraph, Wrap,
    },
};
use woc_core::commands::{CommandKind, ConfirmationPolicy};
use woc_core::panel::{ChartSize, PanelPhase, TelemetryPanel};
use woc_core::telemetry::{format_metric_value, MetricKey};
use woc_core::{format_uptime, CommandTarget, WorldSnapshot};

const COMPACT_WIDTH: u16 = 92;
const LOG_ROWS: u16 = 10;

pub fn render_ui(frame: &mut ratatui::Frame, app: &App, now: DateTime<Utc>) {
    let size = frame.size();
    let theme = theme();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(LOG_ROWS),
        ])
        .split(size);
    frame.render_widget(render_header(app, theme, size.width, now), layout[0]);
    frame.render_widget(render_kpis(app, theme, size.width), layout[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(42), Constraint::Percentage(58)])
        .split(layout[2]);
    render_fleet_panel(frame, app, theme, body[0]);
    render_detail_panel(frame, app, theme, body[1]);
    frame.render_widget(render_command_log(app, theme), layout[3]);

    if app.palette_open {
        render_palette(frame, app, theme);
    }
    if app.console.form().is_some() {
        render_form(frame, app, theme);
    }
    if app.console.confirmation().is_some() {
        render_confirmation(frame, app, theme);
    }
    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel_block(title: impl Into<String>, theme: Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(title.into(), theme.title_style()))
}

fn render_header(app: &App, theme: Theme, width: u16, now: DateTime<Utc>) -> Paragraph<'static> {
    let compact = is_compact(width);
    let inner_width = width.saturating_sub(4) as usize;
    let poll_secs = app.fleet.poll_interval().as_secs();
    let mut fields = vec![
        app.fleet.updated_ago_label(now),
        format!("Poll: {poll_secs}s"),
        format!(
            "Session: {}",
            ellipsize(&app.config.session_id, if compact { 14 } else { 28 })
        ),
    ];
    if !compact {
        fields.push(format!("API: {}", app.config.api_url));
    }
    let status_line = fit_fields(&fields, inner_width.max(12));

    let (note_text, note_color) = if let Some(error) = app.fleet.last_error() {
        (format!("Fleet unavailable: {error}"), theme.critical)
    } else if let Some(note) = app.status_note.as_ref() {
        (note.message.clone(), theme.toast_color(note.level))
    } else if compact {
        ("ready".to_string(), theme.muted)
    } else {
        ("ready (Enter telemetry, c commands, ? help)".to_string(), theme.muted)
    };

    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status_line, Style::default().fg(theme.text))),
        Line::from(Span::styled(
            ellipsize(&note_text, inner_width.max(12)),
            Style::default().fg(note_color),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .style(Style::default().bg(theme.bg))
            .title(Span::styled("Status", theme.title_style())),
    )
}

fn render_kpis(app: &App, theme: Theme, width: u16) -> Paragraph<'static> {
    let kpis = app.fleet.kpis();
    let inner_width = width.saturating_sub(4) as usize;
    let mut fields = vec![
        format!("Worlds: {}/{} Live", kpis.live, kpis.total),
        format!("Countdown: {}", kpis.countdown),
        format!("Unreachable: {}", kpis.unreachable),
        format!("Players: {}", kpis.players),
    ];
    if !is_compact(width) {
        fields.push(format!("Pending Commands: {}", app.console.log().pending_count()));
    }
    Paragraph::new(Line::from(Span::styled(
        fit_fields(&fields, inner_width.max(12)),
        Style::default().fg(theme.text),
    )))
    .style(Style::default().fg(theme.text).bg(theme.surface))
    .block(panel_block("Fleet", theme))
}

fn render_fleet_panel(frame: &mut ratatui::Frame, app: &App, theme: Theme, area: Rect) {
    let worlds = app.fleet.worlds();
    if worlds.is_empty() {
        let message = if app.fleet.last_error().is_some() {
            "Fleet status unavailable; retrying on next poll."
        } else {
            "Waiting for fleet status..."
        };
        let paragraph = Paragraph::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.muted),
        )))
        .block(panel_block("Worlds", theme));
        frame.render_widget(paragraph, area);
        return;
    }

    let compact = is_compact(area.width.saturating_mul(2));
    let items: Vec<ListItem> = worlds
        .iter()
        .map(|world| ListItem::new(Line::from(world_row_spans(app, world, theme, compact))))
        .collect();
    let mut state = ListState::default();
    state.select(Some(app.selected.min(worlds.len() - 1)));
    let list = List::new(items)
        .highlight_symbol(">> ")
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(panel_block("Worlds", theme));
    frame.render_stateful_widget(list, area, &mut state);
}

fn world_row_spans(
    app: &App,
    world: &WorldSnapshot,
    theme: Theme,
    compact: bool,
) -> Vec<Span<'static>> {
    let status = app.fleet.status_label(world);
    let mut spans = vec![
        Span::styled(format!("#{:<3} ", world.id), Style::default().fg(theme.title)),
        Span::styled(
            format!("{status:<16}"),
            Style::default()
                .fg(theme.world_status_color(world.status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {:>3}p", world.players),
            Style::default().fg(theme.text),
        ),
    ];
    if !compact {
        spans.push(Span::styled(
            format!(
                " {} {} tick {:.1}ms mem {}% cpu {:.0}% up {}",
                world.world_type,
                world.region,
                world.tick_ms,
                world.memory_pct,
                world.cpu_percent(),
                format_uptime(world.uptime_ms)
            ),
            Style::default().fg(theme.muted),
        ));
    }
    if app.fleet.is_action_in_flight(CommandTarget::World(world.id)) {
        spans.push(Span::styled(" [busy]", Style::default().fg(theme.info)));
    }
    if app.telemetry.is_open(world.id) {
        spans.push(Span::styled(" [charts]", Style::default().fg(theme.accent)));
    }
    spans
}

fn render_detail_panel(frame: &mut ratatui::Frame, app: &App, theme: Theme, area: Rect) {
    let Some(world) = app.selected_world() else {
        frame.render_widget(Paragraph::new("").block(panel_block("Telemetry", theme)), area);
        return;
    };
    let Some(panel) = app.telemetry.panel(world.id) else {
        let hint = Paragraph::new(Line::from(Span::styled(
            "Press Enter to open telemetry for this world.",
            Style::default().fg(theme.muted),
        )))
        .block(panel_block(format!("World {} Telemetry", world.id), theme));
        frame.render_widget(hint, area);
        return;
    };

    let title = panel_title(panel);
    let placeholder = match panel.phase() {
        PanelPhase::Ready => None,
        PanelPhase::Loading => Some((format!("Loading {} telemetry...", panel.range()), theme.muted)),
        PanelPhase::Empty => Some(("No telemetry samples in this range.".to_string(), theme.muted)),
        PanelPhase::Failed(message) => {
            Some((format!("Telemetry unavailable: {message}"), theme.critical))
        }
        PanelPhase::NoRenderer => Some(("Charts unavailable.".to_string(), theme.warn)),
    };
    if let Some((message, color)) = placeholder {
        let mut lines = vec![Line::from(Span::styled(message, Style::default().fg(color)))];
        lines.extend(summary_lines(panel, theme));
        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: false })
                .block(panel_block(title, theme)),
            area,
        );
        return;
    }

    let block = panel_block(title, theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let mounted: Vec<&TerminalChart> = panel
        .charts()
        .iter()
        .filter_map(|handle| app.telemetry.charts().get(handle.id))
        .filter(|chart| chart.world_id == panel.world_id() && chart.visible)
        .collect();
    let cells = if mounted.iter().any(|chart| chart.size == ChartSize::Enlarged) {
        vec![inner]
    } else {
        grid_cells(inner)
    };
    for (chart, cell) in mounted.into_iter().zip(cells) {
        render_chart(frame, panel, chart, theme, cell);
    }
}

fn panel_title(panel: &TelemetryPanel) -> String {
    let mut title = format!(
        "World {} Telemetry [{}] {} samples",
        panel.world_id(),
        panel.range(),
        panel.sample_count()
    );
    if panel.wants_smooth_refresh() {
        title.push_str(" (live)");
    }
    if let Some(error) = panel.refresh_error() {
        title.push_str(&format!(" refresh failed: {}", ellipsize(error, 32)));
    }
    title
}

fn summary_lines(panel: &TelemetryPanel, theme: Theme) -> Vec<Line<'static>> {
    MetricKey::ALL
        .iter()
        .filter_map(|metric| {
            panel.summary(*metric).map(|summary| {
                Line::from(vec![
                    Span::styled(format!("{:<14}", metric.title()), theme.section_style()),
                    Span::styled(summary.label(), Style::default().fg(theme.text)),
                ])
            })
        })
        .collect()
}

fn grid_cells(area: Rect) -> Vec<Rect> {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    rows.iter()
        .flat_map(|row| {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(*row)
                .to_vec()
        })
        .collect()
}

fn render_chart(
    frame: &mut ratatui::Frame,
    panel: &TelemetryPanel,
    chart: &TerminalChart,
    theme: Theme,
    area: Rect,
) {
    let data = &chart.data;
    let title = match panel.summary(data.metric) {
        Some(summary) => format!("{} {}", data.metric.title(), summary.label()),
        None => data.metric.title().to_string(),
    };
    let title_color = match (data.thresholds, panel.summary(data.metric)) {
        (Some(bands), Some(summary)) => theme.band_color(bands.band(summary.now)),
        _ => theme.title,
    };

    let band_lines: Vec<(f64, Vec<(f64, f64)>)> = data
        .thresholds
        .map(|bands| {
            vec![
                (bands.warn, vec![(0.0, bands.warn), (data.x_max, bands.warn)]),
                (bands.crit, vec![(0.0, bands.crit), (data.x_max, bands.crit)]),
            ]
        })
        .unwrap_or_default();
    let mut datasets = vec![Dataset::default()
        .marker(Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(theme.metric_color(data.metric)))
        .data(&data.points)];
    if let Some(bands) = data.thresholds {
        for (level, points) in &band_lines {
            datasets.push(
                Dataset::default()
                    .marker(Marker::Dot)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(theme.band_color(bands.band(*level))))
                    .data(points),
            );
        }
    }

    let widget = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled(
                    ellipsize(&title, area.width.saturating_sub(4) as usize),
                    Style::default().fg(title_color).add_modifier(Modifier::BOLD),
                )),
        )
        .x_axis(
            Axis::default()
                .bounds([0.0, data.x_max])
                .labels(vec![Span::raw("old"), Span::raw("now")])
                .style(Style::default().fg(theme.muted)),
        )
        .y_axis(
            Axis::default()
                .bounds([0.0, data.y_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format_metric_value(data.y_max / 2.0)),
                    Span::raw(format_metric_value(data.y_max)),
                ])
                .style(Style::default().fg(theme.muted)),
        );
    frame.render_widget(widget, area);
}

fn render_command_log(app: &App, theme: Theme) -> List<'static> {
    let items: Vec<ListItem> = app
        .console
        .log()
        .iter_recent()
        .take(LOG_ROWS as usize)
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.timestamp.format("%H:%M:%S")),
                    Style::default().fg(theme.muted),
                ),
                Span::styled(
                    format!("{:<8}", entry.status.as_str()),
                    Style::default().fg(theme.entry_status_color(entry.status)),
                ),
                Span::styled(
                    format!("{} -> {} ", entry.command, entry.target.label()),
                    Style::default().fg(theme.text),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(theme.muted)),
            ]))
        })
        .collect();
    List::new(items).block(panel_block(
        format!("Command Log ({}/{})", app.console.log().len(), app.console.log().capacity()),
        theme,
    ))
}

fn render_palette(frame: &mut ratatui::Frame, app: &App, theme: Theme) {
    let area = centered_rect(70, 70, frame.size());
    let target = if app.palette_fleet_wide {
        "All Worlds".to_string()
    } else {
        app.selected_world()
            .map(|world| CommandTarget::World(world.id).label())
            .unwrap_or_else(|| "no world".to_string())
    };
    let mut lines = vec![Line::from(vec![
        Span::styled("Target: ", theme.section_style()),
        Span::styled(target, Style::default().fg(theme.text)),
        Span::styled("  (a toggles fleet-wide)", Style::default().fg(theme.muted)),
    ])];
    if let Some(error) = app.catalog_error.as_deref() {
        lines.push(Line::from(Span::styled(
            format!("catalog unavailable: {error}"),
            Style::default().fg(theme.critical),
        )));
    }
    if !app.console.recent().is_empty() {
        lines.push(Line::from(Span::styled("Recent", theme.section_style())));
        for (index, item) in app.console.recent().items().iter().enumerate() {
            lines.push(Line::from(format!(
                "  {}  {} ({})",
                index + 1,
                item.name,
                item.kind
            )));
        }
    }
    lines.push(Line::from(Span::styled("Commands", theme.section_style())));
    let mut group: Option<&str> = None;
    let entries = app.palette_entries();
    for (index, descriptor) in entries.iter().enumerate() {
        if descriptor.kind == CommandKind::Game && group != Some(descriptor.category_label()) {
            group = Some(descriptor.category_label());
            lines.push(Line::from(Span::styled(
                format!(" {}", descriptor.category_label()),
                Style::default().fg(theme.muted).add_modifier(Modifier::ITALIC),
            )));
        }
        let marker = if index == app.palette_selected { ">> " } else { "   " };
        let style = if index == app.palette_selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default().fg(theme.text)
        };
        let mut text = format!("{marker}{:<6} {}", descriptor.kind, descriptor.name);
        if woc_core::commands::is_dangerous(descriptor) {
            text.push_str("  DANGEROUS");
        }
        lines.push(Line::from(Span::styled(text, style)));
    }
    render_overlay(frame, area, "Commands", lines, theme);
}

fn render_form(frame: &mut ratatui::Frame, app: &App, theme: Theme) {
    let Some(form) = app.console.form() else {
        return;
    };
    let area = centered_rect(60, 50, frame.size());
    let mut lines = vec![Line::from(Span::styled(
        format!("{} parameters", form.descriptor().name),
        theme.section_style(),
    ))];
    for (index, (param, input)) in form
        .descriptor()
        .params
        .iter()
        .zip(form.inputs())
        .enumerate()
    {
        let focused = index == form.focus();
        let style = if focused {
            Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text)
        };
        let cursor = if focused { "_" } else { "" };
        lines.push(Line::from(Span::styled(
            format!(
                "  {:<18} ({:?}) {input}{cursor}",
                param.display_label(),
                param.kind
            ),
            style,
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Tab next field, Enter submit, Esc close",
        Style::default().fg(theme.muted),
    )));
    render_overlay(frame, area, form.key(), lines, theme);
}

fn render_confirmation(frame: &mut ratatui::Frame, app: &App, theme: Theme) {
    let Some(pending) = app.console.confirmation() else {
        return;
    };
    let area = centered_rect(56, 30, frame.size());
    let (title, color) = match pending.policy() {
        ConfirmationPolicy::Typed { .. } => ("Dangerous Command", theme.critical),
        _ => ("Confirm", theme.warn),
    };
    let mut lines = vec![Line::from(Span::styled(
        pending.prompt().to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))];
    match pending.typed_input() {
        Some(input) => {
            lines.push(Line::from(format!("> {input}_")));
            let hint = if pending.execute_enabled() {
                Span::styled("Enter to execute", Style::default().fg(theme.ok))
            } else {
                Span::styled("execute disabled", Style::default().fg(theme.muted))
            };
            lines.push(Line::from(vec![hint, Span::raw("  Esc cancel")]));
        }
        None => lines.push(Line::from("y/Enter execute, n/Esc cancel")),
    }
    render_overlay(frame, area, title, lines, theme);
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: Theme) {
    let area = centered_rect(72, 72, frame.size());
    let lines = vec![
        Line::from(Span::styled("Fleet", theme.section_style())),
        Line::from("  j/k      select world"),
        Line::from("  r        refresh fleet now"),
        Line::from("  s/x/R/u  start/stop/restart/update selected agent"),
        Line::from(""),
        Line::from(Span::styled("Telemetry", theme.section_style())),
        Line::from("  Enter    open/close charts for selected world"),
        Line::from("  t        cycle range (1h/6h/24h/7d/30d)"),
        Line::from("  1-4      expand CPU/Memory/Tick/Players chart"),
        Line::from(""),
        Line::from(Span::styled("Commands", theme.section_style())),
        Line::from("  c        command palette for selected world"),
        Line::from("  A        command palette for all worlds"),
        Line::from("  1-5      (palette) rerun recent command"),
        Line::from(""),
        Line::from("  ? or F1  toggle this help"),
        Line::from("  q        quit"),
    ];
    render_overlay(frame, area, "Help", lines, theme);
}

fn render_overlay(
    frame: &mut ratatui::Frame,
    area: Rect,
    title: impl Into<String>,
    lines: Vec<Line<'static>>,
    theme: Theme,
) {
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel_block(title, theme))
            .wrap(Wrap { trim: false }),
        area,
    );
}

/// Overlay box taking the given share of `area`, centred in it.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let share = |extent: u16, percent: u16| {
        (u32::from(extent) * u32::from(percent.min(100)) / 100) as u16
    };
    let width = share(area.width, percent_x);
    let height = share(area.height, percent_y);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Truncates to `max` chars, marking the cut with "...".
fn ellipsize(input: &str, max: usize) -> String {
    if input.char_indices().nth(max).is_none() {
        return input.to_string();
    }
    if max <= 3 {
        return ".".repeat(max);
    }
    let keep = input
        .char_indices()
        .nth(max - 3)
        .map_or(input.len(), |(index, _)| index);
    format!("{}...", &input[..keep])
}

fn fit_fields(fields: &[String], max: usize) -> String {
    let mut output = String::new();
    for field in fields.iter().filter(|field| !field.trim().is_empty()) {
        let candidate = if output.is_empty() {
            field.clone()
        } else {
            format!("{output} | {field}")
        };
        if candidate.chars().count() <= max {
            output = candidate;
        } else if output.is_empty() {
            return ellipsize(field, max);
        } else {
            break;
        }
    }
    output
}

fn is_compact(width: u16) -> bool {
    width < COMPACT_WIDTH
}
