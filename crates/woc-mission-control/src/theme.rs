use ratatui::style::{Color, Modifier, Style};
use woc_core::command_log::EntryStatus;
use woc_core::dispatch::ToastLevel;
use woc_core::telemetry::{Band, MetricKey};
use woc_core::WorldStatus;

#[derive(Clone, Copy)]
pub struct Theme {
    pub bg: Color,
    pub surface: Color,
    pub border: Color,
    pub title: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub ok: Color,
    pub warn: Color,
    pub critical: Color,
    pub info: Color,
}

pub fn theme() -> Theme {
    Theme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

impl Theme {
    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.title)
            .add_modifier(Modifier::BOLD)
    }

    pub fn section_style(&self) -> Style {
        Style::default()
            .fg(self.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn world_status_color(&self, status: WorldStatus) -> Color {
        match status {
            WorldStatus::Running => self.ok,
            WorldStatus::Updating => self.info,
            WorldStatus::Countdown => self.warn,
            WorldStatus::Unreachable => self.critical,
            WorldStatus::Offline => self.muted,
        }
    }

    pub fn band_color(&self, band: Band) -> Color {
        match band {
            Band::Green => self.ok,
            Band::Yellow => self.warn,
            Band::Red => self.critical,
        }
    }

    pub fn metric_color(&self, metric: MetricKey) -> Color {
        match metric {
            MetricKey::Cpu => self.accent,
            MetricKey::Memory => Color::Rgb(167, 139, 250),
            MetricKey::TickCycle => Color::Rgb(45, 212, 191),
            MetricKey::Players => self.info,
        }
    }

    pub fn entry_status_color(&self, status: EntryStatus) -> Color {
        match status {
            EntryStatus::Pending => self.info,
            EntryStatus::Success => self.ok,
            EntryStatus::Failed => self.critical,
        }
    }

    pub fn toast_color(&self, level: ToastLevel) -> Color {
        match level {
            ToastLevel::Success => self.ok,
            ToastLevel::Warning => self.warn,
            ToastLevel::Error => self.critical,
        }
    }
}
