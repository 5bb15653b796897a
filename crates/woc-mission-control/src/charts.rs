use std::collections::BTreeMap;
use woc_core::panel::{ChartBackend, ChartData, ChartError, ChartId, ChartSize};

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalChart {
    pub world_id: u32,
    pub data: ChartData,
    pub visible: bool,
    pub size: ChartSize,
}

/// Chart registry drawn by the UI as ratatui `Chart` widgets.
#[derive(Debug, Default)]
pub struct TerminalCharts {
    next_id: u64,
    charts: BTreeMap<ChartId, TerminalChart>,
    disabled: bool,
}

impl TerminalCharts {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses to create charts (no drawing surface).
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    pub fn get(&self, id: ChartId) -> Option<&TerminalChart> {
        self.charts.get(&id)
    }
}

impl ChartBackend for TerminalCharts {
    fn create(&mut self, world_id: u32, data: ChartData) -> Result<ChartId, ChartError> {
        if self.disabled {
            return Err(ChartError::Unavailable);
        }
        self.next_id = self.next_id.saturating_add(1);
        let id = ChartId(self.next_id);
        self.charts.insert(
            id,
            TerminalChart {
                world_id,
                data,
                visible: true,
                size: ChartSize::Normal,
            },
        );
        Ok(id)
    }

    fn update(&mut self, id: ChartId, data: ChartData) -> Result<(), ChartError> {
        let chart = self
            .charts
            .get_mut(&id)
            .ok_or(ChartError::UnknownChart(id))?;
        chart.data = data;
        Ok(())
    }

    fn set_visible(&mut self, id: ChartId, visible: bool) -> Result<(), ChartError> {
        let chart = self
            .charts
            .get_mut(&id)
            .ok_or(ChartError::UnknownChart(id))?;
        chart.visible = visible;
        Ok(())
    }

    fn resize(&mut self, id: ChartId, size: ChartSize) -> Result<(), ChartError> {
        let chart = self
            .charts
            .get_mut(&id)
            .ok_or(ChartError::UnknownChart(id))?;
        chart.size = size;
        Ok(())
    }

    fn destroy(&mut self, id: ChartId) {
        self.charts.remove(&id);
    }

    fn live_count(&self) -> usize {
        self.charts.len()
    }
}
