use std::iter;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Block as BlockWidget, BlockExt, Gauge, Widget},
};
use rlplay_engine::{TRUE_VALUE_RANGE, projection::ArmsView};

use crate::view::widgets::style;

/// Bandit arms as horizontal gauges of their current estimates.
#[derive(Debug)]
pub struct ArmsDisplay<'a> {
    view: &'a ArmsView,
    block: Option<BlockWidget<'a>>,
}

impl<'a> ArmsDisplay<'a> {
    pub fn new(view: &'a ArmsView) -> Self {
        Self { view, block: None }
    }

    pub fn block(self, block: BlockWidget<'a>) -> Self {
        Self {
            block: Some(block),
            ..self
        }
    }

    pub fn height(&self) -> u16 {
        u16::try_from(self.view.arms.len()).unwrap_or(u16::MAX)
            + super::block_vertical_margin(self.block.as_ref())
    }
}

/// Position of `estimate` within the range hidden arm values are drawn from.
fn gauge_ratio(estimate: f64) -> f64 {
    let span = TRUE_VALUE_RANGE.end - TRUE_VALUE_RANGE.start;
    ((estimate - TRUE_VALUE_RANGE.start) / span).clamp(0.0, 1.0)
}

impl Widget for ArmsDisplay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.block.as_ref().render(area, buf);
        let area = self.block.inner_if_some(area);

        let rows =
            Layout::vertical(self.view.arms.iter().map(|_| Constraint::Length(1))).split(area);
        for (row, arm) in iter::zip(rows.iter().copied(), &self.view.arms) {
            let [label_area, gauge_area] = row.layout(&Layout::horizontal([
                Constraint::Length(10),
                Constraint::Fill(1),
            ]));
            let marker = match (arm.is_selected, arm.is_optimal) {
                (true, true) => ">*",
                (true, false) => "> ",
                (false, true) => " *",
                (false, false) => "  ",
            };
            let gauge_style = if arm.is_selected {
                style::ARM_SELECTED
            } else if arm.is_optimal {
                style::ARM_OPTIMAL
            } else {
                style::ARM
            };
            Line::from(vec![
                Span::styled(marker, gauge_style),
                Span::styled(format!("arm {:<3}", arm.index), style::DEFAULT),
            ])
            .render(label_area, buf);
            Gauge::default()
                .gauge_style(gauge_style)
                .ratio(gauge_ratio(arm.estimate))
                .label(format!("{:+.3} ({})", arm.estimate, arm.count))
                .render(gauge_area, buf);
        }
    }
}
