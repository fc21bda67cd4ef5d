use ratatui::{
    prelude::{Buffer, Rect},
    style::{Color, Style},
    widgets::{Paragraph, Widget},
};
use rlplay_engine::{CellKind, projection::CellView};

use crate::view::widgets::style;

/// One grid cell: its kind, the greedy arrow and a value tint.
#[derive(Debug)]
pub struct CellDisplay {
    style: Style,
    symbol: String,
}

impl CellDisplay {
    pub fn new(style: Style, symbol: impl Into<String>) -> Self {
        Self {
            style,
            symbol: symbol.into(),
        }
    }

    pub fn width() -> u16 {
        3
    }

    pub fn height() -> u16 {
        1
    }

    /// `scale` is the largest absolute cell value on the grid.
    pub fn from_cell(cell: &CellView, scale: f64) -> Self {
        if cell.is_agent {
            return Self::new(style::AGENT, "@");
        }
        let symbol = match cell.kind {
            CellKind::Obstacle => return Self::new(style::OBSTACLE, ""),
            CellKind::Goal => return Self::new(style::GOAL, "G"),
            CellKind::Start => "S".to_owned(),
            CellKind::Reward => "+".to_owned(),
            CellKind::Empty => cell
                .best_action
                .map_or_else(|| "·".to_owned(), |d| d.arrow().to_string()),
        };
        let base = if cell.on_trail {
            style::TRAIL
        } else {
            style::DEFAULT
        };
        let style = match cell.max_value {
            Some(value) => base.bg(heat(value, scale)),
            None => base,
        };
        Self::new(style, symbol)
    }
}

/// Background tint for a value: green above zero, red below.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn heat(value: f64, scale: f64) -> Color {
    if scale <= 0.0 || !value.is_finite() {
        return Color::Rgb(0, 0, 0);
    }
    let level = ((value.abs() / scale).min(1.0) * 140.0) as u8;
    if value >= 0.0 {
        Color::Rgb(0, level, 0)
    } else {
        Color::Rgb(level, 0, 0)
    }
}

impl Widget for CellDisplay {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        Widget::render(&self, area, buf);
    }
}

impl Widget for &CellDisplay {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        Paragraph::new(self.symbol.as_str())
            .style(self.style)
            .centered()
            .render(area, buf);
    }
}
