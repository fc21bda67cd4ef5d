use ratatui::{layout::Rect, widgets::Block as BlockWidget};

pub use self::{arms_display::*, cell_display::*, grid_display::*, run_stats_display::*};

mod arms_display;
mod cell_display;
mod grid_display;
mod run_stats_display;

mod color {
    use ratatui::style::Color;

    pub const YELLOW: Color = Color::Rgb(255, 255, 0);
    pub const GREEN: Color = Color::Rgb(0, 200, 0);
    pub const BLUE: Color = Color::Rgb(60, 110, 255);
    pub const CYAN: Color = Color::Rgb(0, 255, 255);
    pub const GRAY: Color = Color::Rgb(127, 127, 127);
    pub const DARK_GRAY: Color = Color::Rgb(60, 60, 60);
    pub const BLACK: Color = Color::Rgb(0, 0, 0);
    pub const WHITE: Color = Color::Rgb(255, 255, 255);
}

pub mod style {
    use ratatui::style::{Color, Modifier, Style};

    use crate::view::widgets::color;

    const fn fg_bg(fg: Color, bg: Color) -> Style {
        Style::new().fg(fg).bg(bg)
    }

    const fn bg_only(color: Color) -> Style {
        Style::new().fg(color).bg(color)
    }

    pub const DEFAULT: Style = fg_bg(color::WHITE, color::BLACK);
    pub const DIM: Style = Style::new().fg(color::GRAY);
    pub const OBSTACLE: Style = bg_only(color::DARK_GRAY);
    pub const AGENT: Style = fg_bg(color::BLACK, color::YELLOW).add_modifier(Modifier::BOLD);
    pub const GOAL: Style = fg_bg(color::GREEN, color::BLACK).add_modifier(Modifier::BOLD);
    pub const TRAIL: Style = fg_bg(color::CYAN, color::BLACK);
    pub const ARM: Style = Style::new().fg(color::BLUE);
    pub const ARM_SELECTED: Style = Style::new().fg(color::YELLOW);
    pub const ARM_OPTIMAL: Style = Style::new().fg(color::GREEN);
    pub const ERROR: Style = Style::new().fg(Color::Red);
}

fn block_vertical_margin(block: Option<&BlockWidget>) -> u16 {
    let dummy_rect = Rect::new(0, 0, 100, 100);
    let inner_rect = block.map_or(dummy_rect, |block| block.inner(dummy_rect));
    dummy_rect.height - inner_rect.height
}

fn block_horizontal_margin(block: Option<&BlockWidget>) -> u16 {
    let dummy_rect = Rect::new(0, 0, 100, 100);
    let inner_rect = block.map_or(dummy_rect, |block| block.inner(dummy_rect));
    dummy_rect.width - inner_rect.width
}
