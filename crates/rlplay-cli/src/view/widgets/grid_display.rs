use std::iter;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Flex, Layout, Rect},
    widgets::{Block as BlockWidget, BlockExt, Widget},
};
use rlplay_engine::projection::GridView;

use crate::view::widgets::CellDisplay;

#[derive(Debug)]
pub struct GridDisplay<'a> {
    view: &'a GridView,
    block: Option<BlockWidget<'a>>,
}

impl<'a> GridDisplay<'a> {
    pub fn new(view: &'a GridView) -> Self {
        Self { view, block: None }
    }

    pub fn block(self, block: BlockWidget<'a>) -> Self {
        Self {
            block: Some(block),
            ..self
        }
    }

    pub fn width(&self) -> u16 {
        u16::try_from(self.view.width).unwrap_or(u16::MAX) * CellDisplay::width()
            + super::block_horizontal_margin(self.block.as_ref())
    }

    pub fn height(&self) -> u16 {
        u16::try_from(self.view.height).unwrap_or(u16::MAX) * CellDisplay::height()
            + super::block_vertical_margin(self.block.as_ref())
    }
}

impl Widget for GridDisplay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer)
    where
        Self: Sized,
    {
        Widget::render(&self, area, buf);
    }
}

impl Widget for &GridDisplay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.block.as_ref().render(area, buf);
        let area = self.block.inner_if_some(area);

        let scale = self
            .view
            .cells
            .iter()
            .filter_map(|c| c.max_value)
            .map(f64::abs)
            .fold(0.0, f64::max);

        let horizontal = Layout::horizontal(
            (0..self.view.width).map(|_| Constraint::Length(CellDisplay::width())),
        )
        .flex(Flex::Center);
        let vertical = Layout::vertical(
            (0..self.view.height).map(|_| Constraint::Length(CellDisplay::height())),
        )
        .flex(Flex::Center);

        let rows = vertical.split(area);
        let cell_rows = self.view.cells.chunks(self.view.width.max(1));
        for (row_area, row) in iter::zip(rows.iter(), cell_rows) {
            let cell_areas = horizontal.split(*row_area);
            for (cell_area, cell) in iter::zip(cell_areas.iter().copied(), row) {
                CellDisplay::from_cell(cell, scale).render(cell_area, buf);
            }
        }
    }
}
