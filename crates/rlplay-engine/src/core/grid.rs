use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{config::ConfigError, record::GridPos};

/// Smallest and largest accepted grid side.
pub const GRID_SIDE_RANGE: (usize, usize) = (3, 20);

/// Reward of the default goal (and of a goal cell authored with value 0).
pub const DEFAULT_GOAL_VALUE: f64 = 10.0;

/// What occupies a grid cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    #[display("empty")]
    Empty,
    #[display("obstacle")]
    Obstacle,
    #[display("reward")]
    Reward,
    #[display("goal")]
    Goal,
    #[display("start")]
    Start,
}

/// One authored cell, in the producer's `x`/`y` (column/row) convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub x: usize,
    pub y: usize,
    #[serde(rename = "type")]
    pub kind: CellKind,
    #[serde(default)]
    pub value: f64,
}

impl GridCell {
    #[must_use]
    pub const fn new(x: usize, y: usize, kind: CellKind, value: f64) -> Self {
        Self { x, y, kind, value }
    }

    #[must_use]
    pub const fn pos(&self) -> GridPos {
        GridPos::new(self.y, self.x)
    }
}

/// Static grid-world layout: dimensions plus the sparse list of authored cells.
///
/// The layout is read-only to the simulation core. Unlisted cells are empty;
/// when a coordinate is listed twice the later entry wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub width: usize,
    pub height: usize,
    #[serde(default)]
    pub cells: Vec<GridCell>,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self::empty(5, 5)
    }
}

impl GridLayout {
    #[must_use]
    pub const fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cell(mut self, cell: GridCell) -> Self {
        self.cells.push(cell);
        self
    }

    /// Checks dimensions, bounds and values of every authored cell.
    #[expect(clippy::cast_precision_loss)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = GRID_SIDE_RANGE;
        for (name, side) in [("grid_width", self.width), ("grid_height", self.height)] {
            if !(min..=max).contains(&side) {
                return Err(ConfigError::OutOfRange {
                    name,
                    value: side as f64,
                    min: min as f64,
                    max: max as f64,
                });
            }
        }
        for cell in &self.cells {
            if cell.x >= self.width || cell.y >= self.height {
                return Err(ConfigError::CellOutOfBounds {
                    x: cell.x,
                    y: cell.y,
                    width: self.width,
                    height: self.height,
                });
            }
            if !cell.value.is_finite() {
                return Err(ConfigError::NotFinite { name: "grid cell value" });
            }
        }
        Ok(())
    }

    /// Resolves the sparse cell list into a lookup table (last entry wins).
    #[must_use]
    pub fn resolve(&self) -> ResolvedGrid {
        let mut cells = HashMap::new();
        for cell in &self.cells {
            cells.insert(cell.pos(), (cell.kind, cell.value));
        }
        let start = self
            .cells
            .iter()
            .rev()
            .find(|c| c.kind == CellKind::Start)
            .map_or(GridPos::new(0, 0), GridCell::pos);
        let goal = self
            .cells
            .iter()
            .rev()
            .find(|c| c.kind == CellKind::Goal)
            .map_or(
                GridPos::new(self.height.saturating_sub(1), self.width.saturating_sub(1)),
                GridCell::pos,
            );
        ResolvedGrid {
            width: self.width,
            height: self.height,
            cells,
            start,
            goal,
        }
    }
}

/// A [`GridLayout`] resolved for per-cell lookup.
#[derive(Debug, Clone)]
pub struct ResolvedGrid {
    width: usize,
    height: usize,
    cells: HashMap<GridPos, (CellKind, f64)>,
    start: GridPos,
    goal: GridPos,
}

impl ResolvedGrid {
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub const fn start(&self) -> GridPos {
        self.start
    }

    #[must_use]
    pub const fn goal(&self) -> GridPos {
        self.goal
    }

    /// Returns the kind and scalar value of the cell at `pos`.
    ///
    /// The implicit start and goal are reported even when not authored; a goal
    /// authored with value 0 reports [`DEFAULT_GOAL_VALUE`].
    #[must_use]
    pub fn cell(&self, pos: GridPos) -> (CellKind, f64) {
        match self.cells.get(&pos).copied() {
            Some((CellKind::Goal, v)) if v.abs() < f64::EPSILON => (CellKind::Goal, DEFAULT_GOAL_VALUE),
            Some(cell) => cell,
            None if pos == self.goal => (CellKind::Goal, DEFAULT_GOAL_VALUE),
            None if pos == self.start => (CellKind::Start, 0.0),
            None => (CellKind::Empty, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_start_and_goal() {
        let grid = GridLayout::empty(4, 3).resolve();
        assert_eq!(grid.start(), GridPos::new(0, 0));
        assert_eq!(grid.goal(), GridPos::new(2, 3));
        assert_eq!(grid.cell(GridPos::new(2, 3)), (CellKind::Goal, DEFAULT_GOAL_VALUE));
        assert_eq!(grid.cell(GridPos::new(1, 1)), (CellKind::Empty, 0.0));
    }

    #[test]
    fn test_last_cell_wins() {
        let grid = GridLayout::empty(5, 5)
            .with_cell(GridCell::new(1, 2, CellKind::Obstacle, 0.0))
            .with_cell(GridCell::new(1, 2, CellKind::Reward, 2.0))
            .resolve();
        assert_eq!(grid.cell(GridPos::new(2, 1)), (CellKind::Reward, 2.0));
    }

    #[test]
    fn test_validate_rejects_out_of_bounds_cell() {
        let layout = GridLayout::empty(5, 5).with_cell(GridCell::new(5, 0, CellKind::Goal, 1.0));
        assert!(matches!(
            layout.validate(),
            Err(ConfigError::CellOutOfBounds { x: 5, y: 0, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_dimensions() {
        assert!(GridLayout::empty(2, 5).validate().is_err());
        assert!(GridLayout::empty(5, 21).validate().is_err());
        assert!(GridLayout::empty(20, 3).validate().is_ok());
    }

    #[test]
    fn test_cell_json_uses_type_key() {
        let cell: GridCell = serde_json::from_str(r#"{"x":1,"y":2,"type":"goal"}"#).unwrap();
        assert_eq!(cell.kind, CellKind::Goal);
        assert_eq!(cell.pos(), GridPos::new(2, 1));
        assert!(cell.value.abs() < f64::EPSILON);
    }
}
