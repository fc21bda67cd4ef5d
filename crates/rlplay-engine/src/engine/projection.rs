//! Render model of a single record.
//!
//! Everything here is a pure function of one [`StepRecord`] and the static
//! layout, so the view can never drift from the playback position.

use serde::Serialize;

use crate::core::{
    AgentState, CellKind, Direction, GridPos, ResolvedGrid, RunConfig, StepRecord,
};

/// Static layout a record is projected onto.
#[derive(Debug, Clone)]
pub enum Layout {
    Grid(ResolvedGrid),
    Arms { n_arms: usize },
}

impl Layout {
    #[must_use]
    pub fn for_config(config: &RunConfig) -> Self {
        match config {
            RunConfig::Bandit(bandit) => Self::Arms {
                n_arms: bandit.n_arms,
            },
            _ => Self::Grid(config.grid().cloned().unwrap_or_default().resolve()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellView {
    pub pos: GridPos,
    pub kind: CellKind,
    pub value: f64,
    /// Greedy action from the value snapshot.
    pub best_action: Option<Direction>,
    pub max_value: Option<f64>,
    pub is_agent: bool,
    /// Visited by the episode's trajectory up to the shown step.
    pub on_trail: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridView {
    pub width: usize,
    pub height: usize,
    /// Row-major.
    pub cells: Vec<CellView>,
    pub agent: Option<GridPos>,
    pub episode: Option<u32>,
    pub reward: Option<f64>,
}

impl GridView {
    #[must_use]
    pub fn cell(&self, pos: GridPos) -> Option<&CellView> {
        (pos.row < self.height && pos.col < self.width)
            .then(|| &self.cells[pos.row * self.width + pos.col])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmView {
    pub index: usize,
    pub estimate: f64,
    pub count: u32,
    pub is_selected: bool,
    pub is_optimal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmsView {
    pub arms: Vec<ArmView>,
    pub episode: Option<u32>,
    pub reward: Option<f64>,
    pub optimal_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, derive_more::IsVariant)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Grid(GridView),
    Arms(ArmsView),
}

/// Projects `record` (or the empty state) onto `layout`.
#[must_use]
pub fn project(record: Option<&StepRecord>, layout: &Layout) -> Projection {
    match layout {
        Layout::Grid(grid) => Projection::Grid(project_grid(record, grid, None)),
        Layout::Arms { n_arms } => Projection::Arms(project_arms(record, *n_arms)),
    }
}

/// Projects a grid record, optionally at move `step` of its trajectory
/// instead of the episode's end.
#[must_use]
pub fn project_grid(record: Option<&StepRecord>, grid: &ResolvedGrid, step: Option<usize>) -> GridView {
    let trajectory = record.and_then(|r| r.trajectory.as_deref()).unwrap_or(&[]);
    let shown = step.map_or(trajectory, |i| &trajectory[..(i + 1).min(trajectory.len())]);
    let agent = match (step, shown.last(), record.map(|r| r.agent_state)) {
        (Some(_), Some(last), _) => Some(last.next_state),
        (Some(_), None, _) => Some(grid.start()),
        (None, _, Some(AgentState::Cell(pos))) => Some(pos),
        (None, _, _) => record.is_some().then_some(grid.start()),
    };
    let snapshot = record.and_then(|r| r.value_snapshot.as_ref());

    let mut cells = Vec::with_capacity(grid.width() * grid.height());
    for row in 0..grid.height() {
        for col in 0..grid.width() {
            let pos = GridPos::new(row, col);
            let (kind, value) = grid.cell(pos);
            let values = snapshot.and_then(|s| s.get(pos));
            cells.push(CellView {
                pos,
                kind,
                value,
                best_action: snapshot
                    .and_then(|s| s.best_action(pos))
                    .and_then(Direction::from_action),
                max_value: values.and_then(|v| v.iter().copied().reduce(f64::max)),
                is_agent: agent == Some(pos),
                on_trail: shown.iter().any(|s| s.state == pos || s.next_state == pos),
            });
        }
    }
    GridView {
        width: grid.width(),
        height: grid.height(),
        cells,
        agent,
        episode: record.map(|r| r.episode_index),
        reward: record.map(|r| r.reward),
    }
}

#[must_use]
pub fn project_arms(record: Option<&StepRecord>, n_arms: usize) -> ArmsView {
    let stats = record.and_then(|r| r.arm_stats.as_ref());
    let selected = record.and_then(|r| match r.agent_state {
        AgentState::Arm(arm) => Some(arm),
        AgentState::Cell(_) => None,
    });
    let arms = (0..n_arms)
        .map(|index| ArmView {
            index,
            estimate: stats
                .and_then(|s| s.estimates.get(index).copied())
                .unwrap_or(0.0),
            count: stats.and_then(|s| s.counts.get(index).copied()).unwrap_or(0),
            is_selected: selected == Some(index),
            is_optimal: stats.is_some_and(|s| s.optimal_arm == index),
        })
        .collect();
    ArmsView {
        arms,
        episode: record.map(|r| r.episode_index),
        reward: record.map(|r| r.reward),
        optimal_rate: stats.and_then(|s| s.optimal_rate),
    }
}
