use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A cell coordinate in the grid world, row-major (`row` = y, `col` = x).
///
/// Serialized as a `[row, col]` pair, which is also how producers encode
/// trajectory states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct GridPos {
    pub row: usize,
    pub col: usize,
}

impl GridPos {
    #[must_use]
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl From<(usize, usize)> for GridPos {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

impl From<GridPos> for (usize, usize) {
    fn from(pos: GridPos) -> Self {
        (pos.row, pos.col)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("invalid grid position key `{_0}`, expected `(row, col)`")]
pub struct ParseGridPosError(#[error(not(source))] String);

impl FromStr for GridPos {
    type Err = ParseGridPosError;

    /// Parses the `"(row, col)"` form used as value-table keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGridPosError(s.to_owned());
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(err)?;
        let (row, col) = inner.split_once(',').ok_or_else(err)?;
        let row = row.trim().parse().map_err(|_| err())?;
        let col = col.trim().parse().map_err(|_| err())?;
        Ok(Self { row, col })
    }
}

/// Grid movement directions, in the producer's action numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[display("up")]
    Up = 0,
    #[display("right")]
    Right = 1,
    #[display("down")]
    Down = 2,
    #[display("left")]
    Left = 3,
}

impl Direction {
    pub const ALL: [Self; 4] = [Self::Up, Self::Right, Self::Down, Self::Left];

    #[must_use]
    pub fn from_action(action: usize) -> Option<Self> {
        Self::ALL.get(action).copied()
    }

    #[must_use]
    pub const fn arrow(self) -> char {
        match self {
            Self::Up => '↑',
            Self::Right => '→',
            Self::Down => '↓',
            Self::Left => '←',
        }
    }
}

/// Where the agent is after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Grid algorithms: the cell the agent ended the episode in.
    Cell(GridPos),
    /// Bandits: the arm that was pulled.
    Arm(usize),
}

/// Action-value table captured after an episode, keyed by grid cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<f64>>",
    into = "BTreeMap<String, Vec<f64>>"
)]
pub struct ValueSnapshot(BTreeMap<GridPos, Vec<f64>>);

impl ValueSnapshot {
    #[must_use]
    pub fn new(values: BTreeMap<GridPos, Vec<f64>>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn get(&self, pos: GridPos) -> Option<&[f64]> {
        self.0.get(&pos).map(Vec::as_slice)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GridPos, &[f64])> + '_ {
        self.0.iter().map(|(pos, values)| (*pos, values.as_slice()))
    }

    /// Returns the greedy action at `pos`, lowest index on ties.
    #[must_use]
    pub fn best_action(&self, pos: GridPos) -> Option<usize> {
        argmax(self.get(pos)?)
    }
}

impl TryFrom<BTreeMap<String, Vec<f64>>> for ValueSnapshot {
    type Error = ParseGridPosError;

    fn try_from(raw: BTreeMap<String, Vec<f64>>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, values)| Ok((key.parse()?, values)))
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl From<ValueSnapshot> for BTreeMap<String, Vec<f64>> {
    fn from(snapshot: ValueSnapshot) -> Self {
        snapshot
            .0
            .into_iter()
            .map(|(pos, values)| (pos.to_string(), values))
            .collect()
    }
}

/// One move inside a grid episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    pub state: GridPos,
    pub action: usize,
    pub reward: f64,
    pub next_state: GridPos,
}

/// Per-arm learner state after a bandit pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub estimates: Vec<f64>,
    /// Pulls per arm. Numeric producers send these as floats (`2.0`).
    #[serde(deserialize_with = "deserialize_counts")]
    pub counts: Vec<u32>,
    pub optimal_arm: usize,
    /// Cumulative fraction of optimal pulls so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimal_rate: Option<f64>,
}

/// Converts a count sent as a JSON number, rejecting negative, fractional
/// and out-of-range values.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn count_from_number(value: f64) -> Option<u32> {
    let in_range = value.is_finite() && value >= 0.0 && value <= f64::from(u32::MAX);
    (in_range && value.fract() <= 0.0).then(|| value as u32)
}

fn deserialize_counts<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Vec::<f64>::deserialize(deserializer)?
        .into_iter()
        .map(|value| {
            count_from_number(value).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid count {value}"))
            })
        })
        .collect()
}

/// One simulation step (bandit pull) or episode (grid run).
///
/// Records are immutable once appended to a
/// [`ResultStore`](crate::engine::ResultStore); a correction means replacing
/// the whole buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub episode_index: u32,
    pub reward: f64,
    pub agent_state: AgentState,
    pub action: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_snapshot: Option<ValueSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_optimal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm_stats: Option<ArmStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Vec<TrajectoryStep>>,
}

impl StepRecord {
    #[must_use]
    pub fn new(episode_index: u32, reward: f64, agent_state: AgentState, action: usize) -> Self {
        Self {
            episode_index,
            reward,
            agent_state,
            action,
            value_snapshot: None,
            is_optimal: None,
            arm_stats: None,
            steps: None,
            trajectory: None,
        }
    }

    #[must_use]
    pub fn with_value_snapshot(mut self, snapshot: ValueSnapshot) -> Self {
        self.value_snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn with_optimal(mut self, is_optimal: bool) -> Self {
        self.is_optimal = Some(is_optimal);
        self
    }

    #[must_use]
    pub fn with_arm_stats(mut self, stats: ArmStats) -> Self {
        self.arm_stats = Some(stats);
        self
    }

    #[must_use]
    pub fn with_trajectory(mut self, trajectory: Vec<TrajectoryStep>) -> Self {
        self.steps = u32::try_from(trajectory.len()).ok();
        self.trajectory = Some(trajectory);
        self
    }
}

/// Index of the largest finite value, lowest index on ties.
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
