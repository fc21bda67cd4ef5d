use std::iter;

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    text::Line,
    widgets::{Block as BlockWidget, BlockExt as _, Widget},
};
use rlplay_engine::{PlaybackPhase, PlaybackState, SimulationSession, StepRecord};
use rlplay_stats::running::RunningStats;

use crate::view::widgets::style;

/// Everything the side panel shows about the run and its playback.
#[derive(Debug, Clone, Copy)]
pub struct RunOverview<'a> {
    pub session: Option<&'a SimulationSession>,
    pub playback: PlaybackState,
    pub phase: PlaybackPhase,
    pub rewards: &'a RunningStats,
    pub record: Option<&'a StepRecord>,
}

pub struct RunStatsDisplay<'a> {
    run: RunOverview<'a>,
    block: Option<BlockWidget<'a>>,
}

impl<'a> RunStatsDisplay<'a> {
    pub fn new(run: RunOverview<'a>) -> Self {
        Self { run, block: None }
    }

    pub fn block(self, block: BlockWidget<'a>) -> Self {
        Self {
            block: Some(block),
            ..self
        }
    }

    pub fn width(&self) -> u16 {
        26 + super::block_horizontal_margin(self.block.as_ref())
    }
}

#[derive(Clone, Copy)]
enum Row {
    Empty,
    FullLabel(&'static str),
    FullValue(&'static dyn Fn(&RunOverview) -> String),
    LabelValue(&'static str, &'static dyn Fn(&RunOverview) -> String),
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

const ROWS: &[Row] = &[
    Row::FullLabel("EPISODE:"),
    Row::FullValue(&|run| {
        let position = (run.playback.buffer_length > 0).then_some(run.playback.current_index + 1);
        format!("{} / {}", or_dash(position), run.playback.buffer_length)
    }),
    Row::LabelValue("PLANNED:", &|run| {
        or_dash(run.session.map(SimulationSession::total_episodes_planned))
    }),
    Row::LabelValue("STATUS:", &|run| {
        run.session
            .map_or_else(|| "imported".to_owned(), |s| s.status().to_string())
    }),
    Row::Empty,
    Row::LabelValue("PLAYBACK:", &|run| run.phase.to_string()),
    Row::LabelValue("SPEED:", &|run| {
        format!("{} ms", run.playback.speed_ms_per_step)
    }),
    Row::Empty,
    Row::LabelValue("REWARD:", &|run| {
        or_dash(run.record.map(|r| format!("{:.3}", r.reward)))
    }),
    Row::LabelValue("STEPS:", &|run| or_dash(run.record.and_then(|r| r.steps))),
    Row::LabelValue("MEAN:", &|run| {
        or_dash(run.rewards.mean().map(|v| format!("{v:.3}")))
    }),
    Row::LabelValue("BEST:", &|run| {
        or_dash(run.rewards.max().map(|v| format!("{v:.3}")))
    }),
    Row::LabelValue("OPTIMAL:", &|run| {
        or_dash(
            run.record
                .and_then(|r| r.arm_stats.as_ref())
                .and_then(|s| s.optimal_rate)
                .map(|rate| format!("{:.1}%", rate * 100.0)),
        )
    }),
];

impl Widget for RunStatsDisplay<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.block.as_ref().render(area, buf);
        let area = self.block.inner_if_some(area);

        let style = style::DEFAULT;

        let rows_areas =
            Layout::vertical((0..ROWS.len()).map(|_| Constraint::Length(1))).split(area);

        for (row, area) in iter::zip(ROWS.iter().copied(), rows_areas[..].iter().copied()) {
            match row {
                Row::Empty => {}
                Row::FullLabel(label) => {
                    Line::styled(label, style).left_aligned().render(area, buf);
                }
                Row::FullValue(value) => {
                    Line::styled(value(&self.run), style)
                        .right_aligned()
                        .render(area, buf);
                }
                Row::LabelValue(label, value) => {
                    let [label_area, value_area] = area.layout(&Layout::horizontal([
                        Constraint::Fill(1),
                        Constraint::Fill(1),
                    ]));
                    Line::styled(label, style)
                        .left_aligned()
                        .render(label_area, buf);
                    Line::styled(value(&self.run), style)
                        .right_aligned()
                        .render(value_area, buf);
                }
            }
        }
    }
}
