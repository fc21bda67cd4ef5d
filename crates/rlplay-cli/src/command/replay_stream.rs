use std::{fs, path::PathBuf};

use anyhow::Context as _;
use rlplay_engine::{
    AgentState, DEFAULT_SPEED_MS, GridLayout, GridPos, NoBackend, ResultStore, ScriptedTransport,
    SessionError, StepRecord, StreamHandle, StreamSink, TransportEvent, projection::Layout, stream::sse::SseDecoder,
};
use serde::Serialize;

use crate::{
    command::summary::RunSummary, tui::Tui, util, util::Output, view::screens::PlaybackScreen,
};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ReplayStreamArg {
    /// Captured `text/event-stream` body of a session
    capture: PathBuf,
    /// Saved run configuration the capture was produced with, used for the
    /// grid layout
    #[arg(long)]
    config: Option<PathBuf>,
    /// Playback speed in milliseconds per step
    #[arg(long, default_value_t = DEFAULT_SPEED_MS)]
    speed: u64,
    /// Decode the capture without the TUI and print a JSON summary
    #[arg(long)]
    pub headless: bool,
    /// Summary output file (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

/// How a captured stream ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Completed,
    Failed(String),
    /// The capture stopped while the stream was still open.
    Truncated,
}

/// Sink that keeps every record of a captured stream, in order.
#[derive(Debug, Default)]
struct Collector {
    store: ResultStore,
    outcome: Option<Outcome>,
}

impl StreamSink for Collector {
    fn on_data(&mut self, record: &StepRecord) -> Result<(), SessionError> {
        self.store
            .append(record.clone())
            .map(|_| ())
            .map_err(|e| SessionError::Protocol(e.to_string()))
    }

    fn on_error(&mut self, error: &SessionError) {
        self.outcome = Some(Outcome::Failed(error.to_string()));
    }

    fn on_complete(&mut self) {
        self.outcome = Some(Outcome::Completed);
    }
}

fn collect(capture: &str) -> Collector {
    let frames = SseDecoder::decode_all(capture);
    tracing::debug!(frames = frames.len(), "decoded capture");
    let transport = ScriptedTransport::new(frames.into_iter().map(TransportEvent::Frame));
    let mut stream = StreamHandle::new(Box::new(transport));
    let mut collector = Collector::default();
    if stream.pump(&mut collector) {
        stream.close();
        collector.outcome = Some(Outcome::Truncated);
    }
    collector
}

/// Picks a layout that fits the recorded states.
fn infer_layout(store: &ResultStore) -> Layout {
    if let Some(stats) = store.iter().find_map(|r| r.arm_stats.as_ref()) {
        return Layout::Arms {
            n_arms: stats.estimates.len(),
        };
    }
    if let Some(n_arms) = store
        .iter()
        .filter_map(|r| match r.agent_state {
            AgentState::Arm(arm) => Some(arm + 1),
            AgentState::Cell(_) => None,
        })
        .max()
    {
        return Layout::Arms { n_arms };
    }

    let default = GridLayout::default();
    let (mut height, mut width) = (default.height, default.width);
    for pos in store.iter().flat_map(recorded_cells) {
        height = height.max(pos.row + 1);
        width = width.max(pos.col + 1);
    }
    if (height, width) == (default.height, default.width) {
        Layout::Grid(default.resolve())
    } else {
        Layout::Grid(GridLayout::empty(width, height).resolve())
    }
}

fn recorded_cells(record: &StepRecord) -> Vec<GridPos> {
    let mut cells = Vec::new();
    if let AgentState::Cell(pos) = record.agent_state {
        cells.push(pos);
    }
    if let Some(snapshot) = &record.value_snapshot {
        cells.extend(snapshot.iter().map(|(pos, _)| pos));
    }
    for step in record.trajectory.iter().flatten() {
        cells.extend([step.state, step.next_state]);
    }
    cells
}

#[derive(Debug, Serialize)]
struct ReplaySummary {
    outcome: Outcome,
    #[serde(flatten)]
    run: RunSummary,
}

pub(crate) fn run(arg: &ReplayStreamArg) -> anyhow::Result<()> {
    let capture = fs::read_to_string(&arg.capture)
        .with_context(|| format!("Failed to read capture: {}", arg.capture.display()))?;
    let Collector { store, outcome } = collect(&capture);
    let outcome = outcome.unwrap_or(Outcome::Truncated);
    match &outcome {
        Outcome::Completed => tracing::info!(episodes = store.len(), "capture decoded"),
        Outcome::Failed(error) => {
            tracing::warn!(episodes = store.len(), %error, "capture ends with an error");
        }
        Outcome::Truncated => {
            tracing::warn!(episodes = store.len(), "capture ends before completion");
        }
    }

    if arg.headless {
        let summary = ReplaySummary {
            outcome,
            run: RunSummary::new(None, &store),
        };
        return Output::save_json(&summary, arg.output.clone());
    }

    anyhow::ensure!(
        !store.is_empty(),
        "capture holds no records: {}",
        arg.capture.display()
    );
    let layout = match &arg.config {
        Some(path) => Layout::for_config(&util::read_run_config(path)?),
        None => infer_layout(&store),
    };
    let label = arg
        .capture
        .file_name()
        .map_or_else(|| "capture".to_owned(), |n| n.to_string_lossy().into_owned());
    let records = store.iter().cloned().collect::<Vec<_>>();
    let mut screen = PlaybackScreen::imported(NoBackend, records, layout, label, arg.speed)?;
    Tui::new().run(&mut screen)?;
    Ok(())
}
