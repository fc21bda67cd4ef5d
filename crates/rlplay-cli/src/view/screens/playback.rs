use std::{
    cell::RefCell,
    rc::Rc,
    time::{Duration, Instant},
};

use crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    Frame,
    layout::{Constraint, HorizontalAlignment, Layout as UiLayout},
    style::Style,
    text::{Line, Span},
    widgets::{Block as BlockWidget, Padding, Paragraph},
};
use rlplay_engine::{
    BufferView, PlaybackController, Playground, RunConfig, SimulationBackend, StepRecord,
    projection::{self, Layout, Projection},
};

use crate::{
    tui::{App, RenderMode, Tui},
    view::widgets::{ArmsDisplay, GridDisplay, RunOverview, RunStatsDisplay, style},
};

const FRAME_RATE: f64 = 30.0;
const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_MESSAGES: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    TogglePlay,
    Reset,
    Prev(usize),
    Next(usize),
    First,
    Last,
    Faster,
    Slower,
    NewRun,
    Trajectory,
    Quit,
}

type KeyBinding = (&'static [&'static str], &'static str);

impl Action {
    fn from_key_event(event: &KeyEvent) -> Option<Self> {
        match event.code {
            KeyCode::Char(' ') => Some(Self::TogglePlay),
            KeyCode::Char('r') => Some(Self::Reset),
            KeyCode::Char('k') | KeyCode::Up => Some(Self::Prev(1)),
            KeyCode::Char('j') | KeyCode::Down => Some(Self::Next(1)),
            KeyCode::Char('h') | KeyCode::Left => Some(Self::Prev(10)),
            KeyCode::Char('l') | KeyCode::Right => Some(Self::Next(10)),
            KeyCode::Char('g') | KeyCode::Home => Some(Self::First),
            KeyCode::Char('G') | KeyCode::End => Some(Self::Last),
            KeyCode::Char('+' | '=') => Some(Self::Faster),
            KeyCode::Char('-') => Some(Self::Slower),
            KeyCode::Char('n') => Some(Self::NewRun),
            KeyCode::Char('t') => Some(Self::Trajectory),
            KeyCode::Char('q') | KeyCode::Esc => Some(Self::Quit),
            _ => None,
        }
    }

    fn bindings(trajectory: bool) -> &'static [KeyBinding] {
        if trajectory {
            &[
                (&["Space"], "Play/Pause"),
                (&["k", "j"], "Prev/Next move"),
                (&["g", "G"], "First/Last"),
                (&["+", "-"], "Speed"),
                (&["t"], "Back"),
                (&["q"], "Quit"),
            ]
        } else {
            &[
                (&["Space"], "Play/Pause"),
                (&["r"], "Reset"),
                (&["k", "j"], "Prev/Next"),
                (&["h", "l"], "±10"),
                (&["g", "G"], "First/Last"),
                (&["+", "-"], "Speed"),
                (&["t"], "Trajectory"),
                (&["n"], "New run"),
                (&["q"], "Quit"),
            ]
        }
    }
}

/// Where the records on screen come from.
#[derive(Debug, Clone)]
pub enum RunSource {
    /// A run that can be started again with `n`.
    Config(RunConfig),
    /// Records loaded up front; there is nothing to restart.
    Imported { label: String },
}

/// Messages pushed by session callbacks, newest last.
#[derive(Debug, Clone, Default)]
struct MessageLog {
    entries: Rc<RefCell<Vec<(Style, String)>>>,
}

impl MessageLog {
    fn push(&self, style: Style, message: String) {
        let mut entries = self.entries.borrow_mut();
        if entries.len() == MAX_MESSAGES {
            entries.remove(0);
        }
        entries.push((style, message));
    }

    fn last(&self) -> Option<(Style, String)> {
        self.entries.borrow().last().cloned()
    }
}

/// Stepping through the moves of one grid episode.
#[derive(Debug)]
struct TrajectoryCursor {
    record_index: usize,
    moves: usize,
    playback: PlaybackController,
}

impl TrajectoryCursor {
    fn view(&self) -> BufferView {
        BufferView::finished(self.moves)
    }
}

/// Live playback of a run: production and playback advance on their own
/// timers while the user scrubs through the recorded episodes.
#[derive(Debug)]
pub struct PlaybackScreen<B> {
    playground: Playground<B>,
    source: RunSource,
    layout: Layout,
    origin: Instant,
    trajectory: Option<TrajectoryCursor>,
    messages: MessageLog,
    /// Start playing as soon as the first record is available.
    autoplay: bool,
    is_exiting: bool,
}

impl<B> PlaybackScreen<B>
where
    B: SimulationBackend,
{
    /// Starts `config` and shows it as it is produced.
    pub fn start(backend: B, config: RunConfig, speed_ms: u64) -> anyhow::Result<Self> {
        let mut screen = Self {
            playground: Playground::new(backend),
            layout: Layout::for_config(&config),
            source: RunSource::Config(config.clone()),
            origin: Instant::now(),
            trajectory: None,
            messages: MessageLog::default(),
            autoplay: true,
            is_exiting: false,
        };
        screen.playground.set_speed(speed_ms);
        screen.start_run(config)?;
        Ok(screen)
    }

    /// Shows records that were loaded up front.
    pub fn imported<I>(
        backend: B,
        records: I,
        layout: Layout,
        label: impl Into<String>,
        speed_ms: u64,
    ) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = StepRecord>,
    {
        let mut playground = Playground::new(backend);
        playground.import(records)?;
        playground.set_speed(speed_ms);
        Ok(Self {
            playground,
            layout,
            source: RunSource::Imported {
                label: label.into(),
            },
            origin: Instant::now(),
            trajectory: None,
            messages: MessageLog::default(),
            autoplay: true,
            is_exiting: false,
        })
    }

    pub fn playground(&self) -> &Playground<B> {
        &self.playground
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn start_run(&mut self, config: RunConfig) -> anyhow::Result<()> {
        let now = self.now();
        let messages = self.messages.clone();
        let mut handle = self.playground.start_run(config, now)?;
        let id = handle.id().to_string();
        messages.push(style::DIM, format!("run {id} started"));
        let log = messages.clone();
        handle.on_error(move |e| log.push(style::ERROR, format!("error: {e}")));
        let log = messages;
        handle.on_complete(move || log.push(style::DIM, format!("run {id} completed")));
        self.trajectory = None;
        self.autoplay = true;
        Ok(())
    }

    fn restart(&mut self) {
        let RunSource::Config(config) = &self.source else {
            return;
        };
        let config = config.clone();
        if let Err(e) = self.start_run(config) {
            tracing::warn!(error = %e, "could not start a new run");
            self.messages.push(style::ERROR, format!("{e:#}"));
        }
    }

    fn toggle_trajectory(&mut self) {
        if self.trajectory.take().is_some() {
            return;
        }
        let index = self.playground.playback().current_index();
        let moves = self
            .playground
            .current_record()
            .and_then(|r| r.trajectory.as_ref())
            .map_or(0, Vec::len);
        if moves == 0 {
            return;
        }
        self.playground.pause();
        self.autoplay = false;
        let mut playback = PlaybackController::new();
        playback.set_speed(self.playground.playback().speed_ms());
        let mut cursor = TrajectoryCursor {
            record_index: index,
            moves,
            playback,
        };
        cursor.playback.sync(cursor.view());
        self.trajectory = Some(cursor);
    }

    fn apply(&mut self, action: Action) {
        let now = self.now();
        match action {
            Action::Quit => {
                self.is_exiting = true;
                return;
            }
            Action::Trajectory => {
                self.toggle_trajectory();
                return;
            }
            _ => {}
        }
        if let Some(cursor) = &mut self.trajectory {
            let view = cursor.view();
            let playback = &mut cursor.playback;
            match action {
                Action::TogglePlay => playback.toggle(view, now),
                Action::Prev(_) => playback.step_by(-1, view),
                Action::Next(_) => playback.step_by(1, view),
                Action::First => playback.set_index(0, view),
                Action::Last => playback.set_index(view.len.saturating_sub(1), view),
                Action::Faster => playback.speed_up(),
                Action::Slower => playback.slow_down(),
                Action::Reset => playback.reset(view),
                Action::NewRun | Action::Trajectory | Action::Quit => {}
            }
            return;
        }

        if !matches!(action, Action::Faster | Action::Slower) {
            self.autoplay = false;
        }
        let playground = &mut self.playground;
        match action {
            Action::TogglePlay => playground.toggle_playback(now),
            Action::Reset => playground.reset_playback(),
            Action::Prev(amount) => playground.step_by(-isize::try_from(amount).unwrap_or(1)),
            Action::Next(amount) => playground.step_by(isize::try_from(amount).unwrap_or(1)),
            Action::First => playground.set_index(0),
            Action::Last => {
                let len = playground.store().len();
                playground.set_index(len.saturating_sub(1));
            }
            Action::Faster => playground.speed_up(),
            Action::Slower => playground.slow_down(),
            Action::NewRun => self.restart(),
            Action::Trajectory | Action::Quit => {}
        }
    }

    fn title(&self) -> String {
        match (&self.source, self.playground.session()) {
            (RunSource::Imported { label }, _) => format!("rlplay: {label}"),
            (RunSource::Config(_), Some(session)) => {
                format!("rlplay: {} [{}]", session.algorithm(), session.id())
            }
            (RunSource::Config(config), None) => format!("rlplay: {}", config.algorithm()),
        }
    }

    fn projection(&self) -> Projection {
        let record = match &self.trajectory {
            Some(cursor) => self.playground.store().get(cursor.record_index),
            None => self.playground.current_record(),
        };
        match (&self.layout, &self.trajectory) {
            (Layout::Grid(grid), Some(cursor)) => Projection::Grid(projection::project_grid(
                record,
                grid,
                Some(cursor.playback.current_index()),
            )),
            _ => projection::project(record, &self.layout),
        }
    }

    fn help_line(&self) -> Line<'static> {
        let mut spans = vec![];
        for (i, (keys, desc)) in Action::bindings(self.trajectory.is_some())
            .iter()
            .copied()
            .enumerate()
        {
            if i > 0 {
                spans.push(Span::styled(" | ", style::DIM));
            }
            spans.push(Span::styled(keys.join("/"), style::ARM_SELECTED));
            spans.push(Span::from(" "));
            spans.push(Span::styled(desc, style::DEFAULT));
        }
        Line::from(spans).centered()
    }
}

impl<B> App for PlaybackScreen<B>
where
    B: SimulationBackend,
{
    fn init(&mut self, tui: &mut Tui) {
        tui.set_render_mode(RenderMode::throttled_from_rate(FRAME_RATE));
        // remote frames arrive without a deadline of their own
        let remote =
            matches!(&self.source, RunSource::Config(config) if config.execution().is_remote());
        tui.set_poll_interval(remote.then_some(STREAM_POLL_INTERVAL));
    }

    fn should_exit(&self) -> bool {
        self.is_exiting
    }

    fn handle_event(&mut self, _tui: &mut Tui, event: Event) {
        if let Some(event) = event.as_key_event()
            && let Some(action) = Action::from_key_event(&event)
        {
            self.apply(action);
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let top_block = BlockWidget::bordered()
            .title(self.title())
            .title_alignment(HorizontalAlignment::Center)
            .padding(Padding::symmetric(1, 0));
        let viewport = frame.area();
        let inner = top_block.inner(viewport);
        frame.render_widget(top_block, viewport);

        let [main_area, message_area, help_area] = UiLayout::vertical([
            Constraint::Fill(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(inner);

        let overview = RunOverview {
            session: self.playground.session(),
            playback: self.playground.playback_state(),
            phase: self.playground.playback_phase(),
            rewards: self.playground.store().stats(),
            record: self.playground.current_record(),
        };
        let stats = RunStatsDisplay::new(overview).block(BlockWidget::bordered().title("Run"));
        let [view_area, stats_area] = UiLayout::horizontal([
            Constraint::Fill(1),
            Constraint::Length(stats.width()),
        ])
        .areas(main_area);
        frame.render_widget(stats, stats_area);

        match self.projection() {
            Projection::Grid(view) => {
                let title = match &self.trajectory {
                    Some(cursor) => format!(
                        "Move {}/{}",
                        cursor.playback.current_index() + 1,
                        cursor.moves
                    ),
                    None => "Values".to_owned(),
                };
                let grid = GridDisplay::new(&view).block(BlockWidget::bordered().title(title));
                let area = view_area.centered(
                    Constraint::Length(grid.width()),
                    Constraint::Length(grid.height()),
                );
                frame.render_widget(grid, area);
            }
            Projection::Arms(view) => {
                let arms = ArmsDisplay::new(&view).block(BlockWidget::bordered().title("Arms"));
                let area = view_area.centered_vertically(Constraint::Length(arms.height()));
                frame.render_widget(arms, area);
            }
        }

        if let Some((style, message)) = self.messages.last() {
            frame.render_widget(Paragraph::new(message).style(style), message_area);
        }
        frame.render_widget(self.help_line(), help_area);
    }

    fn update(&mut self, _tui: &mut Tui, now: Instant) {
        let now = now.saturating_duration_since(self.origin);
        self.playground.advance(now);
        if self.autoplay && self.playground.playback_phase().is_ready() {
            self.playground.play(now);
        }
        if let Some(cursor) = &mut self.trajectory
            && cursor.playback.deadline().is_some_and(|at| at <= now)
        {
            let view = cursor.view();
            cursor.playback.tick(now, view);
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        let trajectory = self
            .trajectory
            .as_ref()
            .and_then(|cursor| cursor.playback.deadline());
        [self.playground.next_deadline(), trajectory]
            .into_iter()
            .flatten()
            .min()
            .map(|at| self.origin + at)
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyModifiers;
    use rlplay_engine::{
        AgentState, BanditConfig, CellKind, GridCell, GridLayout, GridPos, NoBackend,
        PlaybackPhase, RunSeed, TrajectoryStep,
    };

    use super::*;

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    fn bandit() -> RunConfig {
        RunConfig::Bandit(BanditConfig {
            n_episodes: 20,
            seed: Some(RunSeed::from_u128(3)),
            ..BanditConfig::default()
        })
    }

    fn run_until(screen: &mut PlaybackScreen<NoBackend>, tui: &mut Tui, until: Duration) {
        while let Some(at) = screen.next_wake()
            && at <= screen.origin + until
        {
            screen.update(tui, at);
        }
    }

    #[test]
    fn test_key_mapping() {
        let action =
            |c| Action::from_key_event(&KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        assert_eq!(action(' '), Some(Action::TogglePlay));
        assert_eq!(action('l'), Some(Action::Next(10)));
        assert_eq!(action('G'), Some(Action::Last));
        assert_eq!(action('x'), None);
    }

    #[test]
    fn test_live_bandit_autoplays_to_finish() {
        let mut tui = Tui::new();
        let mut screen = PlaybackScreen::start(NoBackend, bandit(), 10).unwrap();
        run_until(&mut screen, &mut tui, Duration::from_secs(5));
        let playground = screen.playground();
        assert_eq!(playground.store().len(), 20);
        assert_eq!(playground.playback_phase(), PlaybackPhase::Finished);
        assert!(screen.next_wake().is_none());
    }

    #[test]
    fn test_user_input_stops_autoplay() {
        let mut tui = Tui::new();
        let mut screen = PlaybackScreen::start(NoBackend, bandit(), 10).unwrap();
        screen.handle_event(&mut tui, key('g'));
        run_until(&mut screen, &mut tui, Duration::from_secs(5));
        assert_eq!(screen.playground().store().len(), 20);
        assert_eq!(screen.playground().playback_state().current_index, 0);
        assert!(!screen.playground().playback_state().is_playing);
    }

    #[test]
    fn test_new_run_starts_fresh_session() {
        let mut tui = Tui::new();
        let mut screen = PlaybackScreen::start(NoBackend, bandit(), 10).unwrap();
        run_until(&mut screen, &mut tui, Duration::from_secs(5));
        screen.handle_event(&mut tui, key('n'));
        let session = screen.playground().session().unwrap();
        assert_eq!(session.id().as_str(), "local-2");
        assert!(screen.playground().store().is_empty());
    }

    #[test]
    fn test_trajectory_stepping() {
        let step = |from: (usize, usize), to: (usize, usize)| TrajectoryStep {
            state: from.into(),
            action: 1,
            reward: 0.0,
            next_state: to.into(),
        };
        let record = StepRecord::new(0, 1.0, AgentState::Cell(GridPos::new(0, 2)), 1)
            .with_trajectory(vec![step((0, 0), (0, 1)), step((0, 1), (0, 2))]);
        let grid = GridLayout::empty(3, 3)
            .with_cell(GridCell::new(2, 0, CellKind::Goal, 10.0))
            .resolve();
        let mut tui = Tui::new();
        let mut screen =
            PlaybackScreen::imported(NoBackend, [record], Layout::Grid(grid), "capture", 10)
                .unwrap();

        screen.handle_event(&mut tui, key('t'));
        let Projection::Grid(view) = screen.projection() else {
            panic!("expected a grid");
        };
        assert_eq!(view.agent, Some(GridPos::new(0, 1)));

        screen.handle_event(&mut tui, key('j'));
        let Projection::Grid(view) = screen.projection() else {
            panic!("expected a grid");
        };
        assert_eq!(view.agent, Some(GridPos::new(0, 2)));

        // leaving the trajectory shows the whole episode again
        screen.handle_event(&mut tui, key('t'));
        assert!(screen.trajectory.is_none());
    }
}
