use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use rlplay_engine::{DEFAULT_SPEED_MS, Playground, RunConfig, SimulationBackend};

use crate::{
    command::summary::RunSummary, http::HttpBackend, tui::Tui, util, util::Output,
    view::screens::PlaybackScreen,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    /// Saved run configuration (JSON)
    config: PathBuf,
    /// Base URL of the simulation backend
    #[arg(long, env = "RLPLAY_API_BASE", default_value = "http://localhost:8000")]
    api_base: String,
    /// Playback speed in milliseconds per step
    #[arg(long, default_value_t = DEFAULT_SPEED_MS)]
    speed: u64,
    /// Wait for the run to finish without the TUI and print a JSON summary
    #[arg(long)]
    pub headless: bool,
    /// Summary output file (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let config = util::read_run_config(&arg.config)?;
    tracing::info!(
        algorithm = %config.algorithm(),
        episodes = config.planned_episodes(),
        remote = config.execution().is_remote(),
        "starting run"
    );
    let backend = HttpBackend::new(&arg.api_base)?;

    if arg.headless {
        let summary = run_headless(backend, config)?;
        Output::save_json(&summary, arg.output.clone())?;
        if summary.is_failure() {
            anyhow::bail!(
                "run failed: {}",
                summary.error.as_deref().unwrap_or("unknown error")
            );
        }
        return Ok(());
    }

    let mut screen = PlaybackScreen::start(backend, config, arg.speed)?;
    Tui::new().run(&mut screen)?;
    if let Some(session) = screen.playground().session() {
        tracing::info!(id = %session.id(), status = %session.status(), "run closed");
    }
    Ok(())
}

/// Drives the run in real time until its session reaches a terminal state.
fn run_headless<B>(backend: B, config: RunConfig) -> anyhow::Result<RunSummary>
where
    B: SimulationBackend,
{
    let mut playground = Playground::new(backend);
    let origin = Instant::now();
    playground.start_run(config, Duration::ZERO)?;
    loop {
        let now = origin.elapsed();
        playground.advance(now);
        if playground.session().is_none_or(|s| s.is_terminal()) {
            break;
        }
        let wait = playground
            .next_deadline()
            .map_or(POLL_INTERVAL, |at| at.saturating_sub(now).min(POLL_INTERVAL));
        thread::sleep(wait);
    }
    Ok(RunSummary::new(playground.session(), playground.store()))
}

#[cfg(test)]
mod tests {
    use rlplay_engine::{
        Algorithm, BackendError, RunAck, RunRequest, ScriptedTransport, SessionId,
        SessionStatus, Transport,
    };

    use super::*;

    #[derive(Debug)]
    struct CannedBackend {
        frames: Vec<String>,
    }

    impl SimulationBackend for CannedBackend {
        fn start(&mut self, request: &RunRequest) -> Result<RunAck, BackendError> {
            assert_eq!(request.algorithm, Algorithm::QLearning);
            Ok(RunAck {
                session_id: SessionId::new("remote-1"),
                total_episodes: 10,
            })
        }

        fn open_stream(&mut self, _id: &SessionId) -> Result<Box<dyn Transport>, BackendError> {
            Ok(Box::new(ScriptedTransport::from_frames(self.frames.clone())))
        }
    }

    fn record_frame(episode: u32) -> String {
        format!(r#"{{"episode": {episode}, "total_reward": 1.0, "steps": 4}}"#)
    }

    #[test]
    fn test_headless_remote_run_completes() {
        let mut frames = vec![r#"{"status": "started"}"#.to_owned()];
        frames.extend((0..3).map(record_frame));
        frames.push(r#"{"status": "completed"}"#.to_owned());

        let summary = run_headless(
            CannedBackend { frames },
            RunConfig::default_for(Algorithm::QLearning),
        )
        .unwrap();
        assert_eq!(summary.status, Some(SessionStatus::Completed));
        assert_eq!(summary.session_id.as_deref(), Some("remote-1"));
        assert_eq!(summary.episodes, 3);
        assert!(!summary.is_failure());
    }

    #[test]
    fn test_headless_remote_run_reports_failure() {
        let frames = vec![
            record_frame(0),
            r#"{"status": "error", "error": "diverged"}"#.to_owned(),
        ];
        let summary = run_headless(
            CannedBackend { frames },
            RunConfig::default_for(Algorithm::QLearning),
        )
        .unwrap();
        assert!(summary.is_failure());
        assert_eq!(summary.episodes, 1);
        assert!(summary.error.unwrap().contains("diverged"));
    }
}
