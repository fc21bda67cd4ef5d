use std::{path::PathBuf, time::Duration};

use rlplay_engine::{
    BanditConfig, DEFAULT_SPEED_MS, NoBackend, Playground, RateSample, RunConfig, RunSeed,
};
use serde::Serialize;

use crate::{command::summary::RunSummary, tui::Tui, util::Output, view::screens::PlaybackScreen};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct BanditArg {
    /// Number of arms
    #[arg(long, default_value_t = 5)]
    arms: usize,
    /// Number of pulls
    #[arg(long, default_value_t = 200)]
    episodes: u32,
    /// Exploration probability
    #[arg(long, default_value_t = 0.1)]
    epsilon: f64,
    /// Initial value estimate of every arm
    #[arg(long, default_value_t = 0.0)]
    initial_q: f64,
    /// Seed for a reproducible run (32 hex digits)
    #[arg(long)]
    seed: Option<RunSeed>,
    /// Playback speed in milliseconds per step
    #[arg(long, default_value_t = DEFAULT_SPEED_MS)]
    speed: u64,
    /// Run to completion without the TUI and print a JSON summary
    #[arg(long)]
    pub headless: bool,
    /// Summary output file (defaults to stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

impl BanditArg {
    fn config(&self) -> RunConfig {
        RunConfig::Bandit(BanditConfig {
            n_arms: self.arms,
            n_episodes: self.episodes,
            epsilon: self.epsilon,
            initial_q: self.initial_q,
            seed: self.seed,
            ..BanditConfig::default()
        })
    }
}

#[derive(Debug, Serialize)]
struct BanditSummary {
    seed: RunSeed,
    true_values: Vec<f64>,
    optimal_arm: usize,
    estimates: Vec<f64>,
    counts: Vec<u32>,
    optimal_rate: f64,
    #[serde(flatten)]
    run: RunSummary,
    history: Vec<RateSample>,
}

pub(crate) fn run(arg: &BanditArg) -> anyhow::Result<()> {
    let config = arg.config();
    if arg.headless {
        let summary = run_headless(config)?;
        Output::save_json(&summary, arg.output.clone())?;
        return Ok(());
    }

    let mut screen = PlaybackScreen::start(NoBackend, config, arg.speed)?;
    Tui::new().run(&mut screen)?;
    tracing::info!(
        episodes = screen.playground().store().len(),
        "bandit session closed"
    );
    Ok(())
}

/// Pulls every arm as fast as the deadlines allow, without waiting.
fn run_headless(config: RunConfig) -> anyhow::Result<BanditSummary> {
    let mut playground = Playground::new(NoBackend);
    playground.start_run(config, Duration::ZERO)?;
    while let Some(at) = playground.next_deadline() {
        playground.advance(at);
    }

    let run = RunSummary::new(playground.session(), playground.store());
    let stepper = playground
        .stepper()
        .ok_or_else(|| anyhow::anyhow!("bandit run has no stepper"))?;
    Ok(BanditSummary {
        seed: stepper.seed(),
        true_values: stepper.true_values().to_vec(),
        optimal_arm: stepper.optimal_arm(),
        estimates: stepper.estimates().to_vec(),
        counts: stepper.counts().to_vec(),
        optimal_rate: stepper.optimal_rate(),
        run,
        history: stepper.history().to_vec(),
    })
}
