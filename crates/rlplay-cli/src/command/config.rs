use std::path::PathBuf;

use rlplay_engine::{Algorithm, RunConfig, SavedConfig};

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Subcommand)]
pub(crate) enum ConfigCommand {
    /// Write the default configuration of an algorithm
    Export {
        /// Algorithm id (bandit, qlearning, sarsa, td_lambda, reinforce, a2c, trpo, ppo)
        algorithm: Algorithm,
        /// Output file (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Check that a saved configuration loads and passes validation
    Validate {
        /// Saved run configuration (JSON)
        config: PathBuf,
    },
}

pub(crate) fn run(command: &ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Export { algorithm, output } => {
            let saved = SavedConfig::from_run_config(&RunConfig::default_for(*algorithm));
            Output::save_json(&saved, output.clone())?;
        }
        ConfigCommand::Validate { config } => {
            let config = util::read_run_config(config)?;
            println!(
                "valid: {}, {} episodes",
                config.algorithm(),
                config.planned_episodes()
            );
        }
    }
    Ok(())
}
