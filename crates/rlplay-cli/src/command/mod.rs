use std::path::PathBuf;

use clap::{Parser, Subcommand};

use self::{
    bandit::BanditArg, config::ConfigCommand, replay_stream::ReplayStreamArg, run::RunArg,
};

mod bandit;
mod config;
mod replay_stream;
mod run;
mod summary;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Write logs to this file (the TUI otherwise discards them)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Run an epsilon-greedy multi-armed bandit in-process
    Bandit(#[clap(flatten)] BanditArg),
    /// Run a saved configuration, remote algorithms on the simulation backend
    Run(#[clap(flatten)] RunArg),
    /// Play back a captured server-sent event stream
    ReplayStream(#[clap(flatten)] ReplayStreamArg),
    /// Export or validate saved run configurations
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Mode {
    fn uses_tui(&self) -> bool {
        match self {
            Mode::Bandit(arg) => !arg.headless,
            Mode::Run(arg) => !arg.headless,
            Mode::ReplayStream(arg) => !arg.headless,
            Mode::Config(_) => false,
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    crate::init_tracing(args.log_file.as_deref(), args.mode.uses_tui())?;
    match args.mode {
        Mode::Bandit(arg) => bandit::run(&arg)?,
        Mode::Run(arg) => run::run(&arg)?,
        Mode::ReplayStream(arg) => replay_stream::run(&arg)?,
        Mode::Config(command) => config::run(&command)?,
    }
    Ok(())
}
