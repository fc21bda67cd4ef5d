use std::{fs::File, path::Path, sync::Mutex};

use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

mod command;
mod http;
mod tui;
mod util;
mod view;

fn main() -> anyhow::Result<()> {
    command::run()
}

/// Installs the global subscriber, filtered by `RUST_LOG`.
///
/// While the TUI owns the terminal, logs go to `log_file` or nowhere.
fn init_tracing(log_file: Option<&Path>, tui: bool) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env());
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None if tui => {}
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
    Ok(())
}
