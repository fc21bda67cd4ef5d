use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use rlplay_engine::{RunConfig, SavedConfig};
use serde::{Serialize, de::DeserializeOwned};

/// Destination of a JSON report: stdout, or a file when `-o` is given.
pub enum Output {
    Stdout(io::StdoutLock<'static>),
    File(BufWriter<File>, PathBuf),
}

impl Output {
    /// Pretty-prints `value` to `path` (stdout when `None`).
    pub fn save_json<T>(value: &T, path: Option<PathBuf>) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        let mut output = match path {
            Some(path) => {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?;
                Output::File(BufWriter::new(file), path)
            }
            None => Output::Stdout(io::stdout().lock()),
        };
        output.write_json(value)
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Output::Stdout(writer) => writer,
            Output::File(writer, _) => writer,
        }
    }

    fn write_json<T>(&mut self, value: &T) -> anyhow::Result<()>
    where
        T: Serialize,
    {
        serde_json::to_writer_pretty(self.writer(), value)
            .with_context(|| format!("Failed to write JSON to {self}"))?;
        writeln!(self.writer())
            .and_then(|()| self.writer().flush())
            .with_context(|| format!("Failed to flush output to {self}"))?;
        Ok(())
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout(_) => f.write_str("stdout"),
            Output::File(_, path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {file_kind} file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {file_kind} JSON file: {}", path.display()))
}

/// Reads a saved run configuration and resolves it into a validated
/// [`RunConfig`].
pub fn read_run_config<P>(path: P) -> anyhow::Result<RunConfig>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let saved: SavedConfig = read_json_file("run config", path)?;
    saved
        .to_run_config()
        .with_context(|| format!("Invalid run config: {}", path.display()))
}
