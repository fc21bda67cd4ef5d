//! Server-sent event decoding.
//!
//! Only the `data` field matters to the session stream: consecutive `data:`
//! lines are joined with `\n` and dispatched as one payload on a blank line.
//! Comment lines (leading `:`) and other fields are skipped, and a trailing
//! event that is not terminated by a blank line is discarded.

use std::io::{self, BufRead};

/// Incremental, line-oriented SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    data: Vec<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line (without its `\n`) and returns a payload when the line
    /// completes an event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(payload);
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        if field == "data" {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_owned());
        }
        None
    }

    /// Decodes a complete capture held in memory.
    #[must_use]
    pub fn decode_all(input: &str) -> Vec<String> {
        let mut decoder = Self::new();
        input
            .lines()
            .filter_map(|line| decoder.push_line(line))
            .collect()
    }
}

/// Iterator over the payloads of an SSE byte stream.
#[derive(Debug)]
pub struct SseEvents<R> {
    reader: R,
    decoder: SseDecoder,
    line: String,
}

impl<R> SseEvents<R>
where
    R: BufRead,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            decoder: SseDecoder::new(),
            line: String::new(),
        }
    }
}

impl<R> Iterator for SseEvents<R>
where
    R: BufRead,
{
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = self.line.strip_suffix('\n').unwrap_or(&self.line);
                    if let Some(payload) = self.decoder.push_line(line) {
                        return Some(Ok(payload));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
