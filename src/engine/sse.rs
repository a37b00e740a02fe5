//! Run id recovery from the engine's event stream
//!
//! The engine streams server-sent events, one JSON payload per `data:` line:
//!
//! ```text
//! data: {"type":"run_status","content":{"status":"running","run_id":"abc"}}
//!
//! data: {"type":"block_status","content":{...}}
//! ```
//!
//! Chunk boundaries are arbitrary, so lines are reassembled before parsing.
//! Only the first run id is reported.

use serde_json::Value;

#[derive(Debug, Default)]
pub struct RunIdSniffer {
    pending: Vec<u8>,
    found: bool,
}

impl RunIdSniffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns the run id the first time it is seen
    pub fn feed(&mut self, chunk: &[u8]) -> Option<String> {
        if self.found {
            return None;
        }
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(run_id) = run_id_from_line(&line) {
                return Some(self.settle(run_id));
            }
        }
        None
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        if self.found || self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        run_id_from_line(&line).map(|run_id| self.settle(run_id))
    }

    pub fn found(&self) -> bool {
        self.found
    }

    fn settle(&mut self, run_id: String) -> String {
        self.found = true;
        self.pending = Vec::new();
        run_id
    }
}

fn run_id_from_line(line: &[u8]) -> Option<String> {
    let line = std::str::from_utf8(line).ok()?.trim();
    let data = line.strip_prefix("data:")?.trim_start();
    let event: Value = serde_json::from_str(data).ok()?;

    event
        .get("content")
        .and_then(|content| content.get("run_id"))
        .or_else(|| event.get("run_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
