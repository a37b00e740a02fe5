//! Engine runs, statuses and traces
//!
//! A trace is the engine's per-block record of a run, one entry per block in
//! execution order:
//!
//! ```text
//! [ [ [block_type, block_name], layer ], ... ]
//!   layer = [ row, ... ]          one row per input in the batch
//!   row   = [ {value, error}, ...] one cell per fan-out replica
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::block::BlockType;

/// Lifecycle state of a run or of one of its blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Succeeded,
    Errored,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Errored => "errored",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the run was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunRunType {
    #[default]
    Deploy,
    Local,
    Execute,
}

impl fmt::Display for RunRunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunRunType::Deploy => "deploy",
            RunRunType::Local => "local",
            RunRunType::Execute => "execute",
        })
    }
}

/// Per-block config sent to (and echoed by) the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunConfig {
    #[serde(default)]
    pub blocks: Map<String, Value>,
}

/// Live status of a single block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatus {
    pub block_type: BlockType,
    pub name: String,
    pub status: RunState,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub error_count: u64,
}

impl BlockStatus {
    /// `(successes, errors)` to display while the block is still running.
    ///
    /// `None` once the block is terminal, and always for block types that do
    /// not produce data of their own step by step (`map`, `reduce`, `end`).
    pub fn live_progress(&self) -> Option<(u64, u64)> {
        if self.status == RunState::Running && self.block_type.shows_live_progress() {
            Some((self.success_count, self.error_count))
        } else {
            None
        }
    }
}

/// Overall run status with per-block detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run: RunState,
    #[serde(default)]
    pub blocks: Vec<BlockStatus>,
}

impl RunStatus {
    pub fn new(run: RunState) -> Self {
        Self {
            run,
            blocks: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run == RunState::Running
    }
}

// ═══════════════════════════════════════════════════════════════
// TRACES
// ═══════════════════════════════════════════════════════════════

/// One execution result: a value or an error.
///
/// A cell decoded from the engine serializes back with the keys it came
/// with. Cells built in this crate always carry an explicit `error` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireCell", into = "WireCell")]
pub struct TraceCell {
    pub value: Option<Value>,
    pub error: Option<String>,
    error_key: bool,
}

/// `{value, error}` as on the wire; `error` is `None` when the key is absent
#[derive(Serialize, Deserialize)]
struct WireCell {
    #[serde(default)]
    value: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present_key",
        skip_serializing_if = "Option::is_none"
    )]
    error: Option<Option<String>>,
}

fn present_key<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl From<WireCell> for TraceCell {
    fn from(wire: WireCell) -> Self {
        Self {
            value: wire.value,
            error_key: wire.error.is_some(),
            error: wire.error.flatten(),
        }
    }
}

impl From<TraceCell> for WireCell {
    fn from(cell: TraceCell) -> Self {
        let error = (cell.error_key || cell.error.is_some()).then_some(cell.error);
        Self {
            value: cell.value,
            error,
        }
    }
}

/// Engine errors from sandboxed code carry a stack frame suffix starting here
const SANDBOX_FRAME_MARKER: &str = " (sandboxed.js";

impl TraceCell {
    pub fn new(value: Option<Value>, error: Option<String>) -> Self {
        Self {
            value,
            error,
            error_key: true,
        }
    }

    pub fn ok(value: Value) -> Self {
        Self::new(Some(value), None)
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self::new(None, Some(error.into()))
    }

    /// A cell holds an error when its error is a non-empty string
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Error text without the sandbox stack frame suffix
    pub fn display_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(|e| e.split(SANDBOX_FRAME_MARKER).next().unwrap_or(e))
    }
}

/// Results of one input, one cell per fan-out replica
pub type Row = Vec<TraceCell>;

/// Results of one block, one row per input in the batch
pub type Layer = Vec<Row>;

/// `(block_type, block_name)` identifying a trace entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub block_type: BlockType,
    pub name: String,
}

/// Wire form: `[[block_type, name], layer]`
type RawTraceEntry = ((BlockType, String), Layer);

/// A block's layer in the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTraceEntry", into = "RawTraceEntry")]
pub struct TraceEntry {
    pub block: BlockKey,
    pub layer: Layer,
}

impl TraceEntry {
    pub fn new(block_type: BlockType, name: impl Into<String>, layer: Layer) -> Self {
        Self {
            block: BlockKey {
                block_type,
                name: name.into(),
            },
            layer,
        }
    }

    pub fn name(&self) -> &str {
        &self.block.name
    }

    pub fn block_type(&self) -> BlockType {
        self.block.block_type
    }
}

impl From<RawTraceEntry> for TraceEntry {
    fn from(((block_type, name), layer): RawTraceEntry) -> Self {
        TraceEntry::new(block_type, name, layer)
    }
}

impl From<TraceEntry> for RawTraceEntry {
    fn from(entry: TraceEntry) -> Self {
        ((entry.block.block_type, entry.block.name), entry.layer)
    }
}

// ═══════════════════════════════════════════════════════════════
// RUN
// ═══════════════════════════════════════════════════════════════

/// A run as seen by the caller
///
/// The engine names the specification hash `app_hash`; it is accepted on the
/// way in and always exposed as `specification_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunType {
    pub run_id: String,
    pub created: i64,
    pub run_type: RunRunType,
    #[serde(default, alias = "app_hash")]
    pub specification_hash: Option<String>,
    #[serde(default)]
    pub config: RunConfig,
    pub status: RunStatus,
    #[serde(default)]
    pub traces: Vec<TraceEntry>,
    #[serde(default)]
    pub results: Option<Layer>,
}

impl RunType {
    /// Trace entry for a given block, if the block executed
    pub fn trace_for(&self, block_type: BlockType, name: &str) -> Option<&TraceEntry> {
        self.traces
            .iter()
            .find(|t| t.block.block_type == block_type && t.block.name == name)
    }
}
