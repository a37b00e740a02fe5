//! Store Module - run bookkeeping
//!
//! Lightweight, append-only persistence of run handles for later lookup.
//! Bookkeeping is decoupled from the run outcome: a failed append is logged
//! by the caller and never fails a submission.
//!
//! Key types:
//! - `RunRecord`: one submitted run
//! - `RunStore`: append-only store trait
//! - `MemoryRunStore`: in-process store (tests, embedding)
//! - `NdjsonRunStore`: one JSON line per record on disk

mod memory;
mod ndjson;
mod record;

pub use memory::MemoryRunStore;
pub use ndjson::NdjsonRunStore;
pub use record::{RunRecord, RunRecordDraft};

use async_trait::async_trait;

use crate::error::Result;

/// Append-only run bookkeeping
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Append a record
    async fn append(&self, record: RunRecord) -> Result<()>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<RunRecord>>;
}
