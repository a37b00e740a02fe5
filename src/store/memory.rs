//! In-memory run store

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{RunRecord, RunStore};
use crate::error::Result;

/// Thread-safe, append-only in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryRunStore {
    records: Arc<RwLock<Vec<RunRecord>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Snapshot of the records (no await needed)
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn append(&self, record: RunRecord) -> Result<()> {
        self.records.write().push(record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RunRecord>> {
        Ok(self.records())
    }
}
