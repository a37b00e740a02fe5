//! NDJSON run store
//!
//! One JSON record per line, appended. Lines that fail to parse are skipped
//! when listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{RunRecord, RunStore};
use crate::error::{AppRunError, Result};

pub struct NdjsonRunStore {
    path: PathBuf,
    /// Serializes appends from concurrent submissions
    write_lock: Mutex<()>,
}

impl NdjsonRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn store_error(action: &str, path: &Path, e: impl std::fmt::Display) -> AppRunError {
    AppRunError::Store {
        reason: format!("failed to {action} {}: {e}", path.display()),
    }
}

#[async_trait]
impl RunStore for NdjsonRunStore {
    async fn append(&self, record: RunRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| store_error("create", dir, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| store_error("open", &self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| store_error("write", &self.path, e))?;
        file.flush()
            .await
            .map_err(|e| store_error("flush", &self.path, e))?;

        tracing::debug!(run_id = %record.run_id, path = %self.path.display(), "Recorded run");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RunRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };

        let records = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str::<RunRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(line = n + 1, error = %e, "Skipping unreadable run record");
                    None
                }
            })
            .collect();
        Ok(records)
    }
}
