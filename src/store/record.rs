//! Run records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RunRunType;

/// A submitted run, as kept for later lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub app_id: String,
    pub run_type: RunRunType,
    pub user_id: String,
    pub workspace_id: String,
    pub created: DateTime<Utc>,
}

/// Everything about a record except the engine's run id
///
/// Streaming runs only learn their id after the stream drained.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecordDraft {
    pub app_id: String,
    pub run_type: RunRunType,
    pub user_id: String,
    pub workspace_id: String,
}

impl RunRecordDraft {
    /// Complete the draft with the run id, stamped now
    pub fn finish(self, run_id: impl Into<String>) -> RunRecord {
        RunRecord {
            run_id: run_id.into(),
            app_id: self.app_id,
            run_type: self.run_type,
            user_id: self.user_id,
            workspace_id: self.workspace_id,
            created: Utc::now(),
        }
    }
}
