//! # Engine Abstraction Layer
//!
//! The execution engine is a black box that owns block interpretation. The
//! orchestrator talks to it through four operations:
//!
//! - [`Engine::create_run`] - start a run, returns immediately
//! - [`Engine::create_run_stream`] - start a run and stream its events
//! - [`Engine::get_run_status`] - cheap status query used while polling
//! - [`Engine::get_run`] - full run with traces
//!
//! ## Implementations
//!
//! | Engine | Use Case |
//! |--------|----------|
//! | [`HttpEngine`] | Production, JSON/SSE over HTTP |
//! | [`MockEngine`] | Tests and benches, scripted responses |

mod http;
mod mock;
mod sse;

pub use http::HttpEngine;
pub use mock::MockEngine;
pub use sse::RunIdSniffer;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::oneshot;

use crate::error::EngineError;
use crate::model::{EngineRunRequest, RunStatus, RunType};

/// Engine event stream, chunk boundaries as received
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, EngineError>> + Send>>;

// ============================================================================
// RUN ID CELL
// ============================================================================

/// Write side of the one-shot run id cell
#[derive(Debug)]
pub struct RunIdSender(oneshot::Sender<String>);

impl RunIdSender {
    /// Resolve the cell. Consumes the sender: the id is written at most once.
    pub fn resolve(self, run_id: impl Into<String>) {
        // The receiver may already be gone if the relay stopped early
        let _ = self.0.send(run_id.into());
    }
}

/// Read side of the one-shot run id cell
///
/// Resolved by the engine once it has assigned the run id. If the writer is
/// dropped without resolving, the id is unavailable.
#[derive(Debug)]
pub struct RunIdCell(oneshot::Receiver<String>);

impl RunIdCell {
    pub fn channel() -> (RunIdSender, RunIdCell) {
        let (tx, rx) = oneshot::channel();
        (RunIdSender(tx), RunIdCell(rx))
    }

    /// Cell already holding an id
    pub fn resolved(run_id: impl Into<String>) -> Self {
        let (tx, cell) = Self::channel();
        tx.resolve(run_id);
        cell
    }

    /// Cell that will never hold an id
    pub fn unavailable() -> Self {
        let (_, cell) = Self::channel();
        cell
    }

    /// Wait for the id; `None` when the engine never assigned one
    pub async fn wait(self) -> Option<String> {
        self.0.await.ok()
    }
}

/// A streaming run: byte chunks plus the deferred run id
pub struct RunStream {
    pub chunks: ByteStream,
    pub run_id: RunIdCell,
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ENGINE TRAIT
// ============================================================================

/// External execution engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Returns the engine name (e.g., "http", "mock")
    fn name(&self) -> &str;

    /// Create a run and return it as soon as the engine accepted it
    async fn create_run(
        &self,
        project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunType, EngineError>;

    /// Create a run and stream its events
    async fn create_run_stream(
        &self,
        project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunStream, EngineError>;

    /// Current status of a run
    async fn get_run_status(&self, project_id: &str, run_id: &str)
        -> Result<RunStatus, EngineError>;

    /// Full run, traces included
    async fn get_run(&self, project_id: &str, run_id: &str) -> Result<RunType, EngineError>;
}
