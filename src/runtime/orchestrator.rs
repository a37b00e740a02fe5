//! Run orchestrator
//!
//! Composition root: prepares the engine request, selects the execution mode
//! and sequences poller, relay, reshaper and bookkeeping.
//!
//! | `stream` | `blocking` | Mode | Returns |
//! |----------|------------|------|---------|
//! | true | any | streaming | [`Submission::Stream`] |
//! | false | true | blocking | terminal, reshaped run |
//! | false | false | fire-and-forget | run as created (usually `running`) |

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::poller::{CompletionPoller, PollConfig};
use super::relay::{ChunkSink, RelayOutcome, StreamRelay};
use crate::credentials::CredentialResolver;
use crate::engine::{Engine, RunStream};
use crate::error::{AppRunError, Result};
use crate::model::{RunRequest, RunRunType, RunType};
use crate::prepare::prepare_request;
use crate::store::{RunRecordDraft, RunStore};
use crate::trace::reshape_run;

/// Who a run is submitted for, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    /// Engine project owning the app's runs
    pub project_id: String,
    pub app_id: String,
    pub user_id: String,
    pub workspace_id: String,
}

impl AppContext {
    fn draft(&self, run_type: RunRunType) -> RunRecordDraft {
        RunRecordDraft {
            app_id: self.app_id.clone(),
            run_type,
            user_id: self.user_id.clone(),
            workspace_id: self.workspace_id.clone(),
        }
    }
}

/// Execution mode of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    FireAndForget,
    Blocking,
    Streaming,
}

impl RunMode {
    /// Streaming wins over blocking
    pub fn of(request: &RunRequest) -> Self {
        match (request.stream, request.blocking) {
            (true, _) => RunMode::Streaming,
            (false, true) => RunMode::Blocking,
            (false, false) => RunMode::FireAndForget,
        }
    }
}

/// What a submission produced
#[derive(Debug)]
pub enum Submission {
    /// Non-streaming modes: the run to return as `{ "run": ... }`
    Run(RunType),
    /// Streaming mode: a run whose bytes still have to be relayed
    Stream(PendingStream),
}

impl Submission {
    pub fn into_run(self) -> Option<RunType> {
        match self {
            Submission::Run(run) => Some(run),
            Submission::Stream(_) => None,
        }
    }
}

/// A created streaming run waiting for a sink
pub struct PendingStream {
    stream: RunStream,
    draft: RunRecordDraft,
    relay: StreamRelay,
}

impl std::fmt::Debug for PendingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingStream")
            .field("stream", &self.stream)
            .field("draft", &self.draft)
            .finish_non_exhaustive()
    }
}

impl PendingStream {
    /// Relay the engine's bytes into `sink`, then record the run
    pub async fn relay<S>(self, sink: &mut S, cancel: &CancellationToken) -> RelayOutcome
    where
        S: ChunkSink + ?Sized,
    {
        self.relay.relay(self.stream, sink, self.draft, cancel).await
    }
}

/// Submits runs to an engine in one of the three modes
#[derive(Clone)]
pub struct RunOrchestrator {
    engine: Arc<dyn Engine>,
    store: Arc<dyn RunStore>,
    credentials: Arc<dyn CredentialResolver>,
    poller: CompletionPoller,
}

impl RunOrchestrator {
    pub fn new(
        engine: Arc<dyn Engine>,
        store: Arc<dyn RunStore>,
        credentials: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self {
            engine,
            store,
            credentials,
            poller: CompletionPoller::default(),
        }
    }

    /// Replace the default backoff parameters.
    ///
    /// Fails with [`AppRunError::Config`] when `config` does not describe a
    /// bounded, strictly growing backoff.
    pub fn with_poll_config(mut self, config: PollConfig) -> Result<Self> {
        config.validate().map_err(|reason| AppRunError::Config {
            reason: format!("Invalid poll config: {reason}"),
        })?;
        self.poller = CompletionPoller::new(config);
        Ok(self)
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Submit a run for `ctx`.
    ///
    /// Streaming submissions return before any byte is relayed; the caller
    /// drives [`PendingStream::relay`]. `cancel` stops a blocking poll.
    #[instrument(skip_all, fields(project_id = %ctx.project_id, app_id = %ctx.app_id, mode = ?RunMode::of(&request)))]
    pub async fn submit(
        &self,
        ctx: &AppContext,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<Submission> {
        let run_type = RunRunType::Deploy;
        let credentials = self.credentials.resolve(&ctx.user_id).await?;
        let engine_request = prepare_request(&request, run_type, credentials);

        match RunMode::of(&request) {
            RunMode::Streaming => {
                let stream = self
                    .engine
                    .create_run_stream(&ctx.project_id, &ctx.user_id, &engine_request)
                    .await
                    .map_err(|source| AppRunError::RunCreation { source })?;

                info!("Streaming run created");
                Ok(Submission::Stream(PendingStream {
                    stream,
                    draft: ctx.draft(run_type),
                    relay: StreamRelay::new(Arc::clone(&self.store)),
                }))
            }
            mode => {
                let run = self
                    .engine
                    .create_run(&ctx.project_id, &ctx.user_id, &engine_request)
                    .await
                    .map_err(|source| AppRunError::RunCreation { source })?;

                info!(run_id = %run.run_id, "Run created");
                self.record(ctx.draft(run_type), &run.run_id).await;

                let filter = request.block_filter.as_deref();
                let run = if mode == RunMode::Blocking {
                    self.wait_for(&ctx.project_id, &run.run_id, cancel).await?
                } else {
                    run
                };
                Ok(Submission::Run(reshape_run(run, filter)))
            }
        }
    }

    /// Poll until the run is terminal, then fetch it with its trace
    async fn wait_for(
        &self,
        project_id: &str,
        run_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RunType> {
        let engine = &self.engine;
        let status = self
            .poller
            .poll_until_done(
                run_id,
                |run_id| {
                    let run_id = run_id.to_string();
                    async move { engine.get_run_status(project_id, &run_id).await }
                },
                cancel,
            )
            .await
            .map_err(|e| e.into_run_error(run_id))?;

        debug!(run_id, status = status.run.as_str(), "Run terminal, fetching trace");

        self.engine
            .get_run(project_id, run_id)
            .await
            .map_err(|source| AppRunError::RunRetrieval {
                run_id: run_id.to_string(),
                source,
            })
    }

    async fn record(&self, draft: RunRecordDraft, run_id: &str) {
        if let Err(e) = self.store.append(draft.finish(run_id)).await {
            warn!(run_id, error = %e, "Failed to record run");
        }
    }
}
