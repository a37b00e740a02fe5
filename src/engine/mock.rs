//! Mock engine for testing
//!
//! Returns scripted runs, status sequences and stream chunks, and counts the
//! calls it receives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;

use super::{Engine, RunIdCell, RunStream};
use crate::error::EngineError;
use crate::model::{
    BlockType, EngineRunRequest, RunConfig, RunRunType, RunState, RunStatus, RunType, TraceCell,
    TraceEntry,
};

/// Mock engine with configurable responses
pub struct MockEngine {
    run: Mutex<RunType>,
    statuses: Mutex<VecDeque<Result<RunStatus, EngineError>>>,
    fallback_status: Mutex<RunState>,
    create_error: Mutex<Option<EngineError>>,
    get_run_error: Mutex<Option<EngineError>>,
    stream_chunks: Mutex<Vec<Result<Bytes, EngineError>>>,
    stream_run_id: Mutex<Option<String>>,
    last_request: Mutex<Option<(String, EngineRunRequest)>>,
    create_calls: AtomicU32,
    stream_calls: AtomicU32,
    status_calls: AtomicU32,
    get_run_calls: AtomicU32,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Engine whose runs succeed with a single `llm` block trace
    pub fn new() -> Self {
        Self {
            run: Mutex::new(Self::sample_run("mock-run-1")),
            statuses: Mutex::new(VecDeque::new()),
            fallback_status: Mutex::new(RunState::Succeeded),
            create_error: Mutex::new(None),
            get_run_error: Mutex::new(None),
            stream_chunks: Mutex::new(Vec::new()),
            stream_run_id: Mutex::new(None),
            last_request: Mutex::new(None),
            create_calls: AtomicU32::new(0),
            stream_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            get_run_calls: AtomicU32::new(0),
        }
    }

    /// A succeeded run with one `INPUT` and one `MODEL` block
    pub fn sample_run(run_id: &str) -> RunType {
        RunType {
            run_id: run_id.to_string(),
            created: 1_700_000_000_000,
            run_type: RunRunType::Deploy,
            specification_hash: Some("mock-hash".to_string()),
            config: RunConfig::default(),
            status: RunStatus::new(RunState::Succeeded),
            traces: vec![
                TraceEntry::new(
                    BlockType::Input,
                    "INPUT",
                    vec![vec![TraceCell::ok(json!({"question": "2+2?"}))]],
                ),
                TraceEntry::new(
                    BlockType::Llm,
                    "MODEL",
                    vec![vec![TraceCell::ok(json!({"completion": "4"}))]],
                ),
            ],
            results: None,
        }
    }

    /// Run returned by `get_run` (and, without traces, by `create_run`)
    pub fn with_run(self, run: RunType) -> Self {
        *self.run.lock() = run;
        self
    }

    /// Status sequence returned by successive `get_run_status` calls
    pub fn with_statuses(self, states: impl IntoIterator<Item = RunState>) -> Self {
        self.statuses
            .lock()
            .extend(states.into_iter().map(|s| Ok(RunStatus::new(s))));
        self
    }

    /// Queue a failing status call after the already-queued statuses
    pub fn with_status_error(self, error: EngineError) -> Self {
        self.statuses.lock().push_back(Err(error));
        self
    }

    /// Status returned once the scripted sequence is exhausted
    pub fn with_fallback_status(self, state: RunState) -> Self {
        *self.fallback_status.lock() = state;
        self
    }

    /// Every status call reports `running`
    pub fn always_running(self) -> Self {
        self.with_fallback_status(RunState::Running)
    }

    pub fn with_create_error(self, error: EngineError) -> Self {
        *self.create_error.lock() = Some(error);
        self
    }

    pub fn with_get_run_error(self, error: EngineError) -> Self {
        *self.get_run_error.lock() = Some(error);
        self
    }

    /// Chunks streamed by `create_run_stream`, and the run id it resolves
    pub fn with_stream<I, S>(self, chunks: I, run_id: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Bytes>,
    {
        *self.stream_chunks.lock() = chunks.into_iter().map(|c| Ok(c.into())).collect();
        *self.stream_run_id.lock() = run_id.map(str::to_string);
        self
    }

    /// Append a failing chunk to the stream
    pub fn with_stream_error(self, error: EngineError) -> Self {
        self.stream_chunks.lock().push(Err(error));
        self
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn get_run_calls(&self) -> u32 {
        self.get_run_calls.load(Ordering::SeqCst)
    }

    /// `(user_id, request)` of the last run creation
    pub fn last_request(&self) -> Option<(String, EngineRunRequest)> {
        self.last_request.lock().clone()
    }

    fn record(&self, user_id: &str, request: &EngineRunRequest) {
        *self.last_request.lock() = Some((user_id.to_string(), request.clone()));
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_run(
        &self,
        _project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunType, EngineError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.record(user_id, request);

        if let Some(error) = self.create_error.lock().clone() {
            return Err(error);
        }

        let mut run = self.run.lock().clone();
        run.status = RunStatus::new(RunState::Running);
        run.traces.clear();
        run.config = request.config.clone();
        run.specification_hash = Some(request.specification_hash.clone());
        Ok(run)
    }

    async fn create_run_stream(
        &self,
        _project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunStream, EngineError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record(user_id, request);

        if let Some(error) = self.create_error.lock().clone() {
            return Err(error);
        }

        let chunks = self.stream_chunks.lock().clone();
        let run_id = match self.stream_run_id.lock().clone() {
            Some(id) => RunIdCell::resolved(id),
            None => RunIdCell::unavailable(),
        };

        Ok(RunStream {
            chunks: Box::pin(futures::stream::iter(chunks)),
            run_id,
        })
    }

    async fn get_run_status(
        &self,
        _project_id: &str,
        _run_id: &str,
    ) -> Result<RunStatus, EngineError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().pop_front() {
            Some(scripted) => scripted,
            None => Ok(RunStatus::new(*self.fallback_status.lock())),
        }
    }

    async fn get_run(&self, _project_id: &str, run_id: &str) -> Result<RunType, EngineError> {
        self.get_run_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.get_run_error.lock().clone() {
            return Err(error);
        }
        let mut run = self.run.lock().clone();
        run.run_id = run_id.to_string();
        Ok(run)
    }
}
