//! # Orchestrator Tests
//!
//! End-to-end submissions against the mock engine:
//! - fire-and-forget, blocking and streaming modes
//! - block filter and map unwrap on the returned run
//! - request preparation and credential forwarding
//! - bookkeeping of every created run

use std::sync::Arc;

use apprun::credentials::{ProviderCredentials, ProviderRecord};
use apprun::engine::MockEngine;
use apprun::model::{BlockStatus, BlockType, RunState, RunStatus, RunType, TraceCell, TraceEntry};
use apprun::runtime::{AppContext, Bookkeeping, ChannelSink, RunOrchestrator, StreamClose, Submission};
use apprun::store::MemoryRunStore;
use apprun::trace::present_layer;
use apprun::{AppRunError, EngineError, RunRequest};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn ctx() -> AppContext {
    AppContext {
        project_id: "proj-1".to_string(),
        app_id: "app-1".to_string(),
        user_id: "user-1".to_string(),
        workspace_id: "ws-1".to_string(),
    }
}

fn request() -> RunRequest {
    RunRequest::new("spec-hash", Map::new(), vec![json!({"question": "2+2?"})])
}

fn setup(engine: MockEngine) -> (Arc<MockEngine>, Arc<MemoryRunStore>, RunOrchestrator) {
    let engine = Arc::new(engine);
    let store = Arc::new(MemoryRunStore::new());
    let credentials = ProviderCredentials::new(vec![ProviderRecord::new(
        "openai",
        json!({"api_key": "sk-test"}),
    )]);
    let orchestrator = RunOrchestrator::new(engine.clone(), store.clone(), Arc::new(credentials));
    (engine, store, orchestrator)
}

fn block_status(name: &str) -> BlockStatus {
    BlockStatus {
        block_type: BlockType::Code,
        name: name.to_string(),
        status: RunState::Succeeded,
        success_count: 1,
        error_count: 0,
    }
}

fn three_step_run() -> RunType {
    let mut run = MockEngine::sample_run("template");
    run.traces = ["STEP1", "STEP2", "STEP3"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            TraceEntry::new(BlockType::Code, *name, vec![vec![TraceCell::ok(json!(i + 1))]])
        })
        .collect();
    run.status = RunStatus {
        run: RunState::Succeeded,
        blocks: vec![block_status("STEP1"), block_status("STEP2"), block_status("STEP3")],
    };
    run
}

async fn submit_run(orchestrator: &RunOrchestrator, request: RunRequest) -> RunType {
    orchestrator
        .submit(&ctx(), request, &CancellationToken::new())
        .await
        .unwrap()
        .into_run()
        .unwrap()
}

// ============================================================================
// BLOCKING MODE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_blocking_polls_until_terminal() {
    let (engine, store, orchestrator) = setup(
        MockEngine::new().with_statuses([RunState::Running, RunState::Running, RunState::Running]),
    );

    let run = submit_run(&orchestrator, request().blocking()).await;

    assert_eq!(engine.status_calls(), 4);
    assert_eq!(engine.get_run_calls(), 1);
    assert_eq!(run.status.run, RunState::Succeeded);
    assert_eq!(run.results.as_ref(), Some(&run.traces.last().unwrap().layer));
    assert_eq!(store.records()[0].run_id, run.run_id);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_block_filter_keeps_only_named_block() {
    let (_, _, orchestrator) = setup(MockEngine::new().with_run(three_step_run()));

    let run = submit_run(&orchestrator, request().blocking().with_block_filter(["STEP2"])).await;

    let names: Vec<_> = run.traces.iter().map(TraceEntry::name).collect();
    assert_eq!(names, vec!["STEP2"]);
    assert_eq!(run.status.blocks.len(), 1);
    assert_eq!(run.status.blocks[0].name, "STEP2");
    assert_eq!(run.results, Some(vec![vec![TraceCell::ok(json!(2))]]));
}

#[tokio::test(start_paused = true)]
async fn test_blocking_map_error_row_is_not_unwrapped() {
    let mut template = MockEngine::sample_run("template");
    template.traces = vec![TraceEntry::new(
        BlockType::Map,
        "LOOP",
        vec![vec![TraceCell::new(None, Some("timeout".to_string()))]],
    )];
    let (_, _, orchestrator) = setup(MockEngine::new().with_run(template));

    let run = submit_run(&orchestrator, request().blocking()).await;

    let entry = run.trace_for(BlockType::Map, "LOOP").unwrap();
    let presented = present_layer(BlockType::Map, &entry.layer);
    assert_eq!(presented, entry.layer);
    assert_eq!(
        serde_json::to_value(&presented[0][0]).unwrap(),
        json!({"value": null, "error": "timeout"})
    );
}

#[tokio::test(start_paused = true)]
async fn test_blocking_errored_run_has_no_results() {
    let mut template = three_step_run();
    template.status.run = RunState::Errored;
    let (_, _, orchestrator) = setup(
        MockEngine::new()
            .with_run(template)
            .with_fallback_status(RunState::Errored),
    );

    let run = submit_run(&orchestrator, request().blocking()).await;

    assert_eq!(run.status.run, RunState::Errored);
    assert_eq!(run.results, None);
    assert_eq!(run.traces.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_status_failure_is_run_status_error() {
    let (engine, _, orchestrator) = setup(
        MockEngine::new()
            .with_statuses([RunState::Running])
            .with_status_error(EngineError::rejected("run_not_found", "gone")),
    );

    let err = orchestrator
        .submit(&ctx(), request().blocking(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppRunError::RunStatus { .. }));
    let api = err.to_api_error();
    assert_eq!(api.status_code, 400);
    assert_eq!(api.error.error_type, "run_error");
    assert_eq!(api.error.run_error.unwrap().code, "run_not_found");
    assert_eq!(engine.status_calls(), 2);
    assert_eq!(engine.get_run_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_retrieval_failure_is_run_retrieval_error() {
    let (_, _, orchestrator) = setup(
        MockEngine::new().with_get_run_error(EngineError::transport("connection refused")),
    );

    let err = orchestrator
        .submit(&ctx(), request().blocking(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppRunError::RunRetrieval { .. }));
    assert_eq!(err.to_api_error().status_code, 500);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_cancel_stops_polling() {
    let (engine, store, orchestrator) = setup(MockEngine::new().always_running());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .submit(&ctx(), request().blocking(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AppRunError::RunCancelled { .. }));
    assert!(engine.status_calls() < 64);
    // The run was created, so it is still recorded
    assert_eq!(store.len(), 1);
}

// ============================================================================
// FIRE-AND-FORGET MODE
// ============================================================================

#[tokio::test]
async fn test_fire_and_forget_returns_immediately() {
    let (engine, store, orchestrator) = setup(MockEngine::new());

    let run = submit_run(&orchestrator, request()).await;

    assert_eq!(run.status.run, RunState::Running);
    assert!(run.traces.is_empty());
    assert_eq!(run.results, None);
    assert_eq!(engine.create_calls(), 1);
    assert_eq!(engine.status_calls(), 0);
    assert_eq!(engine.get_run_calls(), 0);

    let record = &store.records()[0];
    assert_eq!(record.run_id, run.run_id);
    assert_eq!(record.app_id, "app-1");
    assert_eq!(record.workspace_id, "ws-1");
}

#[tokio::test]
async fn test_engine_request_is_prepared() {
    let (engine, _, orchestrator) = setup(MockEngine::new());
    let config: Map<String, Value> = serde_json::from_value(json!({
        "INPUT": {"type": "input", "dataset": "dev-set", "keep": 1},
        "MODEL": {"type": "llm", "dataset": "untouched"}
    }))
    .unwrap();
    let caller_config = config.clone();

    submit_run(&orchestrator, RunRequest::new("spec-hash", config, vec![json!(1)])).await;

    let (user_id, sent) = engine.last_request().unwrap();
    assert_eq!(user_id, "user-1");
    assert_eq!(sent.specification_hash, "spec-hash");
    assert_eq!(sent.config.blocks["INPUT"], json!({"type": "input", "keep": 1}));
    assert_eq!(sent.config.blocks["MODEL"], caller_config["MODEL"]);
    assert_eq!(sent.credentials.get("OPENAI_API_KEY").map(String::as_str), Some("sk-test"));
    assert_eq!(sent.inputs, vec![json!(1)]);
}

#[tokio::test]
async fn test_creation_failure_records_nothing() {
    let (_, store, orchestrator) = setup(
        MockEngine::new().with_create_error(EngineError::rejected("invalid_hash", "unknown spec")),
    );

    let err = orchestrator
        .submit(&ctx(), request(), &CancellationToken::new())
        .await
        .unwrap_err();

    let api = err.to_api_error();
    assert_eq!(api.status_code, 400);
    assert_eq!(api.error.run_error.unwrap().message, "unknown spec");
    assert!(store.is_empty());
}

// ============================================================================
// STREAMING MODE
// ============================================================================

#[tokio::test]
async fn test_stream_relays_chunks_then_records() {
    let chunks = [
        "data: {\"type\":\"run_status\",\"content\":{\"run_id\":\"run-s1\"}}\n\n",
        "data: {\"type\":\"block_execution\"}\n\n",
        "data: {\"type\":\"final\"}\n\n",
    ];
    let (engine, store, orchestrator) =
        setup(MockEngine::new().with_stream(chunks, Some("run-s1")));

    let submission = orchestrator
        .submit(&ctx(), request().streaming().blocking(), &CancellationToken::new())
        .await
        .unwrap();
    let Submission::Stream(pending) = submission else {
        panic!("expected a stream submission");
    };
    // Nothing recorded before the stream is drained
    assert!(store.is_empty());

    let (tx, mut rx) = mpsc::channel(16);
    let outcome = pending
        .relay(&mut ChannelSink::new(tx), &CancellationToken::new())
        .await;

    let mut received = Vec::new();
    while let Some(chunk) = rx.recv().await {
        received.push(chunk);
    }
    let expected: Vec<Bytes> = chunks.iter().map(|c| Bytes::from(*c)).collect();
    assert_eq!(received, expected);

    assert_eq!(outcome.closed, StreamClose::Completed);
    assert_eq!(outcome.bookkeeping, Bookkeeping::Recorded("run-s1".to_string()));
    assert_eq!(store.records()[0].run_id, "run-s1");
    assert_eq!(engine.stream_calls(), 1);
    assert_eq!(engine.create_calls(), 0);
    assert_eq!(engine.status_calls(), 0);
}

#[tokio::test]
async fn test_stream_source_failure_closes_quietly() {
    let (_, store, orchestrator) = setup(
        MockEngine::new()
            .with_stream(["data: {}\n\n"], Some("run-s2"))
            .with_stream_error(EngineError::transport("upstream reset")),
    );

    let Submission::Stream(pending) = orchestrator
        .submit(&ctx(), request().streaming(), &CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("expected a stream submission");
    };

    let (tx, mut rx) = mpsc::channel(16);
    let outcome = pending
        .relay(&mut ChannelSink::new(tx), &CancellationToken::new())
        .await;

    assert!(matches!(outcome.closed, StreamClose::SourceFailed(_)));
    assert_eq!(rx.recv().await, Some(Bytes::from("data: {}\n\n")));
    assert_eq!(rx.recv().await, None);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_stream_without_run_id_skips_bookkeeping() {
    let (_, store, orchestrator) = setup(MockEngine::new().with_stream(["data: {}\n\n"], None));

    let Submission::Stream(pending) = orchestrator
        .submit(&ctx(), request().streaming(), &CancellationToken::new())
        .await
        .unwrap()
    else {
        panic!("expected a stream submission");
    };

    let (tx, _rx) = mpsc::channel(16);
    let outcome = pending
        .relay(&mut ChannelSink::new(tx), &CancellationToken::new())
        .await;

    assert_eq!(outcome.closed, StreamClose::Completed);
    assert_eq!(outcome.bookkeeping, Bookkeeping::Skipped);
    assert!(store.is_empty());
}
