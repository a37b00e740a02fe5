//! AppRun - run orchestrator for multi-block apps (v0.1)
//!
//! Submits app runs to an external execution engine, waits for or streams
//! their completion, and reshapes the engine's per-block trace into what the
//! caller sees.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  model/     Blocks, runs, statuses, traces, requests         │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  prepare    Caller config → engine config                    │
//! │  runtime/   Orchestrator, completion poller, stream relay    │
//! │  trace/     Block filter, results, map unwrap, block views   │
//! │  api        Submission validation, caller error taxonomy     │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  engine/    Engine trait, HTTP/SSE client, mock              │
//! │  store/     Run bookkeeping (memory, NDJSON)                 │
//! │  credentials Provider records → engine credentials           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`model`] | `RunType`, `RunStatus`, `TraceEntry`, `RunRequest`, ... |
//! | [`prepare`] | Strip `dataset` from `input` blocks, build `EngineRunRequest` |
//! | [`runtime`] | Mode selection, adaptive-backoff polling, byte relay |
//! | [`trace`] | Pure reshaping of traces for the caller |
//! | [`api`] | `{ error: { type, message, run_error? } }` + status codes |
//! | [`engine`] | Engine collaborator over HTTP (reqwest) |
//! | [`store`] | Append-only run records |
//! | [`credentials`] | `CredentialResolver` seam |
//! | [`config`] | TOML config + env overrides |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - runs, traces, requests
// ═══════════════════════════════════════════════════════════════
pub mod model;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Orchestration logic
// ═══════════════════════════════════════════════════════════════
pub mod api;
pub mod prepare;
pub mod runtime;
pub mod trace;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Engine, bookkeeping, credentials
// ═══════════════════════════════════════════════════════════════
pub mod credentials;
pub mod engine;
pub mod store;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{AppRunError, EngineError, FixSuggestion, Result};

// Config types
pub use config::AppRunConfig;

// Domain types
pub use model::{
    Block, BlockStatus, BlockType, EngineRunRequest, RunRequest, RunState, RunStatus, RunType,
    TraceCell, TraceEntry,
};

// Runtime types
pub use runtime::{
    AppContext, CompletionPoller, PollConfig, RunOrchestrator, StreamRelay, Submission,
};

// Engine types
pub use engine::{Engine, HttpEngine, MockEngine};

// Store types
pub use store::{MemoryRunStore, NdjsonRunStore, RunRecord, RunStore};
