//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - APPRUN-000-009: Submission validation errors
//! - APPRUN-020-029: Engine run errors
//! - APPRUN-030-039: Poll/relay lifecycle errors
//! - APPRUN-040-049: Infrastructure errors (config, store, io)
//!
//! Every variant maps to exactly one caller-visible [`ApiError`] through
//! [`AppRunError::to_api_error`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiError;

pub type Result<T> = std::result::Result<T, AppRunError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

// ═══════════════════════════════════════════
// ENGINE ERRORS
// ═══════════════════════════════════════════

/// How an engine call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// The engine answered with an error payload or a non-2xx status
    #[default]
    Rejected,
    /// The engine could not be reached or its answer could not be decoded
    Transport,
}

/// Error reported by the execution engine, embedded verbatim in `run_error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct EngineError {
    pub code: String,
    pub message: String,
    #[serde(skip)]
    pub kind: EngineErrorKind,
}

impl EngineError {
    /// Error payload returned by the engine itself
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind: EngineErrorKind::Rejected,
        }
    }

    /// Network or decoding failure on the way to/from the engine
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: "transport_error".to_string(),
            message: message.into(),
            kind: EngineErrorKind::Transport,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind == EngineErrorKind::Transport
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::transport(e.to_string())
    }
}

// ═══════════════════════════════════════════
// CRATE ERROR
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum AppRunError {
    // ─────────────────────────────────────────
    // SUBMISSION (000-009)
    // ─────────────────────────────────────────
    #[error("[APPRUN-001] Invalid request body: {reason}")]
    InvalidRequest { reason: String },

    #[error("[APPRUN-002] Method '{method}' is not supported, POST is expected")]
    MethodNotSupported { method: String },

    // ─────────────────────────────────────────
    // ENGINE RUN (020-029)
    // ─────────────────────────────────────────
    #[error("[APPRUN-020] Run creation failed: {source}")]
    RunCreation { source: EngineError },

    #[error("[APPRUN-021] Run status query failed for '{run_id}': {source}")]
    RunStatus { run_id: String, source: EngineError },

    #[error("[APPRUN-022] Run retrieval failed for '{run_id}': {source}")]
    RunRetrieval { run_id: String, source: EngineError },

    // ─────────────────────────────────────────
    // LIFECYCLE (030-039)
    // ─────────────────────────────────────────
    #[error("[APPRUN-030] Run '{run_id}' still running after {attempts} status checks")]
    RunTimeout { run_id: String, attempts: u32 },

    #[error("[APPRUN-031] Run '{run_id}' wait cancelled by caller")]
    RunCancelled { run_id: String },

    // ─────────────────────────────────────────
    // INFRASTRUCTURE (040-049)
    // ─────────────────────────────────────────
    #[error("[APPRUN-040] Configuration error: {reason}")]
    Config { reason: String },

    #[error("[APPRUN-041] Credential resolution failed: {reason}")]
    Credentials { reason: String },

    #[error("[APPRUN-042] Run store error: {reason}")]
    Store { reason: String },

    #[error("[APPRUN-043] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[APPRUN-044] JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppRunError {
    /// Stable error code (e.g. `APPRUN-030`)
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "APPRUN-001",
            Self::MethodNotSupported { .. } => "APPRUN-002",
            Self::RunCreation { .. } => "APPRUN-020",
            Self::RunStatus { .. } => "APPRUN-021",
            Self::RunRetrieval { .. } => "APPRUN-022",
            Self::RunTimeout { .. } => "APPRUN-030",
            Self::RunCancelled { .. } => "APPRUN-031",
            Self::Config { .. } => "APPRUN-040",
            Self::Credentials { .. } => "APPRUN-041",
            Self::Store { .. } => "APPRUN-042",
            Self::Io(_) => "APPRUN-043",
            Self::Json(_) => "APPRUN-044",
        }
    }

    /// Map to the caller-facing error taxonomy
    pub fn to_api_error(&self) -> ApiError {
        match self {
            Self::InvalidRequest { reason } => ApiError::invalid_request(reason),
            Self::MethodNotSupported { .. } => ApiError::method_not_supported(),
            Self::RunCreation { source } => {
                ApiError::run_error("There was an error running the app.", source)
            }
            Self::RunStatus { source, .. } => ApiError::run_error(
                "There was an error retrieving the run status while polling.",
                source,
            ),
            Self::RunRetrieval { source, .. } => ApiError::run_error(
                "There was an error retrieving the run while polling.",
                source,
            ),
            Self::RunTimeout { run_id, attempts } => ApiError::run_timeout(run_id, *attempts),
            Self::RunCancelled { .. } => ApiError::run_cancelled(),
            Self::Config { .. }
            | Self::Credentials { .. }
            | Self::Store { .. }
            | Self::Io(_)
            | Self::Json(_) => ApiError::internal(self.to_string()),
        }
    }
}

impl FixSuggestion for AppRunError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            Self::InvalidRequest { .. } => Some(
                "Provide `specification_hash` (string), `config` (object) and `inputs` (array)",
            ),
            Self::MethodNotSupported { .. } => Some("Submit runs with POST"),
            Self::RunCreation { source } | Self::RunStatus { source, .. } | Self::RunRetrieval { source, .. } => {
                if source.is_transport() {
                    Some("Check the engine URL ([engine].url or APPRUN_ENGINE_URL) is reachable")
                } else {
                    Some("Check the specification hash and block config against the app")
                }
            }
            Self::RunTimeout { .. } => Some(
                "Submit without `blocking` and query the run later, or raise [poll].max_attempts",
            ),
            Self::RunCancelled { .. } => None,
            Self::Config { .. } => Some("Check ~/.config/apprun/config.toml syntax"),
            Self::Credentials { .. } => Some("Check [[providers]] entries in the config file"),
            Self::Store { .. } => Some("Check the [store].path directory is writable"),
            Self::Io(_) => Some("Check file path and permissions"),
            Self::Json(_) => Some("Ensure the file contains valid JSON"),
        }
    }
}
