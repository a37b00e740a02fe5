//! Caller-facing submission contract
//!
//! - [`parse_submission`]: validates a raw submission body into a [`RunRequest`]
//! - [`ApiError`]: `{ error: { type, message, run_error? } }` plus an HTTP-style status code
//! - [`PostRunResponse`]: `{ run: RunType }` for non-streaming submissions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppRunError, EngineError, Result};
use crate::model::{RunRequest, RunType};

/// The only method accepted for run submission
pub const SUBMIT_METHOD: &str = "POST";

/// Successful non-streaming response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostRunResponse {
    pub run: RunType,
}

// ═══════════════════════════════════════════════════════════════
// ERROR TAXONOMY
// ═══════════════════════════════════════════════════════════════

/// Error body shown to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_error: Option<EngineError>,
}

/// Caller-visible error: serialized as `{ "error": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    #[serde(skip)]
    pub status_code: u16,
    pub error: ApiErrorBody,
}

impl ApiError {
    fn new(status_code: u16, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            error: ApiErrorBody {
                error_type: error_type.to_string(),
                message: message.into(),
                run_error: None,
            },
        }
    }

    pub fn invalid_request(reason: &str) -> Self {
        Self::new(
            400,
            "invalid_request_error",
            format!(
                "Invalid request body, `specification_hash` (string), `config` (object), \
                 and `inputs` (array) are required: {reason}"
            ),
        )
    }

    // Authentication and app lookup happen in the hosting layer, ahead of
    // `parse_submission`; these shapes are what it answers with.

    pub fn unauthorized(reason: &str) -> Self {
        Self::new(401, "not_authenticated", reason)
    }

    pub fn user_not_found() -> Self {
        Self::new(
            404,
            "user_not_found",
            "The user you're trying to query was not found.",
        )
    }

    pub fn app_not_found() -> Self {
        Self::new(
            404,
            "app_not_found",
            "The app you're trying to run was not found",
        )
    }

    pub fn method_not_supported() -> Self {
        Self::new(
            405,
            "method_not_supported_error",
            "The method passed is not supported, POST is expected.",
        )
    }

    /// Upstream engine failure: 400 when the engine rejected the call, 500 otherwise
    pub fn run_error(message: &str, source: &EngineError) -> Self {
        let status_code = if source.is_transport() { 500 } else { 400 };
        let mut err = Self::new(status_code, "run_error", message);
        err.error.run_error = Some(source.clone());
        err
    }

    pub fn run_timeout(run_id: &str, attempts: u32) -> Self {
        Self::new(
            504,
            "run_timeout",
            format!(
                "The run {run_id} did not complete after {attempts} status checks. \
                 It may still complete: retrieve it later by id."
            ),
        )
    }

    pub fn run_cancelled() -> Self {
        Self::new(499, "run_cancelled", "The wait for run completion was cancelled.")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "internal_server_error", message)
    }
}

impl From<&AppRunError> for ApiError {
    fn from(e: &AppRunError) -> Self {
        e.to_api_error()
    }
}

// ═══════════════════════════════════════════════════════════════
// SUBMISSION PARSING
// ═══════════════════════════════════════════════════════════════

/// Validate a raw submission into a [`RunRequest`]
///
/// Rejected before any engine call. `stream`/`blocking` default to false;
/// `block_filter` is only honored when it is an array (non-string entries are ignored).
pub fn parse_submission(method: &str, body: &Value) -> Result<RunRequest> {
    if !method.eq_ignore_ascii_case(SUBMIT_METHOD) {
        return Err(AppRunError::MethodNotSupported {
            method: method.to_string(),
        });
    }

    let obj = body.as_object().ok_or_else(|| AppRunError::InvalidRequest {
        reason: "body must be a JSON object".to_string(),
    })?;

    let specification_hash = obj
        .get("specification_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| AppRunError::InvalidRequest {
            reason: "`specification_hash` must be a string".to_string(),
        })?
        .to_string();

    let config = obj
        .get("config")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| AppRunError::InvalidRequest {
            reason: "`config` must be an object".to_string(),
        })?;

    let inputs = obj
        .get("inputs")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| AppRunError::InvalidRequest {
            reason: "`inputs` must be an array".to_string(),
        })?;

    let flag = |key: &str| obj.get(key).and_then(Value::as_bool).unwrap_or(false);

    let block_filter = obj.get("block_filter").and_then(Value::as_array).map(|names| {
        names
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect::<Vec<_>>()
    });

    Ok(RunRequest {
        specification_hash,
        config,
        inputs,
        stream: flag("stream"),
        blocking: flag("blocking"),
        block_filter,
    })
}
