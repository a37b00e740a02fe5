//! HTTP engine client
//!
//! Talks to the engine's JSON API. Every non-streaming answer is wrapped in
//! an envelope:
//!
//! ```json
//! { "response": { ... }, "error": null }
//! { "response": null, "error": { "code": "...", "message": "..." } }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use url::Url;

use super::{Engine, RunIdCell, RunIdSender, RunIdSniffer, RunStream};
use crate::error::EngineError;
use crate::model::{EngineRunRequest, RunStatus, RunType};
use crate::util::{CONNECT_TIMEOUT, ENGINE_TIMEOUT, STREAM_BUFFER, USER_ID_HEADER};

/// Engine reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpEngine {
    /// Client for request/response calls (bounded by a total timeout)
    client: reqwest::Client,
    /// Client for event streams (connect timeout only)
    stream_client: reqwest::Client,
    base_url: Url,
}

impl HttpEngine {
    /// Create a client for the engine at `base_url` with default timeouts
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Self::with_timeouts(base_url, ENGINE_TIMEOUT, CONNECT_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EngineError::transport(format!("invalid engine URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(EngineError::transport(format!(
                "engine URL '{base_url}' cannot be used as a base"
            )));
        }

        let user_agent = concat!("apprun/", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;
        let stream_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn runs_url(&self, project_id: &str) -> Url {
        self.endpoint(&["projects", project_id, "runs"])
    }
}

#[async_trait]
impl Engine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_run(
        &self,
        project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunType, EngineError> {
        debug!(
            project_id,
            specification_hash = %request.specification_hash,
            inputs = request.inputs.len(),
            "Creating engine run"
        );

        let response = self
            .client
            .post(self.runs_url(project_id))
            .header(USER_ID_HEADER, user_id)
            .json(request)
            .send()
            .await?;

        let body: RunResponse = decode(response).await?;
        Ok(body.run)
    }

    async fn create_run_stream(
        &self,
        project_id: &str,
        user_id: &str,
        request: &EngineRunRequest,
    ) -> Result<RunStream, EngineError> {
        debug!(
            project_id,
            specification_hash = %request.specification_hash,
            "Creating streaming engine run"
        );

        let response = self
            .stream_client
            .post(self.endpoint(&["projects", project_id, "runs", "stream"]))
            .header(USER_ID_HEADER, user_id)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_body(response).await);
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (run_id_tx, run_id) = RunIdCell::channel();
        tokio::spawn(pump(Box::pin(response.bytes_stream()), tx, run_id_tx));

        Ok(RunStream {
            chunks: Box::pin(ReceiverStream::new(rx)),
            run_id,
        })
    }

    async fn get_run_status(
        &self,
        project_id: &str,
        run_id: &str,
    ) -> Result<RunStatus, EngineError> {
        let response = self
            .client
            .get(self.endpoint(&["projects", project_id, "runs", run_id, "status"]))
            .send()
            .await?;

        let body: StatusResponse = decode(response).await?;
        Ok(body.run.status)
    }

    async fn get_run(&self, project_id: &str, run_id: &str) -> Result<RunType, EngineError> {
        let response = self
            .client
            .get(self.endpoint(&["projects", project_id, "runs", run_id]))
            .send()
            .await?;

        let body: RunResponse = decode(response).await?;
        Ok(body.run)
    }
}

// ============================================================================
// STREAM PUMP
// ============================================================================

/// Forward upstream chunks verbatim while recovering the run id.
///
/// Stops when upstream ends or fails, or when the consumer drops its end of
/// the channel. The run id sender is dropped unresolved if no id was seen.
async fn pump<S>(
    mut upstream: S,
    tx: mpsc::Sender<Result<Bytes, EngineError>>,
    run_id: RunIdSender,
) where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    let mut sniffer = RunIdSniffer::new();
    let mut run_id = Some(run_id);

    loop {
        let item = tokio::select! {
            item = upstream.next() => item,
            _ = tx.closed() => {
                debug!("Stream consumer gone, stopping pump");
                return;
            }
        };

        match item {
            Some(Ok(chunk)) => {
                if let Some(id) = sniffer.feed(&chunk) {
                    if let Some(sender) = run_id.take() {
                        sender.resolve(id);
                    }
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Engine stream failed");
                let _ = tx.send(Err(e.into())).await;
                return;
            }
            None => break,
        }
    }

    if let (Some(id), Some(sender)) = (sniffer.finish(), run_id.take()) {
        sender.resolve(id);
    }
}

// ============================================================================
// API TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunType,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    run: RunStatusOnly,
}

#[derive(Debug, Deserialize)]
struct RunStatusOnly {
    status: RunStatus,
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, EngineError> {
    let status = response.status();
    let text = response.text().await?;

    let envelope: Envelope<T> = match serde_json::from_str(&text) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => {
            return Err(EngineError::transport(format!(
                "failed to decode engine response: {e}"
            )))
        }
        Err(_) => return Err(http_error(status, &text)),
    };

    if let Some(error) = envelope.error {
        return Err(EngineError::rejected(error.code, error.message));
    }
    match envelope.response {
        Some(body) if status.is_success() => Ok(body),
        Some(_) => Err(http_error(status, &text)),
        None if status.is_success() => Err(EngineError::transport(
            "engine response carried neither `response` nor `error`",
        )),
        None => Err(http_error(status, &text)),
    }
}

async fn error_from_body(response: reqwest::Response) -> EngineError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return e.into(),
    };
    match serde_json::from_str::<Envelope<serde_json::Value>>(&text) {
        Ok(Envelope {
            error: Some(error), ..
        }) => EngineError::rejected(error.code, error.message),
        _ => http_error(status, &text),
    }
}

fn http_error(status: reqwest::StatusCode, body: &str) -> EngineError {
    EngineError::rejected(format!("http_{}", status.as_u16()), body.trim().to_string())
}
