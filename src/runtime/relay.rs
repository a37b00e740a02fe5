//! Stream relay
//!
//! Forwards an engine event stream to a caller-facing sink chunk by chunk,
//! then records the run once the engine's run id is known. Chunks are never
//! reframed, buffered or reordered.
//!
//! Neither an upstream failure nor a sink failure is reported through the
//! sink: the stream is closed and the failure is only logged. Bookkeeping
//! failures are logged and never affect the relayed bytes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::engine::RunStream;
use crate::store::{RunRecordDraft, RunStore};

// ============================================================================
// SINKS
// ============================================================================

/// Caller-facing byte sink
#[async_trait]
pub trait ChunkSink: Send {
    /// Write one chunk as received
    async fn write_chunk(&mut self, chunk: &Bytes) -> std::io::Result<()>;

    /// Close the sink; called exactly once by the relay
    async fn close(&mut self) -> std::io::Result<()>;
}

/// Sink over any async writer, flushing after each chunk
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ChunkSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: &Bytes) -> std::io::Result<()> {
        self.writer.write_all(chunk).await?;
        self.writer.flush().await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Sink feeding an in-process channel
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Bytes>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: &Bytes) -> std::io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed"))?;
        tx.send(chunk.clone())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "receiver dropped"))
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.tx = None;
        Ok(())
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// How the relayed stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamClose {
    /// Upstream finished normally
    Completed,
    /// Upstream failed mid-stream
    SourceFailed(String),
    /// The sink refused a chunk (caller went away)
    SinkFailed(String),
    /// The cancellation token fired
    Cancelled,
}

/// What happened to the run record after the stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bookkeeping {
    /// Record appended for this run id
    Recorded(String),
    /// The engine never assigned a run id
    Skipped,
    /// The store refused the record
    Failed(String),
}

/// Result of one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub chunks: usize,
    pub bytes: usize,
    pub closed: StreamClose,
    pub bookkeeping: Bookkeeping,
}

impl RelayOutcome {
    pub fn run_id(&self) -> Option<&str> {
        match &self.bookkeeping {
            Bookkeeping::Recorded(id) => Some(id),
            _ => None,
        }
    }
}

// ============================================================================
// RELAY
// ============================================================================

/// Streams engine events to a sink and records the run afterwards
#[derive(Clone)]
pub struct StreamRelay {
    store: Arc<dyn RunStore>,
}

impl StreamRelay {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Forward `stream` into `sink`, then record the run under `draft`
    pub async fn relay<S>(
        &self,
        stream: RunStream,
        sink: &mut S,
        draft: RunRecordDraft,
        cancel: &CancellationToken,
    ) -> RelayOutcome
    where
        S: ChunkSink + ?Sized,
    {
        let RunStream {
            mut chunks,
            run_id,
        } = stream;

        let mut count = 0usize;
        let mut bytes = 0usize;

        let closed = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break StreamClose::Cancelled,
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Err(e) = sink.write_chunk(&chunk).await {
                        break StreamClose::SinkFailed(e.to_string());
                    }
                    count += 1;
                    bytes += chunk.len();
                }
                Some(Err(e)) => break StreamClose::SourceFailed(e.to_string()),
                None => break StreamClose::Completed,
            }
        };

        match &closed {
            StreamClose::Completed => debug!(chunks = count, bytes, "Stream completed"),
            StreamClose::SourceFailed(e) => error!(error = %e, chunks = count, "Engine stream failed"),
            StreamClose::SinkFailed(e) => warn!(error = %e, chunks = count, "Stream consumer failed"),
            StreamClose::Cancelled => debug!(chunks = count, "Stream cancelled"),
        }

        if let Err(e) = sink.close().await {
            debug!(error = %e, "Closing stream sink failed");
        }

        // Releasing the upstream lets the engine side stop producing
        drop(chunks);

        let bookkeeping = match run_id.wait().await {
            Some(run_id) => self.record(draft, run_id).await,
            None => {
                error!("No run id observed on stream, run not recorded");
                Bookkeeping::Skipped
            }
        };

        RelayOutcome {
            chunks: count,
            bytes,
            closed,
            bookkeeping,
        }
    }

    async fn record(&self, draft: RunRecordDraft, run_id: String) -> Bookkeeping {
        match self.store.append(draft.finish(run_id.clone())).await {
            Ok(()) => {
                debug!(run_id = %run_id, "Recorded streamed run");
                Bookkeeping::Recorded(run_id)
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Failed to record streamed run");
                Bookkeeping::Failed(e.to_string())
            }
        }
    }
}
