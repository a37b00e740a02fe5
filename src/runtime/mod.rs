//! Runtime Module - run execution (v0.1)
//!
//! Contains the execution components:
//! - `poller`: adaptive-backoff wait for a terminal run status
//! - `relay`: byte-level stream forwarding + deferred bookkeeping
//! - `orchestrator`: mode selection and sequencing
//!
//! The `model` and `trace` modules hold the data these components move;
//! everything here is about timing and ordering.

mod orchestrator;
mod poller;
mod relay;

pub use orchestrator::{AppContext, PendingStream, RunMode, RunOrchestrator, Submission};
pub use poller::{CompletionPoller, PollConfig, PollError, PollState};
pub use relay::{Bookkeeping, ChannelSink, ChunkSink, RelayOutcome, StreamClose, StreamRelay, WriterSink};
