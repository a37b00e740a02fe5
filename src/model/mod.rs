//! Data model shared by every component
//!
//! - [`block`]: block types and block specifications
//! - [`run`]: engine runs, statuses and the per-block trace matrix
//! - [`request`]: caller submissions and engine-facing run requests

mod block;
mod request;
mod run;

pub use block::{Block, BlockType};
pub use request::{EngineRunRequest, RunRequest};
pub use run::{
    BlockKey, BlockStatus, Layer, Row, RunConfig, RunRunType, RunState, RunStatus, RunType,
    TraceCell, TraceEntry,
};
