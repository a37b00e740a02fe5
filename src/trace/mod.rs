//! Trace reshaping
//!
//! Turns the engine's raw per-block trace into what the caller observes:
//!
//! - [`reshape`]: block filter, then final `results` (pure, derived view)
//! - [`reshape_row`] / [`present_layer`]: fan-out unwrap for `map` blocks
//! - [`block_output`]: one block's presented rows with success/error counts
//!
//! The fan-out unwrap lives in exactly one function so every consumer
//! (CLI, re-served runs, block views) renders `map` rows the same way.

mod reshape;
mod view;

pub use reshape::{filter_blocks, final_results, present_layer, reshape, reshape_row, reshape_run, Reshaped};
pub use view::{block_output, BlockOutput, ExecutionSummary};
