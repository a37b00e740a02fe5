//! Per-block output view

use std::fmt;

use serde::Serialize;

use super::reshape::present_layer;
use crate::model::{Block, BlockKey, Layer, RunType};

/// Success/error cell counts over a block's presented rows.
///
/// Any cell carrying an error, even an empty one, counts as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExecutionSummary {
    pub successes: usize,
    pub errors: usize,
}

impl ExecutionSummary {
    pub fn from_layer(layer: &Layer) -> Self {
        layer
            .iter()
            .flatten()
            .fold(Self::default(), |mut acc, cell| {
                if cell.error.is_some() {
                    acc.errors += 1;
                } else {
                    acc.successes += 1;
                }
                acc
            })
    }
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = |n: usize, one: &str, many: &str| {
            format!("{n} {}", if n == 1 { one } else { many })
        };
        write!(f, "[ {}", plural(self.successes, "success", "successes"))?;
        if self.errors > 0 {
            write!(f, ", {}", plural(self.errors, "error", "errors"))?;
        }
        write!(f, " ]")
    }
}

/// One block's output as shown to a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutput {
    pub block: BlockKey,
    /// One row per input, fan-out blocks unwrapped
    pub rows: Layer,
    pub summary: ExecutionSummary,
}

/// Output view of `block` in `run`.
///
/// `None` when the block did not run, produced no rows, or is a
/// control-flow marker (`reduce`, `end`).
pub fn block_output(block: &Block, run: &RunType) -> Option<BlockOutput> {
    if block.block_type.is_marker() {
        return None;
    }

    let entry = run.trace_for(block.block_type, &block.name)?;
    if entry.layer.is_empty() {
        return None;
    }

    let rows = present_layer(block.block_type, &entry.layer);
    let summary = ExecutionSummary::from_layer(&rows);

    Some(BlockOutput {
        block: entry.block.clone(),
        rows,
        summary,
    })
}
