//! Filtering, results and fan-out unwrap

use std::collections::HashSet;

use serde_json::Value;

use crate::model::{BlockType, Layer, Row, RunState, RunStatus, RunType, TraceCell, TraceEntry};

/// Caller-visible view of a run's status and trace
#[derive(Debug, Clone, PartialEq)]
pub struct Reshaped {
    pub status: RunStatus,
    pub traces: Vec<TraceEntry>,
    pub results: Option<Layer>,
}

/// Keep only the trace and status entries whose block name is in `names`.
///
/// Relative order of the remaining entries is preserved.
pub fn filter_blocks(
    traces: &[TraceEntry],
    status: &RunStatus,
    names: &[String],
) -> (Vec<TraceEntry>, RunStatus) {
    let keep: HashSet<&str> = names.iter().map(String::as_str).collect();

    let traces = traces
        .iter()
        .filter(|t| keep.contains(t.name()))
        .cloned()
        .collect();

    let status = RunStatus {
        run: status.run,
        blocks: status
            .blocks
            .iter()
            .filter(|b| keep.contains(b.name.as_str()))
            .cloned()
            .collect(),
    };

    (traces, status)
}

/// The last trace entry's layer when the run succeeded, `None` otherwise
pub fn final_results(status: &RunStatus, traces: &[TraceEntry]) -> Option<Layer> {
    match (status.run, traces.last()) {
        (RunState::Succeeded, Some(last)) => Some(last.layer.clone()),
        _ => None,
    }
}

/// Reshape a raw trace/status pair; inputs are left untouched
pub fn reshape(
    traces: &[TraceEntry],
    status: &RunStatus,
    block_filter: Option<&[String]>,
) -> Reshaped {
    let (traces, status) = match block_filter {
        Some(names) => filter_blocks(traces, status, names),
        None => (traces.to_vec(), status.clone()),
    };
    let results = final_results(&status, &traces);

    Reshaped {
        status,
        traces,
        results,
    }
}

/// Reshape an owned run into the run returned to the caller
pub fn reshape_run(mut run: RunType, block_filter: Option<&[String]>) -> RunType {
    let reshaped = reshape(&run.traces, &run.status, block_filter);
    run.status = reshaped.status;
    run.traces = reshaped.traces;
    run.results = reshaped.results;
    run
}

/// Present one row of a block's layer.
///
/// For fan-out blocks (`map`) the engine returns the whole mapped collection
/// as the row's single value; without an error, that array becomes one cell
/// per element. Rows holding an error, or not holding an array, are returned
/// as they are. Every other block type passes through.
pub fn reshape_row(block_type: BlockType, row: &Row) -> Row {
    if !block_type.fans_out() || row.iter().any(TraceCell::is_error) {
        return row.clone();
    }

    match row.first().and_then(|cell| cell.value.as_ref()) {
        Some(Value::Array(elements)) => elements.iter().cloned().map(TraceCell::ok).collect(),
        _ => row.clone(),
    }
}

/// Present a whole layer of a block
pub fn present_layer(block_type: BlockType, layer: &Layer) -> Layer {
    layer.iter().map(|row| reshape_row(block_type, row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn entry(block_type: BlockType, name: &str, value: Value) -> TraceEntry {
        TraceEntry::new(block_type, name, vec![vec![TraceCell::ok(value)]])
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

    fn three_step_run() -> (Vec<TraceEntry>, RunStatus) {
        let traces = vec![
            entry(BlockType::Code, "STEP1", json!(1)),
            entry(BlockType::Code, "STEP2", json!(2)),
            entry(BlockType::Code, "STEP3", json!(3)),
        ];
        let status = RunStatus {
            run: RunState::Succeeded,
            blocks: vec![block_status("STEP1"), block_status("STEP2"), block_status("STEP3")],
        };
        (traces, status)
    }

    #[test]
    fn results_are_last_layer_when_succeeded() {
        let (traces, status) = three_step_run();
        let reshaped = reshape(&traces, &status, None);
        assert_eq!(reshaped.results, Some(vec![vec![TraceCell::ok(json!(3))]]));
        assert_eq!(reshaped.traces.len(), 3);
    }

    #[test]
    fn results_are_none_unless_succeeded() {
        let (traces, mut status) = three_step_run();
        for state in [RunState::Running, RunState::Errored] {
            status.run = state;
            assert_eq!(reshape(&traces, &status, None).results, None);
        }
    }

    #[test]
    fn results_are_none_for_empty_trace() {
        let status = RunStatus::new(RunState::Succeeded);
        assert_eq!(reshape(&[], &status, None).results, None);
    }

    #[test]
    fn block_filter_keeps_only_named_blocks() {
        let (traces, status) = three_step_run();
        let filter = vec!["STEP2".to_string()];

        let reshaped = reshape(&traces, &status, Some(filter.as_slice()));

        assert_eq!(reshaped.traces.len(), 1);
        assert_eq!(reshaped.traces[0].name(), "STEP2");
        assert_eq!(reshaped.status.blocks.len(), 1);
        assert_eq!(reshaped.status.blocks[0].name, "STEP2");
        assert_eq!(reshaped.results, Some(vec![vec![TraceCell::ok(json!(2))]]));
    }

    #[test]
    fn block_filter_preserves_order_not_filter_order() {
        let (traces, status) = three_step_run();
        let filter = vec!["STEP3".to_string(), "STEP1".to_string(), "MISSING".to_string()];
        let reshaped = reshape(&traces, &status, Some(filter.as_slice()));
        let names: Vec<_> = reshaped.traces.iter().map(TraceEntry::name).collect();
        assert_eq!(names, vec!["STEP1", "STEP3"]);
    }

    #[test]
    fn reshape_does_not_touch_inputs() {
        let (traces, status) = three_step_run();
        let before = (traces.clone(), status.clone());
        let _ = reshape(&traces, &status, Some(&["STEP2".to_string()][..]));
        assert_eq!((traces, status), before);
    }

    #[test]
    fn map_row_unwraps_into_one_cell_per_element() {
        let row = vec![TraceCell::ok(json!(["a", "b", "c"]))];
        let presented = reshape_row(BlockType::Map, &row);
        assert_eq!(
            presented,
            vec![
                TraceCell::ok(json!("a")),
                TraceCell::ok(json!("b")),
                TraceCell::ok(json!("c")),
            ]
        );
        let wire = serde_json::to_value(&presented[0]).unwrap();
        assert_eq!(wire, json!({"value": "a", "error": null}));
    }

    #[test]
    fn map_row_with_error_is_unchanged() {
        let row = vec![TraceCell::err("timeout")];
        assert_eq!(reshape_row(BlockType::Map, &row), row);
    }

    #[test]
    fn map_row_with_non_array_value_is_unchanged() {
        let row = vec![TraceCell::ok(json!({"not": "an array"}))];
        assert_eq!(reshape_row(BlockType::Map, &row), row);
    }

    #[test]
    fn empty_map_array_yields_empty_row() {
        let row = vec![TraceCell::ok(json!([]))];
        assert!(reshape_row(BlockType::Map, &row).is_empty());
    }

    #[test]
    fn other_block_types_pass_through() {
        let row = vec![TraceCell::ok(json!([1, 2]))];
        for block_type in [BlockType::Reduce, BlockType::End, BlockType::Llm, BlockType::Code] {
            assert_eq!(reshape_row(block_type, &row), row);
        }
    }

    #[test]
    fn present_layer_applies_per_row() {
        let layer = vec![
            vec![TraceCell::ok(json!([1, 2]))],
            vec![TraceCell::err("boom")],
        ];
        let presented = present_layer(BlockType::Map, &layer);
        assert_eq!(presented[0].len(), 2);
        assert_eq!(presented[1], layer[1]);
    }

    #[test]
    fn reshape_run_sets_results() {
        let (traces, status) = three_step_run();
        let run = RunType {
            run_id: "r".to_string(),
            created: 0,
            run_type: Default::default(),
            specification_hash: None,
            config: Default::default(),
            status,
            traces,
            results: None,
        };
        let run = reshape_run(run, Some(&["STEP1".to_string()][..]));
        assert_eq!(run.traces.len(), 1);
        assert_eq!(run.results, Some(vec![vec![TraceCell::ok(json!(1))]]));
    }
}
