//! Request preparation
//!
//! Turns a caller submission into the request sent to the engine. `input`
//! blocks lose their `dataset` key: an API run supplies its batch through
//! `inputs`, so a dataset attached for interactive editing must not reach the
//! engine.

use serde_json::{Map, Value};

use crate::credentials::Credentials;
use crate::model::{BlockType, EngineRunRequest, RunConfig, RunRequest, RunRunType};

/// Config key holding an `input` block's dataset reference
const DATASET_KEY: &str = "dataset";

/// Build the engine block config from the caller's config.
///
/// Returns a new map; the caller's config is left untouched.
pub fn prepare_config(config: &Map<String, Value>) -> RunConfig {
    let blocks = config
        .iter()
        .map(|(name, block_config)| (name.clone(), strip_block_config(block_config)))
        .collect();
    RunConfig { blocks }
}

fn strip_block_config(block_config: &Value) -> Value {
    let mut block_config = block_config.clone();
    if is_input_block(&block_config) {
        if let Some(obj) = block_config.as_object_mut() {
            if obj.remove(DATASET_KEY).is_some() {
                tracing::debug!("Dropped dataset from input block config");
            }
        }
    }
    block_config
}

fn is_input_block(block_config: &Value) -> bool {
    block_config
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t == BlockType::Input.as_str())
}

/// Build the full engine request for a submission
pub fn prepare_request(
    request: &RunRequest,
    run_type: RunRunType,
    credentials: Credentials,
) -> EngineRunRequest {
    EngineRunRequest {
        run_type,
        specification_hash: request.specification_hash.clone(),
        config: prepare_config(&request.config),
        inputs: request.inputs.clone(),
        credentials,
    }
}
