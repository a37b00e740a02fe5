//! Caller submissions and engine-facing run requests

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::run::{RunConfig, RunRunType};
use crate::credentials::Credentials;

/// A validated caller submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub specification_hash: String,
    /// Block name → block config, as stored for the app
    pub config: Map<String, Value>,
    pub inputs: Vec<Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_filter: Option<Vec<String>>,
}

impl RunRequest {
    pub fn new(specification_hash: impl Into<String>, config: Map<String, Value>, inputs: Vec<Value>) -> Self {
        Self {
            specification_hash: specification_hash.into(),
            config,
            inputs,
            stream: false,
            blocking: false,
            block_filter: None,
        }
    }

    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_block_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.block_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// The request actually sent to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRunRequest {
    pub run_type: RunRunType,
    pub specification_hash: String,
    pub config: RunConfig,
    pub inputs: Vec<Value>,
    pub credentials: Credentials,
}
