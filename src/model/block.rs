//! Block types and block specifications

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Every block type the engine knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Input,
    Data,
    DataSource,
    Code,
    Llm,
    Chat,
    Map,
    Reduce,
    While,
    End,
    Search,
    Curl,
    Browser,
}

impl BlockType {
    pub const ALL: [BlockType; 13] = [
        BlockType::Input,
        BlockType::Data,
        BlockType::DataSource,
        BlockType::Code,
        BlockType::Llm,
        BlockType::Chat,
        BlockType::Map,
        BlockType::Reduce,
        BlockType::While,
        BlockType::End,
        BlockType::Search,
        BlockType::Curl,
        BlockType::Browser,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Input => "input",
            BlockType::Data => "data",
            BlockType::DataSource => "data_source",
            BlockType::Code => "code",
            BlockType::Llm => "llm",
            BlockType::Chat => "chat",
            BlockType::Map => "map",
            BlockType::Reduce => "reduce",
            BlockType::While => "while",
            BlockType::End => "end",
            BlockType::Search => "search",
            BlockType::Curl => "curl",
            BlockType::Browser => "browser",
        }
    }

    /// Blocks whose single engine call returns the whole mapped collection.
    ///
    /// Their rows are unwrapped into one cell per element when presented.
    pub fn fans_out(&self) -> bool {
        matches!(self, BlockType::Map)
    }

    /// Control-flow/aggregation markers that produce no data of their own
    pub fn is_marker(&self) -> bool {
        matches!(self, BlockType::Reduce | BlockType::End)
    }

    /// Whether running success/error counts are shown for this block type
    pub fn shows_live_progress(&self) -> bool {
        !self.fans_out() && !self.is_marker()
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown block type '{s}'"))
    }
}

/// A typed, named unit of an app specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub spec: Map<String, Value>,
}

impl Block {
    pub fn new(block_type: BlockType, name: impl Into<String>) -> Self {
        Self {
            block_type,
            name: name.into(),
            config: Map::new(),
            spec: Map::new(),
        }
    }
}
