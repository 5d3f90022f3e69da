//! A single step in a `call_chain` execution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a tool chain run sequentially by the client kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStep {
    /// Optional alias used as this step's key in the result map; defaults to
    /// `tool_name` when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Fully qualified tool name to invoke.
    pub tool_name: String,
    /// Static inputs for this step.
    #[serde(default)]
    pub inputs: HashMap<String, Value>,
    /// When set, the previous step's result is merged into `inputs` under
    /// the key `__previous_output` before this step runs.
    #[serde(default)]
    pub use_previous: bool,
    /// When set, invoke via `call_stream` instead of `call` (the stream is
    /// materialized to a `Vec<Value>` before being handed to the next step
    /// or placed in the result map — see client::call_chain).
    #[serde(default)]
    pub stream: bool,
}

impl ChainStep {
    /// The key this step's result is stored under in the chain's result map.
    #[must_use]
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.tool_name)
    }
}
