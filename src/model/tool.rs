//! Tool definitions.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// An open, JSON-schema-like record describing tool inputs or outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// JSON-schema `type`, e.g. `"object"`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Property definitions, each itself a nested schema-shaped value.
    #[serde(default)]
    pub properties: std::collections::HashMap<String, Value>,
    /// Required property names.
    #[serde(default)]
    pub required: Vec<String>,
    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An in-process callable backing the Text transport's handlers.
///
/// Registered out-of-band by the embedding application; invoked directly by
/// `TextTransport::call` without crossing any wire protocol.
pub type Handler = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// A named, schema-typed operation exposed by a provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Fully qualified as `<provider>.<local>` once stored in the repository.
    pub name: String,
    /// Human-readable description, used by the search strategy.
    #[serde(default)]
    pub description: String,
    /// Free-form tags, used by the search strategy.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Input schema.
    #[serde(default)]
    pub inputs: Schema,
    /// Output schema.
    #[serde(default)]
    pub outputs: Schema,
    /// Optional size hint for the average response, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_response_size: Option<u64>,
    /// In-process handler (Text transport only). Never serialized.
    #[serde(skip)]
    pub handler: Option<Handler>,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("average_response_size", &self.average_response_size)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Tool {
    /// Construct a bare tool with just a name and description — used by
    /// transports whose discovery payload is minimal (e.g. MCP).
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags: Vec::new(),
            inputs: Schema::default(),
            outputs: Schema::default(),
            average_response_size: None,
            handler: None,
        }
    }

    /// Strip a leading dot from the tool's local part, then force the
    /// `<provider>.` prefix — the normalization step the kernel applies to
    /// every tool a transport discovers on registration.
    pub fn normalize_prefix(&mut self, sanitized_provider_name: &str) {
        let local = self
            .name
            .rsplit_once('.')
            .map_or(self.name.as_str(), |(_, local)| local)
            .trim_start_matches('.');
        self.name = format!("{sanitized_provider_name}.{local}");
    }
}
