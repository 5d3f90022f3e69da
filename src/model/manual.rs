//! A provider's discovery payload: the list of tools it publishes.

use serde::{Deserialize, Serialize};

use super::tool::Tool;

/// Wire shape returned by a provider's discovery endpoint, or produced by
/// the OpenAPI converter: `{version, tools: [...], name?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manual {
    /// Manual format version, e.g. `"1.0"`.
    #[serde(default)]
    pub version: String,
    /// Optional manual name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ordered list of tools.
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl Manual {
    /// An empty manual with no tools.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}
