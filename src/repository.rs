//! Concurrent storage for registered providers and their tools.

use dashmap::DashMap;

use crate::model::{Provider, Tool};

/// Holds every registered provider and the tools it published, keyed by
/// provider name and fully-qualified tool name respectively.
///
/// Backed by `DashMap` (sharded locking), matching the gateway's own
/// concurrent-map choice for registries read far more often than written.
#[derive(Default)]
pub struct ToolRepository {
    providers: DashMap<String, Provider>,
    tools: DashMap<String, Tool>,
}

impl ToolRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a provider's record.
    pub fn put_provider(&self, provider: Provider) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Fetch a clone of a provider's record.
    #[must_use]
    pub fn get_provider(&self, name: &str) -> Option<Provider> {
        self.providers.get(name).map(|e| e.value().clone())
    }

    /// Remove a provider's record, returning it if present.
    pub fn remove_provider(&self, name: &str) -> Option<Provider> {
        self.providers.remove(name).map(|(_, v)| v)
    }

    /// List every registered provider name.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|e| e.key().clone()).collect()
    }

    /// Replace the full tool set published by `provider_name`.
    ///
    /// Any tool previously registered under that provider and absent from
    /// `tools` is dropped — callers pass the transport's complete discovery
    /// result on every (re)registration.
    pub fn put_tools(&self, provider_name: &str, tools: Vec<Tool>) {
        let prefix = format!("{provider_name}.");
        self.tools.retain(|name, _| !name.starts_with(&prefix));
        for tool in tools {
            self.tools.insert(tool.name.clone(), tool);
        }
    }

    /// Fetch a single tool by its fully-qualified name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.get(name).map(|e| e.value().clone())
    }

    /// Every tool currently published by `provider_name`.
    #[must_use]
    pub fn tools_for(&self, provider_name: &str) -> Vec<Tool> {
        let prefix = format!("{provider_name}.");
        self.tools
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Remove every tool published by `provider_name`.
    pub fn remove_tools_for(&self, provider_name: &str) {
        let prefix = format!("{provider_name}.");
        self.tools.retain(|name, _| !name.starts_with(&prefix));
    }

    /// Snapshot of every registered tool, in no particular order.
    #[must_use]
    pub fn all_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|e| e.value().clone()).collect()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpProvider, Provider};

    fn http_provider(name: &str) -> Provider {
        Provider::Http(HttpProvider {
            name: name.to_string(),
            http_method: "GET".to_string(),
            url: "https://example.test".to_string(),
            content_type: "application/json".to_string(),
            auth: None,
            headers: Default::default(),
            body_field: None,
            header_fields: Vec::new(),
        })
    }

    #[test]
    fn put_tools_replaces_prior_set_for_same_provider() {
        let repo = ToolRepository::new();
        repo.put_provider(http_provider("weather"));
        repo.put_tools("weather", vec![Tool::new("weather.forecast", "")]);
        assert_eq!(repo.tool_count(), 1);
        repo.put_tools("weather", vec![Tool::new("weather.current", "")]);
        assert_eq!(repo.tool_count(), 1);
        assert!(repo.get_tool("weather.forecast").is_none());
        assert!(repo.get_tool("weather.current").is_some());
    }

    #[test]
    fn remove_tools_for_only_touches_its_own_provider() {
        let repo = ToolRepository::new();
        repo.put_tools("a", vec![Tool::new("a.x", "")]);
        repo.put_tools("b", vec![Tool::new("b.x", "")]);
        repo.remove_tools_for("a");
        assert!(repo.get_tool("a.x").is_none());
        assert!(repo.get_tool("b.x").is_some());
    }
}
