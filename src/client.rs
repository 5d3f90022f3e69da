//! The client kernel (spec.md §4.1): registration, name resolution,
//! three-tier caching, and the `call`/`call_stream`/`search`/`call_chain`
//! entry points.
//!
//! Grounded on the upstream `rs-utcp` reference client's `UtcpClient` (its
//! `resolve_tool`, OpenAPI-first registration fallback, and
//! retain()-based cache invalidation on deregister), recombined with the
//! teacher's `DashMap`-backed concurrent caches and `tracing` instrumentation
//! style.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::model::{sanitize_provider_name, ChainStep, Manual, Provider, ProviderKind, Tool};
use crate::repository::ToolRepository;
use crate::search::{DefaultSearchStrategy, SearchStrategy};
use crate::stream::{collect, StreamResult};
use crate::transport::openapi;
use crate::transport::{Transport, TransportRegistry};
use crate::variables::VariableResolver;

/// A tool resolved once and cached for subsequent calls: its provider and
/// the transport that owns its `ProviderKind`.
#[derive(Clone)]
struct ResolvedTool {
    provider: Provider,
    transport: Arc<dyn Transport>,
}

/// The UTCP client kernel. Cheap to clone-share via `Arc` — every field is
/// itself concurrency-safe.
pub struct UtcpClient {
    repository: ToolRepository,
    registry: TransportRegistry,
    resolver: VariableResolver,
    config: ClientConfig,
    search_strategy: Box<dyn SearchStrategy>,
    discovery_http: HttpClient,

    /// Fast-path cache: fully-qualified tool name → its resolved provider
    /// and transport. Invalidated per-provider on deregister.
    resolved: DashMap<String, ResolvedTool>,
}

impl UtcpClient {
    /// Build a client with the default transport registry and search
    /// strategy, reading ambient settings from the environment.
    #[must_use]
    pub fn new(resolver: VariableResolver) -> Self {
        Self::with_parts(
            TransportRegistry::with_defaults(),
            resolver,
            ClientConfig::from_env(),
            Box::new(DefaultSearchStrategy::default()),
        )
    }

    /// Build a client from explicit parts — used by tests and by embedders
    /// who want a non-default transport registry or search strategy.
    #[must_use]
    pub fn with_parts(
        registry: TransportRegistry,
        resolver: VariableResolver,
        config: ClientConfig,
        search_strategy: Box<dyn SearchStrategy>,
    ) -> Self {
        Self {
            repository: ToolRepository::new(),
            registry,
            resolver,
            config,
            search_strategy,
            discovery_http: HttpClient::new(),
            resolved: DashMap::new(),
        }
    }

    /// Parse and register every provider described by a providers-file
    /// payload (spec.md §7), skipping entries that fail to parse or
    /// substitute.
    pub async fn load_providers(&self, raw: &str) -> Result<Vec<String>> {
        let providers = crate::loader::load_providers(raw, &self.resolver)?;
        let mut registered = Vec::with_capacity(providers.len());
        for provider in providers {
            let name = provider.name().to_string();
            match self.register_provider(provider).await {
                Ok(_) => registered.push(name),
                Err(e) => warn!(provider = %name, error = %e, "failed to register provider"),
            }
        }
        Ok(registered)
    }

    /// Register a single provider: sanitize its name, select its transport,
    /// run discovery (trying an OpenAPI conversion first for HTTP
    /// providers), normalize and store its tools (spec.md §4.1
    /// "Registration").
    ///
    /// A provider name already registered is treated as idempotent: the
    /// existing tool set is reused and its cache entries re-primed rather
    /// than re-running discovery.
    #[instrument(skip(self, provider), fields(provider = provider.name()))]
    pub async fn register_provider(&self, provider: Provider) -> Result<Vec<Tool>> {
        let kind = provider.kind();
        let transport = self.registry.get(kind)?;
        let name = sanitize_provider_name(provider.name(), kind);

        if let Some(existing) = self.repository.get_provider(&name) {
            let tools = self.repository.tools_for(&name);
            self.prime_resolved_cache(&existing, transport.clone(), &tools);
            info!(provider = %name, tool_count = tools.len(), "provider already registered, reusing cached tools");
            return Ok(tools);
        }

        let mut provider = provider;
        provider.set_name(name.clone());

        let mut tools = if kind == ProviderKind::Http {
            self.register_http_openapi_first(&provider, transport.as_ref()).await?
        } else {
            transport.register(&provider).await?
        };

        for tool in &mut tools {
            tool.normalize_prefix(&name);
        }

        self.repository.put_provider(provider.clone());
        self.repository.put_tools(&name, tools.clone());
        self.prime_resolved_cache(&provider, transport, &tools);

        info!(provider = %name, tool_count = tools.len(), "registered provider");
        Ok(tools)
    }

    /// HTTP providers get one extra discovery attempt: probe the configured
    /// URL for an OpenAPI/Swagger document and convert it directly into a
    /// `Manual`, before falling back to the HTTP transport's own discovery
    /// call (a native UTCP manual response).
    async fn register_http_openapi_first(
        &self,
        provider: &Provider,
        transport: &dyn Transport,
    ) -> Result<Vec<Tool>> {
        if let Provider::Http(p) = provider {
            if let Some(manual) = openapi::discover(&self.discovery_http, &p.url).await {
                if !manual.tools.is_empty() {
                    return Ok(manual.tools);
                }
            }
        }
        transport.register(provider).await
    }

    /// Release a provider's transport-side resources and forget its tools.
    #[instrument(skip(self))]
    pub async fn deregister_provider(&self, name: &str) -> Result<()> {
        let provider = self
            .repository
            .get_provider(name)
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))?;
        let transport = self.registry.get(provider.kind())?;
        transport.deregister(&provider).await?;
        self.repository.remove_provider(name);
        self.repository.remove_tools_for(name);
        self.invalidate_provider_cache(name);
        Ok(())
    }

    fn invalidate_provider_cache(&self, provider_name: &str) {
        let prefix = format!("{provider_name}.");
        self.resolved.retain(|name, _| !name.starts_with(&prefix));
    }

    /// Insert a fast-path cache entry for every tool a provider published,
    /// overwriting any stale entry left from a prior registration.
    fn prime_resolved_cache(&self, provider: &Provider, transport: Arc<dyn Transport>, tools: &[Tool]) {
        let resolved = ResolvedTool {
            provider: provider.clone(),
            transport,
        };
        for tool in tools {
            self.resolved.insert(tool.name.clone(), resolved.clone());
        }
    }

    /// Split a fully-qualified tool name into `(provider, local)`.
    fn split_name(name: &str) -> Result<(&str, &str)> {
        name.split_once('.')
            .ok_or_else(|| Error::ToolNotFound(format!("not a fully qualified tool name: {name}")))
    }

    /// Resolve `name` to its provider and transport, consulting the
    /// fast-path cache before falling back to the repository.
    fn resolve(&self, name: &str) -> Result<ResolvedTool> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(cached.value().clone());
        }

        let (provider_name, _) = Self::split_name(name)?;
        self.repository
            .get_tool(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        let provider = self
            .repository
            .get_provider(provider_name)
            .ok_or_else(|| Error::ProviderNotFound(provider_name.to_string()))?;
        let transport = self.registry.get(provider.kind())?;

        let resolved = ResolvedTool { provider, transport };
        self.resolved.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Transport-visible local name: MCP and Text are invoked with the
    /// provider prefix already stripped (spec.md §4.1 "Dispatch").
    fn transport_local_name<'a>(kind: ProviderKind, name: &'a str, local: &'a str) -> &'a str {
        match kind {
            ProviderKind::Mcp | ProviderKind::Text => local,
            _ => name,
        }
    }

    /// Call a tool once, returning its unary result.
    #[instrument(skip(self, args))]
    pub async fn call(&self, name: &str, args: HashMap<String, Value>) -> Result<Value> {
        let (_, local) = Self::split_name(name)?;
        let resolved = self.resolve(name)?;
        let visible = Self::transport_local_name(resolved.provider.kind(), name, local);
        resolved.transport.call(visible, args, &resolved.provider).await
    }

    /// Call a tool as a stream.
    #[instrument(skip(self, args))]
    pub async fn call_stream(&self, name: &str, args: HashMap<String, Value>) -> Result<Box<dyn StreamResult>> {
        let (_, local) = Self::split_name(name)?;
        let resolved = self.resolve(name)?;
        let visible = Self::transport_local_name(resolved.provider.kind(), name, local);
        resolved.transport.call_stream(visible, args, &resolved.provider).await
    }

    /// Rank registered tools against a free-text query (spec.md §4.1
    /// "Search"). `limit` defaults to the configured
    /// `search_tools_limit` when `None`.
    #[must_use]
    pub fn search(&self, query: &str, limit: Option<usize>) -> Vec<Tool> {
        let tools = self.repository.all_tools();
        let limit = limit.unwrap_or(self.config.search_tools_limit);
        self.search_strategy.search(tools, query, limit)
    }

    /// Run a sequence of tool calls, threading `use_previous` inputs and
    /// materializing any `stream: true` step to a `Vec<Value>` before it's
    /// handed to the next step (SPEC_FULL.md §9: streaming steps inside a
    /// chain always collapse to a list, since a chain step's output is a
    /// single JSON value fed into the next step's inputs).
    ///
    /// `timeout` is the overall chain deadline, divided evenly across steps
    /// (spec.md §4.1 "Chain execution"): each step's call or stream-collect
    /// is wrapped in its own slice of the budget, and a step that doesn't
    /// finish within it fails the whole chain with `Error::DeadlineExceeded`
    /// rather than running the remaining steps against a blown budget.
    pub async fn call_chain(&self, steps: &[ChainStep], timeout: Duration) -> Result<Vec<(String, Value)>> {
        let per_step = timeout
            .checked_div(steps.len().max(1) as u32)
            .unwrap_or(timeout);

        let mut results = Vec::with_capacity(steps.len());
        let mut previous: Option<Value> = None;

        for step in steps {
            let mut inputs = step.inputs.clone();
            if step.use_previous {
                if let Some(prev) = &previous {
                    inputs.insert("__previous_output".to_string(), prev.clone());
                }
            }

            let output = if step.stream {
                let items = tokio::time::timeout(per_step, async {
                    let stream = self.call_stream(&step.tool_name, inputs).await?;
                    collect(stream).await
                })
                .await
                .map_err(|_| Error::DeadlineExceeded)??;
                Value::Array(items)
            } else {
                tokio::time::timeout(per_step, self.call(&step.tool_name, inputs))
                    .await
                    .map_err(|_| Error::DeadlineExceeded)??
            };

            previous = Some(output.clone());
            results.push((step.key().to_string(), output));
        }

        Ok(results)
    }

    /// Fetch a manual-shaped view of every currently registered tool — used
    /// by CodeMode to render tool specs for the LLM prompt.
    #[must_use]
    pub fn manual(&self) -> Manual {
        Manual {
            version: "1.0".to_string(),
            name: None,
            tools: self.repository.all_tools(),
        }
    }

    /// Number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.repository.provider_count()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.repository.tool_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HttpProvider, Provider};
    use crate::stream::SliceStreamResult;
    use async_trait::async_trait;

    struct StubTransport;

    #[async_trait]
    impl Transport for StubTransport {
        async fn register(&self, _provider: &Provider) -> Result<Vec<Tool>> {
            Ok(vec![Tool::new("ping", "replies pong")])
        }

        async fn deregister(&self, _provider: &Provider) -> Result<()> {
            Ok(())
        }

        async fn call(&self, name: &str, _args: HashMap<String, Value>, _provider: &Provider) -> Result<Value> {
            Ok(serde_json::json!({ "called": name }))
        }

        async fn call_stream(
            &self,
            name: &str,
            _args: HashMap<String, Value>,
            _provider: &Provider,
        ) -> Result<Box<dyn StreamResult>> {
            Ok(Box::new(SliceStreamResult::new(vec![serde_json::json!({ "called": name })])))
        }
    }

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

    fn stub_client() -> UtcpClient {
        let mut registry = TransportRegistry::new();
        registry.insert(ProviderKind::Http, Arc::new(StubTransport));
        UtcpClient::with_parts(
            registry,
            VariableResolver::new(),
            ClientConfig::default(),
            Box::new(DefaultSearchStrategy::default()),
        )
    }

    /// Like [`StubTransport`], but counts `register` invocations so tests
    /// can assert an idempotent re-register never re-runs discovery.
    #[derive(Default)]
    struct CountingStubTransport {
        registrations: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingStubTransport {
        async fn register(&self, _provider: &Provider) -> Result<Vec<Tool>> {
            self.registrations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![Tool::new("ping", "replies pong")])
        }

        async fn deregister(&self, _provider: &Provider) -> Result<()> {
            Ok(())
        }

        async fn call(&self, name: &str, _args: HashMap<String, Value>, _provider: &Provider) -> Result<Value> {
            Ok(serde_json::json!({ "called": name }))
        }

        async fn call_stream(
            &self,
            name: &str,
            _args: HashMap<String, Value>,
            _provider: &Provider,
        ) -> Result<Box<dyn StreamResult>> {
            Ok(Box::new(SliceStreamResult::new(vec![serde_json::json!({ "called": name })])))
        }
    }

    #[tokio::test]
    async fn register_then_call_resolves_through_cache() {
        let client = stub_client();
        client.register_provider(http_provider("svc")).await.unwrap();
        assert_eq!(client.tool_count(), 1);

        let result = client.call("svc.ping", HashMap::new()).await.unwrap();
        assert_eq!(result["called"], "svc.ping");
        assert!(client.resolved.contains_key("svc.ping"));
    }

    #[tokio::test]
    async fn register_sanitizes_dotted_provider_names() {
        let client = stub_client();
        let tools = client.register_provider(http_provider("my.http")).await.unwrap();
        assert_eq!(tools[0].name, "my_http.ping");
        let result = client.call("my_http.ping", HashMap::new()).await.unwrap();
        assert_eq!(result["called"], "my_http.ping");
    }

    #[tokio::test]
    async fn reregistering_the_same_provider_is_idempotent() {
        let mut registry = TransportRegistry::new();
        let transport = Arc::new(CountingStubTransport::default());
        registry.insert(ProviderKind::Http, transport.clone());
        let client = UtcpClient::with_parts(
            registry,
            VariableResolver::new(),
            ClientConfig::default(),
            Box::new(DefaultSearchStrategy::default()),
        );

        client.register_provider(http_provider("svc")).await.unwrap();
        let tools = client.register_provider(http_provider("svc")).await.unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "svc.ping");
        assert_eq!(transport.registrations.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(client.resolved.contains_key("svc.ping"));
    }

    #[tokio::test]
    async fn deregister_invalidates_resolved_cache() {
        let client = stub_client();
        client.register_provider(http_provider("svc")).await.unwrap();
        client.call("svc.ping", HashMap::new()).await.unwrap();
        assert!(client.resolved.contains_key("svc.ping"));

        client.deregister_provider("svc").await.unwrap();
        assert!(!client.resolved.contains_key("svc.ping"));
        assert_eq!(client.tool_count(), 0);
        assert!(client.call("svc.ping", HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn call_chain_threads_previous_output() {
        let client = stub_client();
        client.register_provider(http_provider("svc")).await.unwrap();

        let steps = vec![
            ChainStep {
                id: Some("first".to_string()),
                tool_name: "svc.ping".to_string(),
                inputs: HashMap::new(),
                use_previous: false,
                stream: false,
            },
            ChainStep {
                id: Some("second".to_string()),
                tool_name: "svc.ping".to_string(),
                inputs: HashMap::new(),
                use_previous: true,
                stream: false,
            },
        ];

        let results = client.call_chain(&steps, Duration::from_secs(5)).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "first");
        assert_eq!(results[1].0, "second");
    }

    #[test]
    fn search_ranks_registered_tools() {
        let client = stub_client();
        client.repository.put_tools(
            "svc",
            vec![
                Tool::new("svc.ping", "replies pong"),
                Tool::new("svc.other", "unrelated"),
            ],
        );
        let results = client.search("pong", None);
        assert_eq!(results[0].name, "svc.ping");
    }
}
