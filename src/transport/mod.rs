//! Transport abstraction and the kind-keyed registry that dispatches to it.

pub mod cli;
pub mod graphql;
pub mod grpc;
pub mod http;
pub mod http_stream;
pub mod mcp;
pub mod openapi;
pub mod sse;
pub mod tcp;
pub mod text;
pub mod udp;
pub mod websocket;

#[cfg(feature = "webrtc-transport")]
pub mod webrtc;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Provider, ProviderKind, Tool};
use crate::stream::StreamResult;

/// Every transport implements the same four operations. All four must fail
/// with `Error::WrongProviderKind` if handed a provider variant they don't
/// own — this preserves the invariant that a registry lookup by
/// `ProviderKind` always reaches a transport that can actually handle the
/// provider it's given.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Discover and return the tools a provider publishes.
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>>;

    /// Release any resources (connections, subprocesses) held for a provider.
    async fn deregister(&self, provider: &Provider) -> Result<()>;

    /// Invoke `name` (transport-visible — already stripped of the provider
    /// prefix for MCP/Text) with `args` against `provider`.
    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider)
        -> Result<Value>;

    /// Invoke `name` as a streaming call.
    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>>;
}

/// Dispatch table keyed by `ProviderKind`, not virtual dispatch on the
/// provider value — a provider's `kind()` selects its transport in one
/// lookup (spec.md §4.1 "Select the transport; reject unsupported types").
#[derive(Default)]
pub struct TransportRegistry {
    table: HashMap<ProviderKind, Arc<dyn Transport>>,
}

impl TransportRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the transport implementation for `kind`.
    pub fn insert(&mut self, kind: ProviderKind, transport: Arc<dyn Transport>) {
        self.table.insert(kind, transport);
    }

    /// Look up the transport for `kind`.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn Transport>> {
        self.table
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::WrongProviderKind(format!("no transport registered for {kind:?}")))
    }

    /// Build the default registry wiring every built-in transport, including
    /// the `webrtc` one when the `webrtc-transport` feature is enabled.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(ProviderKind::Http, Arc::new(http::HttpTransport::new()));
        registry.insert(ProviderKind::Sse, Arc::new(sse::SseTransport::new()));
        registry.insert(
            ProviderKind::HttpStream,
            Arc::new(http_stream::HttpStreamTransport::new()),
        );
        registry.insert(ProviderKind::Cli, Arc::new(cli::CliTransport::new()));
        registry.insert(
            ProviderKind::WebSocket,
            Arc::new(websocket::WebSocketTransport::new()),
        );
        registry.insert(ProviderKind::Grpc, Arc::new(grpc::GrpcTransport::new()));
        registry.insert(
            ProviderKind::GraphQl,
            Arc::new(graphql::GraphQlTransport::new()),
        );
        registry.insert(ProviderKind::Tcp, Arc::new(tcp::TcpTransport::new()));
        registry.insert(ProviderKind::Udp, Arc::new(udp::UdpTransport::new()));
        registry.insert(ProviderKind::Mcp, Arc::new(mcp::McpTransport::new()));
        registry.insert(ProviderKind::Text, Arc::new(text::TextTransport::new()));
        #[cfg(feature = "webrtc-transport")]
        registry.insert(
            ProviderKind::WebRtc,
            Arc::new(webrtc::WebRtcTransport::new()),
        );
        registry
    }
}
