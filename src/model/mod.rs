//! Core UTCP data model: providers, auth, tools, manuals, chain steps.

mod auth;
mod chain;
mod manual;
mod provider;
mod tool;

pub use auth::{ApiKeyLocation, Auth};
pub use chain::ChainStep;
pub use manual::Manual;
pub use provider::{
    provider_from_value, sanitize_provider_name, CliProvider, GraphQlOperation, GraphQlProvider,
    GrpcProvider, HttpProvider, HttpStreamProvider, McpProvider, Provider, ProviderKind,
    SseProvider, TcpProvider, TextProvider, UdpProvider, WebSocketProvider, WebRtcProvider,
};
pub use tool::{Handler, Schema, Tool};
