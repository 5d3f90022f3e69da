//! Universal Tool Calling Protocol (UTCP) client runtime.
//!
//! A protocol-agnostic layer for discovering and invoking tools across
//! HTTP, SSE, chunked HTTP streaming, WebSocket, TCP, UDP, gRPC, GraphQL,
//! CLI, text, MCP (stdio and streamable-HTTP), and WebRTC providers through
//! one uniform [`client::UtcpClient`] interface, plus an optional
//! LLM-orchestration plugin ([`codemode`]) that plans and executes tool
//! calls from a natural-language prompt.

#![forbid(unsafe_code)]

pub mod auth;
pub mod client;
pub mod codemode;
pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod protocol;
pub mod repository;
pub mod search;
pub mod stream;
pub mod transport;
pub mod variables;

pub use client::UtcpClient;
pub use error::{Error, Result};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Set up global `tracing` logging: an `EnvFilter` seeded from `RUST_LOG`
/// (falling back to `level`), and either plain or JSON-formatted output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
