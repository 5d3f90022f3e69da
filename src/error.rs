//! Error types for the UTCP client runtime

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// UTCP client errors
#[derive(Error, Debug)]
pub enum Error {
    /// A transport received a provider variant it cannot handle
    #[error("wrong provider kind for transport: {0}")]
    WrongProviderKind(String),

    /// No provider registered under this name
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Provider is known but has no tool with this local name
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Text/MCP transport has no handler registered for this tool
    #[error("tool not registered: {0}")]
    ToolNotRegistered(String),

    /// Requested auth kind cannot be applied through this transport
    #[error("unsupported auth for this transport: {0}")]
    UnsupportedAuth(String),

    /// A transport refused to proceed for a security reason (e.g. non-HTTPS GraphQL endpoint)
    #[error("security violation: {0}")]
    SecurityViolation(String),

    /// Wire-level failure: connection, timeout, non-2xx status
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure to parse a protocol message (JSON decode, MCP error object, ...)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Variable substitution could not resolve a `${NAME}`/`$NAME` reference
    #[error("variable not found: {0}")]
    VariableNotFound(String),

    /// Remote MCP method failure inside an otherwise-healthy channel
    #[error("MCP error {code}: {message}")]
    Mcp {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
    },

    /// Sandbox compile or runtime failure in the CodeMode interpreter
    #[error("code execution error: {0}")]
    CodeExecution(String),

    /// Caller cancelled the operation
    #[error("cancelled")]
    Cancelled,

    /// Operation exceeded its deadline
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Malformed configuration or providers file
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build an `Mcp` error from a JSON-RPC error object
    #[must_use]
    pub fn mcp(code: i64, message: impl Into<String>) -> Self {
        Self::Mcp {
            code,
            message: message.into(),
        }
    }
}
