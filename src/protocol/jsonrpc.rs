//! JSON-RPC 2.0 envelope types shared by both MCP bindings (stdio, HTTP).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outgoing JSON-RPC request.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    jsonrpc: &'static str,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    /// Build a request with the given id (a JSON number or string).
    #[must_use]
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC notification — same shape as a request but with no `id`, and
/// the peer must not reply.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Build a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// An incoming JSON-RPC response, either a result or an error, never both.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Response {
    /// Parse one line of a line-delimited stdio transcript, or one HTTP
    /// response body, into a `Response`.
    pub fn from_str(raw: &str) -> crate::Result<Self> {
        serde_json::from_str(raw).map_err(Into::into)
    }

    /// Collapse `{result}` / `{error}` into a single `Result`.
    pub fn into_result(self) -> crate::Result<Value> {
        if let Some(error) = self.error {
            return Err(crate::Error::mcp(error.code, error.message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}
