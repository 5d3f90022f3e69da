//! Wire-protocol support shared by the MCP transport's two bindings.

pub mod jsonrpc;
pub mod mcp_types;
