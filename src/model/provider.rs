//! Provider variants — one per `provider_type`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::auth::Auth;

/// Closed set of provider discriminators, doubling as the transport-registry
/// lookup key (spec.md §9: "table lookup keyed by discriminator, not
/// virtual dispatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Http,
    Sse,
    HttpStream,
    Cli,
    WebSocket,
    Grpc,
    GraphQl,
    Tcp,
    Udp,
    WebRtc,
    Mcp,
    Text,
}

impl ProviderKind {
    /// Lowercase key form, used as a provider-name fallback when the
    /// configured name is empty.
    #[must_use]
    pub fn as_key(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Sse => "sse",
            Self::HttpStream => "http_stream",
            Self::Cli => "cli",
            Self::WebSocket => "websocket",
            Self::Grpc => "grpc",
            Self::GraphQl => "graphql",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::WebRtc => "webrtc",
            Self::Mcp => "mcp",
            Self::Text => "text",
        }
    }
}

/// HTTP method, a thin wrapper to keep the provider struct serde-friendly.
pub type HttpMethod = String;

/// `http` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProvider {
    pub name: String,
    #[serde(default = "default_http_method")]
    pub http_method: HttpMethod,
    pub url: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_field: Option<String>,
    #[serde(default)]
    pub header_fields: Vec<String>,
}

fn default_http_method() -> String {
    "GET".to_string()
}
fn default_content_type() -> String {
    "application/json".to_string()
}

/// `sse` / `http_stream` provider (shared shape — only the transport differs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseProvider {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_field: Option<String>,
    #[serde(default)]
    pub reconnect: bool,
}

/// `http_stream` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStreamProvider {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body_field: Option<String>,
}

/// `websocket` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketProvider {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// `grpc` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcProvider {
    pub name: String,
    #[serde(default = "default_grpc_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub port: u16,
    pub service_name: String,
    pub method_name: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub auth: Option<Auth>,
}

fn default_grpc_host() -> String {
    "127.0.0.1".to_string()
}
fn default_grpc_port() -> u16 {
    9339
}

/// GraphQL operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphQlOperation {
    Query,
    Mutation,
    Subscription,
}

/// `graphql` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQlProvider {
    pub name: String,
    pub url: String,
    #[serde(default = "default_graphql_op")]
    pub operation_type: GraphQlOperation,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_graphql_op() -> GraphQlOperation {
    GraphQlOperation::Query
}

/// `tcp` / `udp` provider (shared shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpProvider {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_socket_timeout_ms")]
    pub timeout_ms: u64,
}

/// `udp` provider.
pub type UdpProvider = TcpProvider;

fn default_socket_timeout_ms() -> u64 {
    30_000
}

/// `webrtc` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcProvider {
    pub name: String,
    pub signaling_url: String,
    pub peer_id: String,
    pub data_channel_name: String,
}

/// `mcp` provider: either a child-process (stdio) or a streamable-HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpProvider {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub stdin_data: Option<String>,
    #[serde(default = "default_mcp_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_mcp_timeout_ms() -> u64 {
    30_000
}

impl McpProvider {
    /// True when this provider should speak streamable-HTTP instead of stdio.
    #[must_use]
    pub fn is_http(&self) -> bool {
        self.url.is_some()
    }
}

/// `text` provider: a local JSON manifest file plus in-process handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProvider {
    pub name: String,
    pub file_path: String,
}

/// `cli` provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliProvider {
    pub name: String,
    pub command_name: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// A configured endpoint descriptor for a single transport instance.
///
/// Every variant is variable-substituted once and then treated as immutable
/// — callers clone a `Provider` before handing it to a transport so that
/// cached copies in the client kernel can never be mutated out from under a
/// concurrent reader (spec.md §5 "Locking discipline").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider_type", rename_all = "snake_case")]
pub enum Provider {
    Http(HttpProvider),
    Sse(SseProvider),
    HttpStream(HttpStreamProvider),
    Cli(CliProvider),
    WebSocket(WebSocketProvider),
    Grpc(GrpcProvider),
    GraphQl(GraphQlProvider),
    Tcp(TcpProvider),
    Udp(UdpProvider),
    WebRtc(WebRtcProvider),
    Mcp(McpProvider),
    Text(TextProvider),
}

impl Provider {
    /// The provider's configured name, before sanitization.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Http(p) => &p.name,
            Self::Sse(p) => &p.name,
            Self::HttpStream(p) => &p.name,
            Self::Cli(p) => &p.name,
            Self::WebSocket(p) => &p.name,
            Self::Grpc(p) => &p.name,
            Self::GraphQl(p) => &p.name,
            Self::Tcp(p) => &p.name,
            Self::Udp(p) => &p.name,
            Self::WebRtc(p) => &p.name,
            Self::Mcp(p) => &p.name,
            Self::Text(p) => &p.name,
        }
    }

    /// Set the provider's name in place (used after sanitization).
    pub fn set_name(&mut self, name: String) {
        match self {
            Self::Http(p) => p.name = name,
            Self::Sse(p) => p.name = name,
            Self::HttpStream(p) => p.name = name,
            Self::Cli(p) => p.name = name,
            Self::WebSocket(p) => p.name = name,
            Self::Grpc(p) => p.name = name,
            Self::GraphQl(p) => p.name = name,
            Self::Tcp(p) => p.name = name,
            Self::Udp(p) => p.name = name,
            Self::WebRtc(p) => p.name = name,
            Self::Mcp(p) => p.name = name,
            Self::Text(p) => p.name = name,
        }
    }

    /// The discriminator used to pick a transport from the registry.
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Http(_) => ProviderKind::Http,
            Self::Sse(_) => ProviderKind::Sse,
            Self::HttpStream(_) => ProviderKind::HttpStream,
            Self::Cli(_) => ProviderKind::Cli,
            Self::WebSocket(_) => ProviderKind::WebSocket,
            Self::Grpc(_) => ProviderKind::Grpc,
            Self::GraphQl(_) => ProviderKind::GraphQl,
            Self::Tcp(_) => ProviderKind::Tcp,
            Self::Udp(_) => ProviderKind::Udp,
            Self::WebRtc(_) => ProviderKind::WebRtc,
            Self::Mcp(_) => ProviderKind::Mcp,
            Self::Text(_) => ProviderKind::Text,
        }
    }

    /// Walk the provider's string leaves and rewrite them via `subst`,
    /// stopping at the first unresolved reference.
    ///
    /// Used by the variable-substitution pass; never touches key names, only
    /// string values (spec.md §3 invariant).
    pub fn substitute_strings<E>(
        &mut self,
        subst: impl Fn(&str) -> std::result::Result<String, E>,
    ) -> std::result::Result<(), E> {
        fn walk_map<E>(
            map: &mut HashMap<String, String>,
            subst: &impl Fn(&str) -> std::result::Result<String, E>,
        ) -> std::result::Result<(), E> {
            for v in map.values_mut() {
                *v = subst(v)?;
            }
            Ok(())
        }
        match self {
            Provider::Http(p) => {
                p.url = subst(&p.url)?;
                p.content_type = subst(&p.content_type)?;
                walk_map(&mut p.headers, &subst)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::Sse(p) => {
                p.url = subst(&p.url)?;
                walk_map(&mut p.headers, &subst)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::HttpStream(p) => {
                p.url = subst(&p.url)?;
                walk_map(&mut p.headers, &subst)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::WebSocket(p) => {
                p.url = subst(&p.url)?;
                walk_map(&mut p.headers, &subst)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::Grpc(p) => {
                p.host = subst(&p.host)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::GraphQl(p) => {
                p.url = subst(&p.url)?;
                walk_map(&mut p.headers, &subst)?;
                substitute_auth(&mut p.auth, &subst)?;
            }
            Provider::Tcp(p) | Provider::Udp(p) => {
                p.host = subst(&p.host)?;
            }
            Provider::WebRtc(p) => {
                p.signaling_url = subst(&p.signaling_url)?;
                p.peer_id = subst(&p.peer_id)?;
            }
            Provider::Mcp(p) => {
                if let Some(url) = &mut p.url {
                    *url = subst(url)?;
                }
                for arg in &mut p.command {
                    *arg = subst(arg)?;
                }
                walk_map(&mut p.env, &subst)?;
                if let Some(wd) = &mut p.working_dir {
                    *wd = subst(wd)?;
                }
                if let Some(stdin) = &mut p.stdin_data {
                    *stdin = subst(stdin)?;
                }
            }
            Provider::Text(p) => {
                p.file_path = subst(&p.file_path)?;
            }
            Provider::Cli(p) => {
                p.command_name = subst(&p.command_name)?;
                walk_map(&mut p.env, &subst)?;
                if let Some(wd) = &mut p.working_dir {
                    *wd = subst(wd)?;
                }
            }
        }
        Ok(())
    }
}

fn substitute_auth<E>(
    auth: &mut Option<Auth>,
    subst: &impl Fn(&str) -> std::result::Result<String, E>,
) -> std::result::Result<(), E> {
    let Some(auth) = auth else { return Ok(()) };
    match auth {
        Auth::ApiKey { key, var_name, .. } => {
            *key = subst(key)?;
            *var_name = subst(var_name)?;
        }
        Auth::Basic { username, password } => {
            *username = subst(username)?;
            *password = subst(password)?;
        }
        Auth::OAuth2 {
            token_url,
            client_id,
            client_secret,
            scope,
        } => {
            *token_url = subst(token_url)?;
            *client_id = subst(client_id)?;
            *client_secret = subst(client_secret)?;
            *scope = subst(scope)?;
        }
    }
    Ok(())
}

/// Accept `type` as an alias for `provider_type` when deserializing a raw
/// JSON value into a `Provider` (spec.md §6).
pub fn provider_from_value(mut value: Value) -> Result<Provider, serde_json::Error> {
    if let Some(obj) = value.as_object_mut() {
        if !obj.contains_key("provider_type") {
            if let Some(t) = obj.remove("type") {
                obj.insert("provider_type".to_string(), t);
            }
        }
    }
    serde_json::from_value(value)
}

/// Replace `.` with `_`; fall back to the lowercased kind when the name is
/// empty (spec.md §4.1 step 1).
#[must_use]
pub fn sanitize_provider_name(name: &str, kind: ProviderKind) -> String {
    if name.is_empty() {
        kind.as_key().to_string()
    } else {
        name.replace('.', "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_dots() {
        assert_eq!(sanitize_provider_name("my.http", ProviderKind::Http), "my_http");
    }

    #[test]
    fn sanitize_falls_back_to_kind_when_empty() {
        assert_eq!(sanitize_provider_name("", ProviderKind::Mcp), "mcp");
    }

    #[test]
    fn provider_type_key_is_accepted() {
        let value = serde_json::json!({
            "provider_type": "http",
            "name": "demo",
            "url": "http://localhost/tools",
        });
        let provider = provider_from_value(value).unwrap();
        assert!(matches!(provider, Provider::Http(_)));
        assert_eq!(provider.kind(), ProviderKind::Http);
    }

    #[test]
    fn legacy_type_alias_is_accepted() {
        let value = serde_json::json!({
            "type": "http",
            "name": "demo",
            "url": "http://localhost/tools",
        });
        let provider = provider_from_value(value).unwrap();
        assert!(matches!(provider, Provider::Http(_)));
        assert_eq!(provider.name(), "demo");
    }

    #[test]
    fn provider_type_wins_over_type_when_both_present() {
        // provider_type is authoritative; a stray `type` key is ignored once
        // provider_type is already set.
        let value = serde_json::json!({
            "provider_type": "tcp",
            "type": "udp",
            "name": "demo",
            "host": "localhost",
            "port": 1234,
        });
        let provider = provider_from_value(value).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Tcp);
    }

    #[test]
    fn grpc_defaults_to_localhost_9339() {
        let value = serde_json::json!({
            "provider_type": "grpc",
            "name": "demo",
            "service_name": "Svc",
            "method_name": "Do",
        });
        let provider = provider_from_value(value).unwrap();
        match provider {
            Provider::Grpc(p) => {
                assert_eq!(p.host, "127.0.0.1");
                assert_eq!(p.port, 9339);
            }
            _ => panic!("expected a grpc provider"),
        }
    }

    #[test]
    fn set_name_updates_every_variant() {
        let mut provider = Provider::Text(TextProvider {
            name: "old".to_string(),
            file_path: "manifest.json".to_string(),
        });
        provider.set_name("new".to_string());
        assert_eq!(provider.name(), "new");
    }

    #[test]
    fn substitute_strings_rewrites_url_and_headers() {
        let mut provider = Provider::Http(HttpProvider {
            name: "demo".to_string(),
            http_method: "GET".to_string(),
            url: "${BASE}/tools".to_string(),
            content_type: "application/json".to_string(),
            auth: None,
            headers: HashMap::from([("X-Key".to_string(), "${KEY}".to_string())]),
            body_field: None,
            header_fields: Vec::new(),
        });
        provider
            .substitute_strings::<std::convert::Infallible>(|s| {
                Ok(s.replace("${BASE}", "http://host").replace("${KEY}", "secret"))
            })
            .unwrap();
        match provider {
            Provider::Http(p) => {
                assert_eq!(p.url, "http://host/tools");
                assert_eq!(p.headers["X-Key"], "secret");
            }
            _ => unreachable!(),
        }
    }
}
