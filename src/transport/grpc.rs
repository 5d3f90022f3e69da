//! gRPC transport (spec.md §4.2.7): a dedicated `UTCPService`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tonic::transport::Channel;
use tonic::Request;

use crate::error::{Error, Result};
use crate::model::{Auth, GrpcProvider, Manual, Provider, Tool};
use crate::stream::{ChannelStreamResult, StreamResult};

use super::Transport;

#[allow(clippy::doc_markdown)]
mod pb {
    tonic::include_proto!("utcp");
}

use pb::utcp_service_client::UtcpServiceClient;
use pb::{Empty, ToolCallRequest};

/// `grpc` transport.
pub struct GrpcTransport;

impl GrpcTransport {
    /// Stateless — each call dials a fresh channel.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_grpc<'p>(provider: &'p Provider) -> Result<&'p GrpcProvider> {
        match provider {
            Provider::Grpc(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a grpc provider".to_string())),
        }
    }

    async fn connect(p: &GrpcProvider) -> Result<UtcpServiceClient<Channel>> {
        let scheme = if p.use_tls { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}:{}", p.host, p.port);
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| Error::Transport(e.to_string()))?
            .connect()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(UtcpServiceClient::new(channel))
    }

    fn apply_metadata<T>(request: &mut Request<T>, auth: &Option<Auth>) -> Result<()> {
        let Some(auth) = auth else { return Ok(()) };
        let meta = request.metadata_mut();
        match auth {
            Auth::Basic { username, password } => {
                meta.insert("username", username.parse().map_err(|_| invalid_metadata())?);
                meta.insert("password", password.parse().map_err(|_| invalid_metadata())?);
            }
            Auth::ApiKey { key, .. } => {
                meta.insert("authorization", key.parse().map_err(|_| invalid_metadata())?);
            }
            Auth::OAuth2 { .. } => {
                return Err(Error::UnsupportedAuth(
                    "oauth2 is not supported over the grpc transport".to_string(),
                ))
            }
        }
        Ok(())
    }
}

fn invalid_metadata() -> Error {
    Error::Transport("auth value is not valid gRPC metadata".to_string())
}

impl Default for GrpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_grpc(provider)?;
        let mut client = Self::connect(p).await?;
        // GetManual bypasses auth (spec.md §6).
        let response = client
            .get_manual(Request::new(Empty {}))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let manual: Manual = serde_json::from_str(&response.into_inner().manual_json)?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_grpc(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_grpc(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let mut client = Self::connect(p).await?;
        let mut request = Request::new(ToolCallRequest {
            tool: local.to_string(),
            args_json: serde_json::to_string(&args)?,
        });
        Self::apply_metadata(&mut request, &p.auth)?;
        let response = client
            .call_tool(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(serde_json::from_str(&response.into_inner().result_json)?)
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let p = Self::as_grpc(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let mut client = Self::connect(p).await?;
        let mut request = Request::new(ToolCallRequest {
            tool: local.to_string(),
            args_json: serde_json::to_string(&args)?,
        });
        Self::apply_metadata(&mut request, &p.auth)?;
        let mut inbound = client
            .call_tool_stream(request)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .into_inner();

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(chunk)) => {
                        let decoded = serde_json::from_str(&chunk.result_json).map_err(Error::Json);
                        if tx.send(decoded).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Transport(e.to_string()))).await;
                        break;
                    }
                }
            }
        });
        Ok(Box::new(ChannelStreamResult::new(rx, None)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrong_provider_kind_rejected() {
        let transport = GrpcTransport::new();
        let wrong = Provider::Tcp(crate::model::TcpProvider {
            name: "p".to_string(),
            host: "localhost".to_string(),
            port: 1,
            timeout_ms: 100,
        });
        let err = transport.call("p.tool", HashMap::new(), &wrong).await.unwrap_err();
        assert!(matches!(err, Error::WrongProviderKind(_)));
    }

    #[test]
    fn oauth2_metadata_is_rejected() {
        let auth = Some(Auth::OAuth2 {
            token_url: "https://auth.example/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scope: String::new(),
        });
        let mut request = Request::new(ToolCallRequest {
            tool: "x".to_string(),
            args_json: "{}".to_string(),
        });
        let err = GrpcTransport::apply_metadata(&mut request, &auth).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAuth(_)));
    }

    #[test]
    fn basic_auth_sets_username_and_password_metadata() {
        let auth = Some(Auth::Basic {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        });
        let mut request = Request::new(ToolCallRequest {
            tool: "x".to_string(),
            args_json: "{}".to_string(),
        });
        GrpcTransport::apply_metadata(&mut request, &auth).unwrap();
        assert_eq!(request.metadata().get("username").unwrap(), "alice");
        assert_eq!(request.metadata().get("password").unwrap(), "hunter2");
    }
}
