//! WebSocket transport (spec.md §4.2.4).

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};
use crate::model::{Auth, Manual, Provider, Tool, WebSocketProvider};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `websocket` transport.
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// No persistent state — every call opens a fresh connection.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_ws<'p>(provider: &'p Provider) -> Result<&'p WebSocketProvider> {
        match provider {
            Provider::WebSocket(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a websocket provider".to_string())),
        }
    }

    fn build_request(&self, url: &str, p: &WebSocketProvider) -> Result<tokio_tungstenite::tungstenite::http::Request<()>> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::Transport(format!("invalid websocket url: {e}")))?;
        for (k, v) in &p.headers {
            if let (Ok(name), Ok(value)) = (
                k.parse::<tokio_tungstenite::tungstenite::http::HeaderName>(),
                v.parse(),
            ) {
                request.headers_mut().insert(name, value);
            }
        }
        match &p.auth {
            None => {}
            Some(Auth::Basic { username, password }) => {
                let encoded = BASE64_STANDARD.encode(format!("{username}:{password}").as_bytes());
                request.headers_mut().insert(
                    "Authorization",
                    format!("Basic {encoded}")
                        .parse()
                        .map_err(|_| Error::Transport("invalid basic auth header".to_string()))?,
                );
            }
            Some(_) => {
                return Err(Error::UnsupportedAuth(
                    "only basic auth is supported over websocket".to_string(),
                ))
            }
        }
        Ok(request)
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_ws(provider)?;
        let request = self.build_request(&p.url, p)?;
        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {e}")))?;

        socket
            .send(Message::Text("manual".into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let manual_text = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                None => return Err(Error::Transport("websocket closed before manual".to_string())),
            }
        };
        let manual: Manual = serde_json::from_str(&manual_text)?;
        let _ = socket.close(None).await;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_ws(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_ws(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let url = format!("{}/{local}", p.url.trim_end_matches('/'));
        let request = self.build_request(&url, p)?;

        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {e}")))?;
        socket
            .send(Message::Text(serde_json::to_string(&args)?.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let reply = loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => break text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                None => return Err(Error::Transport("websocket closed before a reply".to_string())),
            }
        };
        let _ = socket.close(None).await;
        Ok(serde_json::from_str(&reply)?)
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let p = Self::as_ws(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let url = format!("{}/{local}", p.url.trim_end_matches('/'));
        let request = self.build_request(&url, p)?;

        let (mut socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {e}")))?;
        socket
            .send(Message::Text(serde_json::to_string(&args)?.into()))
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut items = Vec::new();
        while let Some(msg) = socket.next().await {
            match msg {
                Ok(Message::Text(text)) => items.push(serde_json::from_str(&text)?),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(Error::Transport(e.to_string())),
            }
        }
        Ok(Box::new(SliceStreamResult::new(items)))
    }
}
