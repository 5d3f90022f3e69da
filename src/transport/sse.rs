//! SSE transport (spec.md §4.2.2).

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use crate::auth::{apply_http_auth, OAuthTokenCache};
use crate::error::{Error, Result};
use crate::model::{Manual, Provider, SseProvider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `sse` transport: POST then parse a `text/event-stream` response, falling
/// back to a single JSON decode for non-streaming responses.
pub struct SseTransport {
    client: Client,
    oauth: OAuthTokenCache,
    last_event_id: DashMap<String, String>,
}

impl SseTransport {
    /// Build a transport using a default reqwest client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            oauth: OAuthTokenCache::new(),
            last_event_id: DashMap::new(),
        }
    }

    fn as_sse<'p>(provider: &'p Provider) -> Result<&'p SseProvider> {
        match provider {
            Provider::Sse(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected an sse provider".to_string())),
        }
    }

    async fn do_call(&self, name: &str, args: HashMap<String, Value>, p: &SseProvider) -> Result<Vec<Value>> {
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let url = format!("{}/{local}", p.url.trim_end_matches('/'));

        let body = match &p.body_field {
            Some(field) => serde_json::json!({ field: args }),
            None => serde_json::to_value(&args)?,
        };

        let mut request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream");
        for (k, v) in &p.headers {
            request = request.header(k, v);
        }
        if let Some(last_id) = self.last_event_id.get(&url) {
            request = request.header("Last-Event-ID", last_id.value().clone());
        }
        if let Some(auth) = &p.auth {
            request = apply_http_auth(request, auth, &self.client, &self.oauth).await?;
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("HTTP {status}: {text}")));
        }

        let is_event_stream = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        if !is_event_stream {
            let value: Value = response.json().await?;
            return Ok(vec![value]);
        }

        let mut items = Vec::new();
        let mut stream = response.bytes_stream().eventsource();
        while let Some(event) = stream.next().await {
            let event = event.map_err(|e| Error::Transport(format!("SSE framing error: {e}")))?;
            if !event.id.is_empty() {
                self.last_event_id.insert(url.clone(), event.id.clone());
            }
            if event.data.is_empty() {
                continue;
            }
            let decoded: Value = serde_json::from_str(&event.data)?;
            items.push(decoded);
        }
        Ok(items)
    }
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_sse(provider)?;
        let response = self.client.get(&p.url).send().await?.error_for_status()?;
        let manual: Manual = response.json().await?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_sse(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_sse(provider)?;
        let mut items = self.do_call(name, args, p).await?;
        Ok(items.pop().unwrap_or(Value::Null))
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let p = Self::as_sse(provider)?;
        let items = self.do_call(name, args, p).await?;
        Ok(Box::new(SliceStreamResult::new(items)))
    }
}
