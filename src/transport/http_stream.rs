//! Streamable (chunked / NDJSON) HTTP transport (spec.md §4.2.3).

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Deserializer, Value};

use crate::auth::{apply_http_auth, OAuthTokenCache};
use crate::error::{Error, Result};
use crate::model::{HttpStreamProvider, Manual, Provider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `http_stream` transport: decodes a sequence of whitespace-separated JSON
/// values out of a chunked response body (NDJSON / JSON-sequence).
pub struct HttpStreamTransport {
    client: Client,
    oauth: OAuthTokenCache,
}

impl HttpStreamTransport {
    /// Build a transport using a default reqwest client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            oauth: OAuthTokenCache::new(),
        }
    }

    fn as_stream_provider<'p>(provider: &'p Provider) -> Result<&'p HttpStreamProvider> {
        match provider {
            Provider::HttpStream(p) => Ok(p),
            _ => Err(Error::WrongProviderKind(
                "expected an http_stream provider".to_string(),
            )),
        }
    }

    async fn do_call(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        p: &HttpStreamProvider,
    ) -> Result<Vec<Value>> {
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let url = format!("{}/{local}", p.url.trim_end_matches('/'));

        let body = match &p.body_field {
            Some(field) => serde_json::json!({ field: args }),
            None => serde_json::to_value(&args)?,
        };

        let mut request = self.client.post(&url);
        for (k, v) in &p.headers {
            request = request.header(k, v);
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

        let mut buffer: Vec<u8> = Vec::new();
        let mut bytes_stream = response.bytes_stream();
        while let Some(chunk) = bytes_stream.next().await {
            let chunk = chunk.map_err(Error::Http)?;
            buffer.extend_from_slice(&chunk);
        }

        let mut items = Vec::new();
        let mut de = Deserializer::from_slice(&buffer).into_iter::<Value>();
        for value in &mut de {
            items.push(value.map_err(Error::Json)?);
        }
        Ok(items)
    }
}

impl Default for HttpStreamTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpStreamTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_stream_provider(provider)?;
        let response = self.client.get(&p.url).send().await?.error_for_status()?;
        let manual: Manual = response.json().await?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_stream_provider(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_stream_provider(provider)?;
        let mut items = self.do_call(name, args, p).await?;
        if items.len() == 1 {
            return Ok(items.pop().expect("length checked above"));
        }
        Ok(Value::Array(items))
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let p = Self::as_stream_provider(provider)?;
        let items = self.do_call(name, args, p).await?;
        Ok(Box::new(SliceStreamResult::new(items)))
    }
}
