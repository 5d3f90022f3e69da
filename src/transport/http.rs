//! HTTP transport (spec.md §4.2.1).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::auth::{apply_http_auth, OAuthTokenCache};
use crate::error::{Error, Result};
use crate::model::{HttpProvider, Manual, Provider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `http` transport: one request per call, JSON discovery document.
pub struct HttpTransport {
    client: Client,
    oauth: OAuthTokenCache,
}

impl HttpTransport {
    /// Build a transport with the default 30s request timeout.
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with static config builds");
        Self {
            client,
            oauth: OAuthTokenCache::new(),
        }
    }

    fn as_http<'p>(provider: &'p Provider) -> Result<&'p HttpProvider> {
        match provider {
            Provider::Http(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected an http provider".to_string())),
        }
    }

    async fn do_call(&self, name: &str, args: HashMap<String, Value>, p: &HttpProvider) -> Result<Value> {
        let local = local_part(name);
        let url = format!("{}/{local}", p.url.trim_end_matches('/'));

        let mut header_values = HashMap::new();
        let mut body_args = args;
        for field in &p.header_fields {
            if let Some(v) = body_args.remove(field) {
                let as_str = value_to_header_string(&v);
                header_values.insert(field.clone(), as_str);
            }
        }

        let body: Value = match &p.body_field {
            Some(field) => serde_json::json!({ field: body_args }),
            None => serde_json::to_value(body_args)?,
        };

        let method: reqwest::Method = p
            .http_method
            .parse()
            .map_err(|_| Error::Config(format!("invalid http method: {}", p.http_method)))?;

        let mut request = self
            .client
            .request(method, &url)
            .header("Content-Type", &p.content_type);
        for (k, v) in &header_values {
            request = request.header(k, v);
        }
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
        Ok(response.json().await?)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn local_part(name: &str) -> &str {
    name.split_once('.').map_or(name, |(_, local)| local)
}

fn value_to_header_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_http(provider)?;
        debug!(provider = %p.name, url = %p.url, "discovering HTTP tools");
        let response = self.client.get(&p.url).send().await?.error_for_status()?;
        let manual: Manual = response.json().await?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_http(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_http(provider)?;
        self.do_call(name, args, p).await
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let value = self.call(name, args, provider).await?;
        Ok(Box::new(SliceStreamResult::new(vec![value])))
    }
}
