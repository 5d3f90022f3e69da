//! Text transport (spec.md §4.2.10): in-process handlers keyed by local name.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Handler, Manual, Provider, TextProvider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `text` transport: reads a JSON manifest file on register, then dispatches
/// `call`s to handlers registered out-of-band by the embedding application
/// via [`TextTransport::register_handler`].
#[derive(Default)]
pub struct TextTransport {
    handlers: DashMap<String, Handler>,
}

impl TextTransport {
    /// An empty transport with no handlers registered yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an in-process callable to `provider_name.local_name`.
    pub fn register_handler(&self, provider_name: &str, local_name: &str, handler: Handler) {
        self.handlers
            .insert(format!("{provider_name}.{local_name}"), handler);
    }

    fn as_text<'p>(provider: &'p Provider) -> Result<&'p TextProvider> {
        match provider {
            Provider::Text(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a text provider".to_string())),
        }
    }
}

#[async_trait]
impl Transport for TextTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_text(provider)?;
        let content = tokio::fs::read_to_string(&p.file_path)
            .await
            .map_err(|e| Error::Config(format!("reading text manifest {}: {e}", p.file_path)))?;
        let manual: Manual = serde_json::from_str(&content)?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        let p = Self::as_text(provider)?;
        let prefix = format!("{}.", p.name);
        self.handlers.retain(|name, _| !name.starts_with(&prefix));
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_text(provider)?;
        let key = format!("{}.{}", p.name, name);
        let handler = self
            .handlers
            .get(&key)
            .ok_or_else(|| Error::ToolNotRegistered(key.clone()))?
            .clone();
        handler(serde_json::to_value(args)?)
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn provider(name: &str, file_path: &str) -> Provider {
        Provider::Text(TextProvider {
            name: name.to_string(),
            file_path: file_path.to_string(),
        })
    }

    #[tokio::test]
    async fn register_reads_manifest_tools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manual.json");
        tokio::fs::write(
            &path,
            r#"{"version":"1.0","tools":[{"name":"echo","description":"","tags":[],"inputs":{"type":"object","properties":{},"required":[]},"outputs":{"type":"object","properties":{},"required":[]}}]}"#,
        )
        .await
        .unwrap();

        let transport = TextTransport::new();
        let p = provider("local", path.to_str().unwrap());
        let tools = transport.register(&p).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
    }

    #[tokio::test]
    async fn call_invokes_registered_handler() {
        let transport = TextTransport::new();
        let p = provider("local", "unused.json");
        let handler: Handler = Arc::new(|args| Ok(args));
        transport.register_handler("local", "echo", handler);

        let mut args = HashMap::new();
        args.insert("msg".to_string(), Value::String("hi".to_string()));
        let result = transport.call("echo", args, &p).await.unwrap();
        assert_eq!(result["msg"], Value::String("hi".to_string()));
    }

    #[tokio::test]
    async fn call_unknown_tool_fails() {
        let transport = TextTransport::new();
        let p = provider("local", "unused.json");
        let err = transport.call("missing", HashMap::new(), &p).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotRegistered(_)));
    }

    #[tokio::test]
    async fn deregister_removes_only_that_providers_handlers() {
        let transport = TextTransport::new();
        transport.register_handler("a", "echo", Arc::new(|args| Ok(args)));
        transport.register_handler("b", "echo", Arc::new(|args| Ok(args)));

        transport.deregister(&provider("a", "unused.json")).await.unwrap();

        assert!(!transport.handlers.contains_key("a.echo"));
        assert!(transport.handlers.contains_key("b.echo"));
    }

    #[tokio::test]
    async fn wrong_provider_kind_rejected() {
        let transport = TextTransport::new();
        let wrong = Provider::Cli(crate::model::CliProvider {
            name: "x".to_string(),
            command_name: "echo".to_string(),
            env: HashMap::new(),
            working_dir: None,
        });
        let err = transport.call("x", HashMap::new(), &wrong).await.unwrap_err();
        assert!(matches!(err, Error::WrongProviderKind(_)));
    }
}
