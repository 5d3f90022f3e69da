//! CLI transport (spec.md §4.2.9).

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::model::{CliProvider, Provider, Tool};
use crate::stream::StreamResult;

use super::Transport;

/// `cli` transport: launches a fresh process per call, no discovery beyond
/// an empty manual (the provider carries no manifest to parse).
pub struct CliTransport;

impl CliTransport {
    /// No persistent state.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_cli<'p>(provider: &'p Provider) -> Result<&'p CliProvider> {
        match provider {
            Provider::Cli(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a cli provider".to_string())),
        }
    }

    fn args_to_flags(args: &HashMap<String, Value>) -> Vec<String> {
        let mut flags = Vec::with_capacity(args.len() * 2);
        for (key, value) in args {
            flags.push(format!("--{key}"));
            flags.push(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        flags
    }
}

impl Default for CliTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for CliTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        Self::as_cli(provider)?;
        Ok(Vec::new())
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_cli(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_cli(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);

        let mut command = Command::new(&p.command_name);
        command.arg(local);
        command.args(Self::args_to_flags(&args));
        command.envs(&p.env);
        if let Some(dir) = &p.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| Error::Transport(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::Transport(format!(
                "command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)))
    }

    async fn call_stream(
        &self,
        _name: &str,
        _args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        Self::as_cli(provider)?;
        Err(Error::Transport("cli transport does not support streaming calls".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(command_name: &str) -> Provider {
        Provider::Cli(CliProvider {
            name: "p".to_string(),
            command_name: command_name.to_string(),
            env: HashMap::new(),
            working_dir: None,
        })
    }

    #[tokio::test]
    async fn call_returns_raw_stdout_when_not_json() {
        let transport = CliTransport::new();
        let p = provider("echo");
        let mut args = HashMap::new();
        args.insert("foo".to_string(), Value::String("bar".to_string()));

        let result = transport.call("p.hello", args, &p).await.unwrap();
        assert_eq!(result, Value::String("hello --foo bar".to_string()));
    }

    #[tokio::test]
    async fn call_decodes_json_stdout() {
        let transport = CliTransport::new();
        let p = provider("printf");
        // `local` with no `%` specifiers is printed by `printf` verbatim with
        // no trailing newline, so this exercises the JSON-decode branch.
        let result = transport
            .call(r#"p.{"ok":true}"#, HashMap::new(), &p)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn call_nonexistent_command_fails() {
        let transport = CliTransport::new();
        let p = provider("utcp-definitely-not-a-real-binary");
        let err = transport.call("p.hello", HashMap::new(), &p).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn register_and_deregister_accept_cli_provider() {
        let transport = CliTransport::new();
        let p = provider("echo");
        assert!(transport.register(&p).await.unwrap().is_empty());
        transport.deregister(&p).await.unwrap();
    }

    #[tokio::test]
    async fn streaming_calls_are_unsupported() {
        let transport = CliTransport::new();
        let p = provider("echo");
        let err = transport.call_stream("p.hello", HashMap::new(), &p).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
