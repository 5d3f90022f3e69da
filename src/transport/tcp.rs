//! TCP transport (spec.md §4.2.5).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::{Provider, TcpProvider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `tcp` transport: one line-delimited JSON request/response per call.
pub struct TcpTransport;

impl TcpTransport {
    /// Stateless — each call dials a fresh connection.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_tcp<'p>(provider: &'p Provider) -> Result<&'p TcpProvider> {
        match provider {
            Provider::Tcp(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a tcp provider".to_string())),
        }
    }

    async fn roundtrip(&self, p: &TcpProvider, request_line: &str) -> Result<Value> {
        let deadline = Duration::from_millis(p.timeout_ms);
        let mut stream = timeout(deadline, TcpStream::connect((p.host.as_str(), p.port)))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(|e| Error::Transport(e.to_string()))?;

        timeout(deadline, stream.write_all(request_line.as_bytes()))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        timeout(deadline, reader.read_line(&mut line))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(serde_json::from_str(line.trim())?)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_tcp(provider)?;
        let manual_value = self.roundtrip(p, "{\"action\":\"list\"}\n").await?;
        let manual: crate::model::Manual = serde_json::from_value(manual_value)?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_tcp(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_tcp(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let payload = serde_json::json!({ "tool": local, "args": args });
        let line = format!("{}\n", serde_json::to_string(&payload)?);
        self.roundtrip(p, &line).await
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
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    async fn echo_server() -> (TcpProvider, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    let request: Value = serde_json::from_slice(&buf[..n]).unwrap();
                    let reply = if request.get("action").is_some() {
                        serde_json::json!({"version": "1.0", "tools": []})
                    } else {
                        serde_json::json!({"echo": request.get("args")})
                    };
                    let mut line = serde_json::to_vec(&reply).unwrap();
                    line.push(b'\n');
                    let _ = socket.write_all(&line).await;
                });
            }
        });
        (
            TcpProvider {
                name: "p".to_string(),
                host: addr.ip().to_string(),
                port: addr.port(),
                timeout_ms: 2_000,
            },
            handle,
        )
    }

    #[tokio::test]
    async fn register_parses_manual() {
        let (provider, handle) = echo_server().await;
        let transport = TcpTransport::new();
        let tools = transport.register(&Provider::Tcp(provider)).await.unwrap();
        assert!(tools.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn call_round_trips_json() {
        let (provider, handle) = echo_server().await;
        let transport = TcpTransport::new();
        let mut args = HashMap::new();
        args.insert("x".to_string(), Value::from(1));
        let result = transport.call("p.add", args, &Provider::Tcp(provider)).await.unwrap();
        assert_eq!(result["echo"]["x"], Value::from(1));
        handle.abort();
    }

    #[tokio::test]
    async fn connect_refused_yields_transport_error() {
        let transport = TcpTransport::new();
        let provider = Provider::Tcp(TcpProvider {
            name: "p".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1, // reserved, nothing listens
            timeout_ms: 500,
        });
        let err = transport.call("p.add", HashMap::new(), &provider).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::DeadlineExceeded));
    }
}
