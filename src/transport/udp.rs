//! UDP transport (spec.md §4.2.6).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::{Manual, Provider, Tool, UdpProvider};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

const MAX_DATAGRAM: usize = 64 * 1024;

/// `udp` transport: one request datagram, one reply datagram.
pub struct UdpTransport;

impl UdpTransport {
    /// Stateless — each call binds a fresh ephemeral socket.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_udp<'p>(provider: &'p Provider) -> Result<&'p UdpProvider> {
        match provider {
            Provider::Udp(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a udp provider".to_string())),
        }
    }

    async fn roundtrip(&self, p: &UdpProvider, payload: &[u8]) -> Result<Value> {
        let deadline = Duration::from_millis(p.timeout_ms);
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        timeout(deadline, socket.send_to(payload, (p.host.as_str(), p.port)))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let n = timeout(deadline, socket.recv(&mut buf))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(serde_json::from_slice(&buf[..n])?)
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_udp(provider)?;
        let manual_value = self.roundtrip(p, b"DISCOVER").await?;
        let manual: Manual = serde_json::from_value(manual_value)?;
        Ok(manual.tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_udp(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_udp(provider)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let payload = serde_json::to_vec(&serde_json::json!({ "tool": local, "args": args }))?;
        self.roundtrip(p, &payload).await
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
    use super::*;

    async fn echo_server() -> (UdpProvider, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let Ok((n, peer)) = socket.recv_from(&mut buf).await else { return };
                let reply = if &buf[..n] == b"DISCOVER" {
                    serde_json::json!({"version": "1.0", "tools": []})
                } else {
                    let request: Value = serde_json::from_slice(&buf[..n]).unwrap();
                    serde_json::json!({"echo": request.get("args")})
                };
                let bytes = serde_json::to_vec(&reply).unwrap();
                let _ = socket.send_to(&bytes, peer).await;
            }
        });
        (
            UdpProvider {
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
        let transport = UdpTransport::new();
        let tools = transport.register(&Provider::Udp(provider)).await.unwrap();
        assert!(tools.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn call_round_trips_json() {
        let (provider, handle) = echo_server().await;
        let transport = UdpTransport::new();
        let mut args = HashMap::new();
        args.insert("x".to_string(), Value::from(7));
        let result = transport.call("p.add", args, &Provider::Udp(provider)).await.unwrap();
        assert_eq!(result["echo"]["x"], Value::from(7));
        handle.abort();
    }

    #[tokio::test]
    async fn no_reply_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        drop(socket); // nothing listens, reply never arrives

        let transport = UdpTransport::new();
        let provider = Provider::Udp(UdpProvider {
            name: "p".to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            timeout_ms: 200,
        });
        let err = transport.call("p.add", HashMap::new(), &provider).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded | Error::Transport(_)));
    }
}
