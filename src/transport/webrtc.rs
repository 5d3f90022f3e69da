//! WebRTC transport (spec.md §4.2.12): explicitly out of scope for a
//! detailed wire specification — a signaling exchange and data-channel
//! negotiation is environment-specific. This is the minimal adapter that
//! satisfies the `Transport` contract so `ProviderKind::WebRtc` has
//! somewhere to dispatch, behind the `webrtc-transport` feature.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Provider, Tool, WebRtcProvider};
use crate::stream::StreamResult;

use super::Transport;

/// `webrtc` transport. Connection setup (signaling, ICE, data channel
/// open) is left to the embedding application; this adapter only validates
/// that it was handed a `webrtc` provider and reports the feature as
/// unimplemented, rather than silently pretending to succeed.
#[derive(Default)]
pub struct WebRtcTransport;

impl WebRtcTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn as_webrtc<'p>(provider: &'p Provider) -> Result<&'p WebRtcProvider> {
        match provider {
            Provider::WebRtc(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a webrtc provider".to_string())),
        }
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_webrtc(provider)?;
        Err(Error::Transport(format!(
            "webrtc transport requires an out-of-band signaling exchange with peer {} \
             via {} — not implemented by this adapter",
            p.peer_id, p.signaling_url
        )))
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_webrtc(provider)?;
        Ok(())
    }

    async fn call(&self, _name: &str, _args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        Self::as_webrtc(provider)?;
        Err(Error::Transport("webrtc transport has no open data channel".to_string()))
    }

    async fn call_stream(
        &self,
        _name: &str,
        _args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        Self::as_webrtc(provider)?;
        Err(Error::Transport("webrtc transport has no open data channel".to_string()))
    }
}
