//! Pull-based stream result abstraction returned by `call_stream`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;

/// A single-consumer, pull-based result stream.
///
/// Observing `Ok(None)` (EOF) from `next()` is terminal: every subsequent
/// `next()` call must also return `Ok(None)`. `close()` is safe to call any
/// number of times, including after EOF (spec.md §8, testable property 6).
#[async_trait]
pub trait StreamResult: Send {
    /// Pull the next item, or `Ok(None)` at end of stream.
    async fn next(&mut self) -> Result<Option<Value>>;

    /// Release the underlying connection or subprocess pipe.
    async fn close(&mut self);
}

/// A `StreamResult` backed by a channel fed from a background task — the
/// shape used by every network transport (SSE, WebSocket, gRPC, MCP).
pub struct ChannelStreamResult {
    receiver: Mutex<mpsc::Receiver<Result<Value>>>,
    closer: Option<Box<dyn FnOnce() + Send>>,
    done: bool,
}

impl ChannelStreamResult {
    /// Wrap a receiver with an optional cleanup closure run on `close()`.
    #[must_use]
    pub fn new(
        receiver: mpsc::Receiver<Result<Value>>,
        closer: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            receiver: Mutex::new(receiver),
            closer,
            done: false,
        }
    }
}

#[async_trait]
impl StreamResult for ChannelStreamResult {
    async fn next(&mut self) -> Result<Option<Value>> {
        if self.done {
            return Ok(None);
        }
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(Ok(v)) => Ok(Some(v)),
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.done = true;
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

/// A `StreamResult` over an already-materialized `Vec<Value>` — used by
/// CLI/Text, and by `call_chain` when a step requests `stream: false` results
/// out of a streaming call.
pub struct SliceStreamResult {
    items: std::vec::IntoIter<Value>,
    done: bool,
}

impl SliceStreamResult {
    /// Build a finite stream over a fixed set of items.
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: items.into_iter(),
            done: false,
        }
    }
}

#[async_trait]
impl StreamResult for SliceStreamResult {
    async fn next(&mut self) -> Result<Option<Value>> {
        if self.done {
            return Ok(None);
        }
        match self.items.next() {
            Some(v) => Ok(Some(v)),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        self.done = true;
    }
}

/// Drain a stream result into a `Vec`, used where a caller asked for a
/// streaming call but wants a materialized collection (e.g. chain steps).
pub async fn collect(mut stream: Box<dyn StreamResult>) -> Result<Vec<Value>> {
    let mut out = Vec::new();
    while let Some(v) = stream.next().await? {
        out.push(v);
    }
    stream.close().await;
    Ok(out)
}
