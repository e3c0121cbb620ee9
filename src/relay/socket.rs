//! Single-writer socket discipline and heartbeating for relay WebSockets.
//!
//! The framing layer does not tolerate concurrent writers, so every socket
//! gets exactly one [`SharedWriter`]; whoever holds a clone may write, and
//! the internal lock serializes them.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::relay::proto::ControlMessage;

/// Time allowed for a single write to complete.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// A socket with no inbound traffic for this long is considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(10);
/// Heartbeat period; half of `PONG_WAIT` so every deadline window sees at
/// least one ping.
pub const PING_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write timed out")]
    Timeout,
    #[error("websocket write failed: {0}")]
    Ws(#[from] axum::Error),
}

/// Cloneable write half of a relay-side WebSocket.
#[derive(Clone)]
pub struct SharedWriter {
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
}

impl SharedWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    async fn send(&self, message: Message) -> Result<(), WriteError> {
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(WRITE_WAIT, sink.send(message)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WriteError::Timeout),
        }
    }

    pub async fn send_control(&self, message: &ControlMessage) -> Result<(), WriteError> {
        self.send(Message::Text(message.encode().into())).await
    }

    pub async fn send_binary(&self, data: Bytes) -> Result<(), WriteError> {
        self.send(Message::Binary(data)).await
    }

    /// Best-effort close; safe to call from either side of a paired channel
    /// and more than once.
    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = tokio::time::timeout(WRITE_WAIT, sink.send(Message::Close(None))).await;
    }
}

/// Emit an application-level ping every [`PING_PERIOD`]. A failed write is
/// fatal for that connection: close it and exit.
pub async fn heartbeat(writer: SharedWriter) {
    loop {
        tokio::time::sleep(PING_PERIOD).await;
        if let Err(e) = writer.send_control(&ControlMessage::Ping).await {
            tracing::debug!("heartbeat write failed: {e}");
            writer.close().await;
            break;
        }
    }
}
