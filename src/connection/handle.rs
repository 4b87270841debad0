use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender, error::SendTimeoutError};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::Utf8Bytes;
use uuid::Uuid;

/// Identity of a connection. Two handles are the same connection only if
/// their ids match; nothing else about a connection is comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of handing one frame to a connection.
///
/// Anything other than `Delivered` moves the connection from active to
/// closed: the broadcaster evicts it after the current sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The writer task has gone away.
    Closed,
    /// The outgoing buffer stayed full for the whole send timeout.
    TimedOut,
}

impl SendOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Handle to one client's outgoing frame queue.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    sender: Sender<WsMessage>,
    send_timeout: Duration,
}

impl Connection {
    pub fn new(sender: Sender<WsMessage>, send_timeout: Duration) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
            send_timeout,
        }
    }

    /// Creates a connection together with the receiver its writer task drains.
    pub fn channel(buffer: usize, send_timeout: Duration) -> (Self, Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx, send_timeout), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a text frame, waiting at most the send timeout for buffer space.
    ///
    /// `Utf8Bytes` is reference counted, so one serialized payload can be
    /// handed to every member of a channel without copying.
    pub async fn send(&self, text: Utf8Bytes) -> SendOutcome {
        match self
            .sender
            .send_timeout(WsMessage::Text(text), self.send_timeout)
            .await
        {
            Ok(()) => SendOutcome::Delivered,
            Err(SendTimeoutError::Closed(_)) => SendOutcome::Closed,
            Err(SendTimeoutError::Timeout(_)) => SendOutcome::TimedOut,
        }
    }

    /// Queues a close frame without waiting. A full or closed queue is ignored;
    /// dropping the last handle ends the writer task either way.
    pub fn close(&self) {
        let _ = self.sender.try_send(WsMessage::Close(None));
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
