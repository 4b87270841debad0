//! The `error` module defines the error type surfaced by the broadcaster
//! and the WebSocket transport.
//!
//! Only failures that the immediate caller must react to live here. A failed
//! send during a broadcast is not an error: it is reported as a
//! [`SendOutcome`](crate::connection::SendOutcome) and handled by eviction.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BroadcastError {
    /// The transport could not complete the upgrade handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The configured connection limit has been reached.
    #[error("connection limit of {limit} reached")]
    CapacityReached { limit: usize },

    /// The broadcaster has been shut down and accepts no new clients.
    #[error("broadcaster is shutting down")]
    ShuttingDown,

    /// The request did not target a `/ws/{channel}` route.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BroadcastError {
    pub fn handshake(msg: impl Into<String>) -> Self {
        Self::Handshake(msg.into())
    }

    pub fn invalid_route(msg: impl Into<String>) -> Self {
        Self::InvalidRoute(msg.into())
    }
}
