use serde::{Deserialize, Serialize};

use crate::utils::error::BroadcastError;

/// Frames a dashboard client may send. Everything else is ignored.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Frames the transport itself sends, as opposed to channel payloads.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        channel: String,
        connection_id: String,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, BroadcastError> {
        Ok(serde_json::to_string(self)?)
    }
}
