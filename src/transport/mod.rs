//! The `transport` module owns the network side of the broadcaster.
//!
//! It accepts TCP connections, routes `GET /ws/{channel}` upgrades to a
//! channel, performs the WebSocket handshake and runs a writer task and a
//! reader loop per client. Closing the reader loop is what tells the
//! broadcaster a client has gone away.

pub mod message;
pub mod route;
pub mod websocket;

pub use websocket::{serve, start_websocket_server};
