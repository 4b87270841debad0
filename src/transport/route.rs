//! Request routing
//!
//! The channel a client wants is part of the upgrade request path
//! (`/ws/alerts`). It has to be known before the handshake completes, so the
//! request line is peeked from the socket without consuming it; the
//! WebSocket handshake then reads the full request as usual.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout_at};

use crate::utils::error::BroadcastError;

pub const ROUTE_PREFIX: &str = "/ws/";

const MAX_REQUEST_LINE: usize = 2048;
const ROUTE_TIMEOUT: Duration = Duration::from_secs(5);
const PEEK_BACKOFF: Duration = Duration::from_millis(5);

/// Extracts the channel name from a `/ws/{channel}` path.
///
/// Channel names are limited to ASCII letters, digits, `_` and `-`. A single
/// trailing slash is accepted.
pub fn channel_from_path(path: &str) -> Result<String, BroadcastError> {
    let name = path
        .strip_prefix(ROUTE_PREFIX)
        .ok_or_else(|| BroadcastError::invalid_route(path))?;
    let name = name.strip_suffix('/').unwrap_or(name);

    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(BroadcastError::invalid_route(path));
    }

    Ok(name.to_string())
}

/// Parses `GET /ws/{channel}?query HTTP/1.1` into the channel name.
pub fn channel_from_request_line(line: &str) -> Result<String, BroadcastError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(_version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(BroadcastError::invalid_route(line));
    };

    if method != "GET" {
        return Err(BroadcastError::invalid_route(format!(
            "method {method} not allowed"
        )));
    }

    let path = target.split('?').next().unwrap_or(target);
    channel_from_path(path)
}

/// Reads the request line off `stream` without consuming it.
pub async fn peek_channel(stream: &TcpStream) -> Result<String, BroadcastError> {
    let mut buf = vec![0u8; MAX_REQUEST_LINE];
    let deadline = Instant::now() + ROUTE_TIMEOUT;

    loop {
        let n = timeout_at(deadline, stream.peek(&mut buf))
            .await
            .map_err(|_| BroadcastError::handshake("timed out waiting for request line"))??;

        if n == 0 {
            return Err(BroadcastError::handshake("connection closed before request"));
        }

        if let Some(end) = buf[..n].windows(2).position(|w| w == b"\r\n") {
            let line = std::str::from_utf8(&buf[..end])
                .map_err(|_| BroadcastError::invalid_route("request line is not utf-8"))?;
            return channel_from_request_line(line);
        }

        if n == buf.len() {
            return Err(BroadcastError::invalid_route("request line too long"));
        }

        // only part of the line has arrived
        sleep(PEEK_BACKOFF).await;
    }
}
