//! Broadcaster engine
//!
//! `ChannelBroadcaster` maps channel names to [`Channel`]s and implements the
//! connection lifecycle on top of them:
//! - `connect` awaits the transport handshake, then registers the connection
//! - `disconnect` removes a connection and tolerates repeats
//! - `broadcast` serializes once, sends to a snapshot of the channel
//!   concurrently, then evicts every connection whose send failed
//!
//! Locking: the registry lock is taken only to look up, insert or drain
//! channels; per-channel mutations go through the channel's own lock. Neither
//! is held across an `.await`, so a slow handshake or a slow client never
//! blocks other channels. Lock order is registry, then channel.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::Utf8Bytes;

use crate::broadcaster::DEFAULT_CHANNELS;
use crate::broadcaster::channel::Channel;
use crate::broadcaster::event::TelemetryEvent;
use crate::config::BroadcasterSettings;
use crate::connection::{Connection, ConnectionId, SendOutcome};
use crate::utils::error::BroadcastError;

#[derive(Debug)]
pub struct ChannelBroadcaster {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    max_connections: Option<usize>,
    send_buffer: usize,
    send_timeout: Duration,
    shut_down: AtomicBool,
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBroadcaster {
    pub const DEFAULT_SEND_BUFFER: usize = 64;
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

    /// Creates a broadcaster with the dashboard's default channels registered.
    pub fn new() -> Self {
        Self::with_channels(DEFAULT_CHANNELS)
    }

    /// Creates a broadcaster with exactly `names` registered up front.
    pub fn with_channels<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channels = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_string(), Arc::new(Channel::new(name)))
            })
            .collect();

        Self {
            channels: RwLock::new(channels),
            max_connections: None,
            send_buffer: Self::DEFAULT_SEND_BUFFER,
            send_timeout: Self::DEFAULT_SEND_TIMEOUT,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn from_settings(settings: &BroadcasterSettings) -> Self {
        Self::with_channels(&settings.channels)
            .with_max_connections(settings.max_connections)
            .with_send_buffer(settings.send_buffer)
            .with_send_timeout(Duration::from_millis(settings.send_timeout_ms))
    }

    /// Caps live connections across all channels. `0` removes the cap.
    pub fn with_max_connections(mut self, limit: usize) -> Self {
        self.max_connections = (limit > 0).then_some(limit);
        self
    }

    pub fn with_send_buffer(mut self, buffer: usize) -> Self {
        self.send_buffer = buffer.max(1);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Builds a connection handle using this broadcaster's buffer and timeout.
    /// The receiver is meant for the transport's writer task.
    pub fn open_connection(&self) -> (Connection, Receiver<WsMessage>) {
        Connection::channel(self.send_buffer, self.send_timeout)
    }

    /// Completes `handshake` and registers the resulting connection into
    /// `channel`, creating the channel if it does not exist yet.
    ///
    /// A failed handshake is returned as is and nothing is registered. No
    /// lock is held while the handshake is pending.
    pub async fn connect<F>(&self, channel: &str, handshake: F) -> Result<ConnectionId, BroadcastError>
    where
        F: Future<Output = Result<Connection, BroadcastError>>,
    {
        let connection = match handshake.await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(channel, error = %e, "handshake failed, connection not registered");
                return Err(e);
            }
        };
        let id = connection.id();

        // Connects serialize on the registry write lock so the shutdown and
        // capacity checks are atomic with the insert.
        let total = {
            let mut channels = self.write_channels();

            if self.shut_down.load(Ordering::SeqCst) {
                drop(channels);
                connection.close();
                return Err(BroadcastError::ShuttingDown);
            }

            if let Some(limit) = self.max_connections {
                let live: usize = channels.values().map(|c| c.len()).sum();
                if live >= limit {
                    drop(channels);
                    connection.close();
                    warn!(channel, limit, "connection limit reached, rejecting client");
                    return Err(BroadcastError::CapacityReached { limit });
                }
            }

            channels
                .entry(channel.to_string())
                .or_insert_with(|| {
                    debug!(channel, "creating channel on first connect");
                    Arc::new(Channel::new(channel))
                })
                .join(connection)
        };

        info!(channel, connection = %id, total, "client connected");
        Ok(id)
    }

    /// Removes a connection from `channel`. Unknown channels and connections
    /// that are already gone are ignored.
    pub fn disconnect(&self, id: &ConnectionId, channel: &str) {
        let Some(ch) = self.channel(channel) else {
            return;
        };

        if ch.leave(id).is_some() {
            info!(channel, connection = %id, total = ch.len(), "client disconnected");
        }
    }

    /// Sends `payload` to every member of `channel`.
    ///
    /// The payload is serialized once. Members that fail to accept it are
    /// evicted after the sweep; the caller is not told which ones. Unknown
    /// channels are a no-op.
    pub async fn broadcast<T>(&self, channel: &str, payload: &T)
    where
        T: Serialize + ?Sized,
    {
        let Some(ch) = self.channel(channel) else {
            debug!(channel, "broadcast to unknown channel dropped");
            return;
        };

        let members = ch.snapshot();
        if members.is_empty() {
            return;
        }

        let text = match serde_json::to_string(payload) {
            Ok(json) => Utf8Bytes::from(json),
            Err(e) => {
                error!(channel, error = %e, "failed to serialize broadcast payload");
                return;
            }
        };

        let outcomes = join_all(members.iter().map(|conn| {
            let text = text.clone();
            async move { (conn.id(), conn.send(text).await) }
        }))
        .await;

        let failed: Vec<ConnectionId> = outcomes
            .into_iter()
            .filter_map(|(id, outcome)| match outcome {
                SendOutcome::Delivered => None,
                outcome => {
                    warn!(channel, connection = %id, ?outcome, "send failed, evicting client");
                    Some(id)
                }
            })
            .collect();

        let recipients = members.len() - failed.len();
        if !failed.is_empty() {
            for conn in ch.evict(&failed) {
                conn.close();
            }
        }

        debug!(channel, recipients, evicted = failed.len(), "broadcast complete");
    }

    /// Publishes a typed event on the channel its variant belongs to.
    pub async fn publish(&self, event: &TelemetryEvent) {
        self.broadcast(event.channel(), event).await;
    }

    /// Sends `text` to a single member of `channel`. A failure is reported
    /// but does not evict; the transport's close handling does that.
    pub async fn send_personal_message(
        &self,
        channel: &str,
        id: &ConnectionId,
        text: &str,
    ) -> SendOutcome {
        let member = self.channel(channel).and_then(|ch| ch.get(id));

        let Some(conn) = member else {
            return SendOutcome::Closed;
        };

        let outcome = conn.send(Utf8Bytes::from(text.to_owned())).await;
        if !outcome.is_delivered() {
            error!(channel, connection = %id, ?outcome, "error sending personal message");
        }
        outcome
    }

    pub fn connection_count(&self, channel: &str) -> usize {
        self.channel(channel).map(|ch| ch.len()).unwrap_or(0)
    }

    /// Member counts for every registered channel, including empty ones.
    pub fn all_connection_counts(&self) -> BTreeMap<String, usize> {
        self.read_channels()
            .iter()
            .map(|(name, ch)| (name.clone(), ch.len()))
            .collect()
    }

    pub fn total_connections(&self) -> usize {
        self.read_channels().values().map(|ch| ch.len()).sum()
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_channels().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_connected(&self, id: &ConnectionId, channel: &str) -> bool {
        self.channel(channel).is_some_and(|ch| ch.contains(id))
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Closes every tracked connection and releases all channels. Further
    /// connects are rejected.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);

        let channels: Vec<Arc<Channel>> = self.write_channels().drain().map(|(_, ch)| ch).collect();

        let mut closed = 0usize;
        for ch in &channels {
            for conn in ch.drain() {
                conn.close();
                closed += 1;
            }
        }

        info!(channels = channels.len(), closed, "broadcaster shut down");
    }

    fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.read_channels().get(name).cloned()
    }

    fn read_channels(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Channel>>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_channels(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Channel>>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }
}
