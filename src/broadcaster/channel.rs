//! Channel membership
//!
//! A `Channel` holds the live connections subscribed to one topic name.
//! Membership sits behind the channel's own mutex, so channels never
//! contend with each other. The lock is only held for map updates and
//! snapshots, never across a send.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::connection::{Connection, ConnectionId};

#[derive(Debug)]
pub struct Channel {
    name: String,
    members: Mutex<HashMap<ConnectionId, Connection>>,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a connection. Returns the member count afterwards.
    pub fn join(&self, connection: Connection) -> usize {
        let mut members = self.members();
        members.insert(connection.id(), connection);
        members.len()
    }

    /// Removes a connection if present. Returns the removed handle.
    pub fn leave(&self, id: &ConnectionId) -> Option<Connection> {
        self.members().remove(id)
    }

    /// Removes every listed connection in one critical section and returns
    /// the handles that were still members.
    pub fn evict(&self, ids: &[ConnectionId]) -> Vec<Connection> {
        let mut members = self.members();
        ids.iter().filter_map(|id| members.remove(id)).collect()
    }

    /// Handle for one member, if it is still here.
    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.members().get(id).cloned()
    }

    /// Membership as of now. Later joins and leaves do not affect it.
    pub fn snapshot(&self) -> Vec<Connection> {
        self.members().values().cloned().collect()
    }

    /// Empties the channel and hands back everything it held.
    pub fn drain(&self) -> Vec<Connection> {
        self.members().drain().map(|(_, conn)| conn).collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so a poisoned lock is still safe to use.
    fn members(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.members.lock().unwrap_or_else(|e| e.into_inner())
    }
}
