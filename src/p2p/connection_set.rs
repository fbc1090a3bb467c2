use super::connection::Connection;

use crate::node_address::NodeAddress;

use parking_lot::RwLock;

use std::collections::HashMap;

use tracing::debug;

/// Connections keyed by `uid`. Safe to iterate while other tasks add and remove entries,
/// iteration works on a copy.
#[derive(Default)]
pub struct ConnectionSet {
    connections: RwLock<HashMap<u64, Connection>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        ConnectionSet::default()
    }

    /// Returns `false` if the connection was already present.
    pub fn insert(&self, connection: Connection) -> bool {
        self.connections.write().insert(connection.uid(), connection).is_none()
    }

    pub fn remove(&self, connection: &Connection) -> bool {
        self.connections.write().remove(&connection.uid()).is_some()
    }

    pub fn contains(&self, connection: &Connection) -> bool {
        self.connections.read().contains_key(&connection.uid())
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Connection> {
        self.connections.read().values().cloned().collect()
    }

    /// The live connection to `address`. Stopped connections met on the way are removed.
    pub fn find_by_address(&self, address: &NodeAddress) -> Option<Connection> {
        let matching: Vec<Connection> = self
            .connections
            .read()
            .values()
            .filter(|c| c.peers_node_address().as_ref() == Some(address))
            .cloned()
            .collect();
        let mut found = None;
        for connection in matching {
            if connection.is_stopped() {
                debug!("removing stale connection {}", connection);
                self.remove(&connection);
            } else if found.is_none() {
                found = Some(connection);
            }
        }
        found
    }
}
