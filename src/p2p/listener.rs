//! Listener traits of the session layer. Every callback runs on the user thread.

use super::close_connection_reason::CloseConnectionReason;
use super::connection::Connection;

use crate::capability::Capabilities;
use crate::message::NetworkEnvelope;
use crate::Error;

use parking_lot::RwLock;

use std::sync::Arc;

pub trait MessageListener: Send + Sync {
    fn on_message(&self, envelope: &NetworkEnvelope, connection: &Connection);

    fn on_message_sent(&self, _envelope: &NetworkEnvelope, _connection: &Connection) {}
}

/// Lifecycle of connections.
pub trait ConnectionListener: Send + Sync {
    fn on_connection(&self, connection: &Connection);

    fn on_disconnect(&self, reason: CloseConnectionReason, connection: &Connection);

    fn on_error(&self, _error: &Error) {}
}

/// Readiness of the transport, relayed by the network node.
pub trait SetupListener: Send + Sync {
    fn on_tor_node_ready(&self) {}

    fn on_hidden_service_published(&self) {}

    fn on_setup_failed(&self, error: &Error);

    fn on_request_custom_bridges(&self) {}
}

pub trait SupportedCapabilitiesListener: Send + Sync {
    fn on_changed(&self, capabilities: &Capabilities);
}

/// A set of listeners that tolerates subscribing and unsubscribing while it is notified.
/// Listeners are identified by pointer, adding the same `Arc` twice keeps one entry.
pub struct ListenerSet<T: ?Sized> {
    listeners: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        ListenerSet { listeners: RwLock::new(vec![]) }
    }

    pub fn add(&self, listener: Arc<T>) {
        let mut listeners = self.listeners.write();
        if !listeners.iter().any(|l| same(l, &listener)) {
            listeners.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<T>) {
        self.listeners.write().retain(|l| !same(l, listener));
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// A copy of the current listeners, to iterate without holding the lock.
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.listeners.read().clone()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        ListenerSet::new()
    }
}
