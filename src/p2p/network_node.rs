//! The node owning all connections of this process.
//!
//! Outbound connections are created on demand by `send_message` and reused afterwards,
//! inbound ones are accepted by the `Server` once the node is started. Both kinds are kept
//! in separate sets. Connect and send tasks run with at most `max_workers` in parallel.

use super::close_connection_reason::CloseConnectionReason;
use super::connection::{CompletionHandler, Connection, ConnectionContext};
use super::connection_config::NetworkConfig;
use super::connection_set::ConnectionSet;
use super::listener::{ConnectionListener, ListenerSet, MessageListener, SetupListener};
use super::shutdown::ShutdownTracker;

use crate::capability::Capabilities;
use crate::message::NetworkEnvelope;
use crate::node_address::NodeAddress;
use crate::server::Server;
use crate::transport::Transport;
use crate::{Error, Result};

use crate::colored::Colorize;

use parking_lot::Mutex;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::{oneshot, Semaphore};

use tracing::{debug, info, trace, warn};

type SendFuture = Pin<Box<dyn Future<Output = Result<Connection>> + Send>>;

#[derive(Clone)]
pub struct NetworkNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    port: u16,
    context: ConnectionContext,
    config: NetworkConfig,
    transport: Arc<dyn Transport>,
    node_address: OnceLock<NodeAddress>,
    server: Mutex<Option<Server>>,
    outbound: ConnectionSet,
    inbound: ConnectionSet,
    // held while checking for and registering a new outbound connection
    register: Mutex<()>,
    workers: Arc<Semaphore>,
    shut_down_started: AtomicBool,
    message_listeners: ListenerSet<dyn MessageListener>,
    connection_listeners: ListenerSet<dyn ConnectionListener>,
    setup_listeners: ListenerSet<dyn SetupListener>,
}

impl NetworkNode {
    pub fn new(
        port: u16,
        transport: Arc<dyn Transport>,
        context: ConnectionContext,
        config: NetworkConfig,
    ) -> NetworkNode {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        NetworkNode {
            inner: Arc::new(NodeInner {
                port,
                context,
                config,
                transport,
                node_address: OnceLock::new(),
                server: Mutex::new(None),
                outbound: ConnectionSet::new(),
                inbound: ConnectionSet::new(),
                register: Mutex::new(()),
                workers,
                shut_down_started: AtomicBool::new(false),
                message_listeners: ListenerSet::new(),
                connection_listeners: ListenerSet::new(),
                setup_listeners: ListenerSet::new(),
            }),
        }
    }

    /// Starts the transport and the server accepting inbound connections. Returns the address
    /// peers reach this node at. A node that was shut down cannot be started again.
    pub async fn start(&self, setup_listener: Option<Arc<dyn SetupListener>>) -> Result<NodeAddress> {
        if self.is_shut_down() {
            return Err(Error::ShutDownInProgress);
        }
        if let Some(listener) = setup_listener {
            self.add_setup_listener(listener);
        }
        let relay = self.relay();
        let (address, listener) = match self.inner.transport.start(self.inner.port, relay.clone()).await {
            Ok(started) => started,
            Err(err) => {
                warn!("Starting the transport failed: {}", err);
                relay.on_setup_failed(&err);
                return Err(err);
            }
        };
        if self.is_shut_down() {
            debug!("shut down while the transport was starting, closing the listening socket");
            return Err(Error::ShutDownInProgress);
        }
        if self.inner.node_address.set(address.clone()).is_err() {
            warn!("node was already started");
        }

        let server = Server::start(listener, relay.clone(), relay.clone(), self.inner.context.clone());
        if let Some(previous) = self.inner.server.lock().replace(server) {
            previous.shut_down();
        }
        info!("{} {}", "Network node started:".green(), address);
        relay.on_hidden_service_published();
        Ok(address)
    }

    /// The published address of this node, known once started.
    pub fn node_address(&self) -> Option<NodeAddress> {
        self.inner.node_address.get().cloned()
    }

    /// Sends `envelope` to `peer`, reusing an open connection or creating a new one.
    /// Resolves with the connection once the envelope was written.
    pub fn send_message(&self, peer: &NodeAddress, envelope: NetworkEnvelope) -> SendFuture {
        if let Some(connection) = self.find_connection(peer) {
            trace!("We have already a connection to {}", peer);
            return self.send_to_connection(&connection, envelope);
        }
        let node = self.clone();
        let peer = peer.clone();
        self.run_on_worker(async move {
            let connection = node.connect(&peer).await?;
            node.write(connection, envelope).await
        })
    }

    /// Sends `envelope` on `connection`, resolving with it once written.
    pub fn send_to_connection(&self, connection: &Connection, envelope: NetworkEnvelope) -> SendFuture {
        let node = self.clone();
        let connection = connection.clone();
        self.run_on_worker(async move { node.write(connection, envelope).await })
    }

    fn run_on_worker<F>(&self, task: F) -> SendFuture
    where
        F: Future<Output = Result<Connection>> + Send + 'static,
    {
        let workers = self.inner.workers.clone();
        let handle = self.inner.context.user_thread.spawn(async move {
            let _permit = workers.acquire_owned().await.map_err(|_| Error::ShutDownInProgress)?;
            task.await
        });
        Box::pin(async move { handle.await.map_err(|_| Error::Canceled)? })
    }

    async fn write(&self, connection: Connection, envelope: NetworkEnvelope) -> Result<Connection> {
        match connection.send(envelope).await {
            Ok(Ok(())) => Ok(connection),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::Canceled),
        }
    }

    async fn connect(&self, peer: &NodeAddress) -> Result<Connection> {
        if self.node_address().as_ref() == Some(peer) {
            warn!("We are sending a message to ourselves");
            return Err(Error::SelfConnection);
        }
        if self.is_shut_down() {
            return Err(Error::ShutDownInProgress);
        }
        let timeout = self.inner.config.create_socket_timeout;
        debug!("{} {}", "Create new outbound connection to".cyan(), peer);
        let socket = match tokio::time::timeout(timeout, self.inner.transport.connect(peer, timeout)).await {
            Ok(socket) => socket?,
            Err(_) => return Err(Error::Timeout(format!("creating a socket to {}", peer))),
        };

        let _register = self.inner.register.lock();
        // shut_down takes its snapshot under the same lock
        if self.is_shut_down() {
            debug!("Shut down while connecting to {}, closing the new socket", peer);
            return Err(Error::ShutDownInProgress);
        }
        if let Some(existing) = self.find_connection(peer) {
            // another task connected while we did, keep the registered connection
            debug!("We found a connection to {} created in the meantime, closing the new socket", peer);
            drop(socket);
            return Ok(existing);
        }
        let relay = self.relay();
        let message_listener: Arc<dyn MessageListener> = relay.clone();
        let connection =
            Connection::outbound(socket, peer.clone(), Some(message_listener), relay, &self.inner.context);
        if connection.is_shutting_down() {
            // banned peer, only the close message goes out
            return Err(Error::ConnectionStopped);
        }
        self.inner.outbound.insert(connection.clone());
        Ok(connection)
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shut_down_started.load(Ordering::SeqCst)
    }

    /// The open connection to `peer`, outbound connections first.
    pub fn find_connection(&self, peer: &NodeAddress) -> Option<Connection> {
        self.inner.outbound.find_by_address(peer).or_else(|| self.inner.inbound.find_by_address(peer))
    }

    pub fn all_connections(&self) -> Vec<Connection> {
        let mut connections = self.inner.outbound.snapshot();
        connections.extend(self.inner.inbound.snapshot());
        connections
    }

    pub fn outbound_connections(&self) -> Vec<Connection> {
        self.inner.outbound.snapshot()
    }

    pub fn inbound_connections(&self) -> Vec<Connection> {
        self.inner.inbound.snapshot()
    }

    /// Open connections whose peer address is known.
    pub fn confirmed_connections(&self) -> Vec<Connection> {
        self.all_connections()
            .into_iter()
            .filter(|c| c.has_peers_node_address() && !c.is_stopped())
            .collect()
    }

    pub fn confirmed_node_addresses(&self) -> HashSet<NodeAddress> {
        self.confirmed_connections().iter().filter_map(|c| c.peers_node_address()).collect()
    }

    /// The capabilities a peer advertised on any of our connections to it.
    pub fn find_peers_capabilities(&self, peer: &NodeAddress) -> Option<Capabilities> {
        self.confirmed_connections()
            .into_iter()
            .filter(|c| c.peers_node_address().as_ref() == Some(peer))
            .find(|c| c.has_capabilities())
            .map(|c| c.capabilities())
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner.message_listeners.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) {
        self.inner.message_listeners.remove(listener);
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.inner.connection_listeners.add(listener);
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) {
        self.inner.connection_listeners.remove(listener);
    }

    pub fn add_setup_listener(&self, listener: Arc<dyn SetupListener>) {
        self.inner.setup_listeners.add(listener);
    }

    pub fn remove_setup_listener(&self, listener: &Arc<dyn SetupListener>) {
        self.inner.setup_listeners.remove(listener);
    }

    /// Stops the server and closes every connection with `AppShutDown`. `handler` runs on the
    /// user thread once all connections are closed or the shutdown timeout elapsed, whichever
    /// comes first. On repeated calls the handler runs right away.
    pub fn shut_down(&self, handler: Option<CompletionHandler>) {
        let user_thread = &self.inner.context.user_thread;
        if self.inner.shut_down_started.swap(true, Ordering::SeqCst) {
            debug!("Network node shut down already started");
            if let Some(handler) = handler {
                user_thread.execute(handler);
            }
            return;
        }
        self.inner.workers.close();
        if let Some(server) = self.inner.server.lock().take() {
            server.shut_down();
        }

        let connections = {
            let _register = self.inner.register.lock();
            self.all_connections()
        };
        info!("{} closing {} connection(s)", "Shut down network node:".yellow(), connections.len());
        let handler = handler.unwrap_or_else(|| Box::new(|| ()));
        let tracker = ShutdownTracker::new(connections.len(), handler);
        tracker.start(user_thread, self.inner.config.shutdown_timeout);
        for connection in connections {
            let tracker = tracker.clone();
            connection.shut_down_with_handler(
                CloseConnectionReason::AppShutDown,
                Some(Box::new(move || tracker.complete_one())),
            );
        }
        self.inner.setup_listeners.clear();
    }

    /// Like `shut_down`, resolving when the completion handler would run.
    pub async fn shut_down_gracefully(&self) {
        let (done, completed) = oneshot::channel();
        self.shut_down(Some(Box::new(move || {
            let _ = done.send(());
        })));
        let _ = completed.await;
    }

    fn relay(&self) -> Arc<NodeRelay> {
        Arc::new(NodeRelay { node: Arc::downgrade(&self.inner) })
    }
}

// Installed as the listener of every connection. Holds the node weakly, the node owns the
// connections.
struct NodeRelay {
    node: Weak<NodeInner>,
}

impl MessageListener for NodeRelay {
    fn on_message(&self, envelope: &NetworkEnvelope, connection: &Connection) {
        if let Some(node) = self.node.upgrade() {
            for listener in node.message_listeners.snapshot() {
                listener.on_message(envelope, connection);
            }
        }
    }

    fn on_message_sent(&self, envelope: &NetworkEnvelope, connection: &Connection) {
        if let Some(node) = self.node.upgrade() {
            for listener in node.message_listeners.snapshot() {
                listener.on_message_sent(envelope, connection);
            }
        }
    }
}

impl ConnectionListener for NodeRelay {
    fn on_connection(&self, connection: &Connection) {
        if let Some(node) = self.node.upgrade() {
            if connection.is_inbound() && !connection.is_shutting_down() {
                node.inbound.insert(connection.clone());
            }
            for listener in node.connection_listeners.snapshot() {
                listener.on_connection(connection);
            }
        }
    }

    fn on_disconnect(&self, reason: CloseConnectionReason, connection: &Connection) {
        if let Some(node) = self.node.upgrade() {
            node.outbound.remove(connection);
            node.inbound.remove(connection);
            for listener in node.connection_listeners.snapshot() {
                listener.on_disconnect(reason, connection);
            }
        }
    }

    fn on_error(&self, error: &Error) {
        if let Some(node) = self.node.upgrade() {
            for listener in node.connection_listeners.snapshot() {
                listener.on_error(error);
            }
        }
    }
}

impl SetupListener for NodeRelay {
    fn on_tor_node_ready(&self) {
        self.notify_setup(|listener| listener.on_tor_node_ready());
    }

    fn on_hidden_service_published(&self) {
        self.notify_setup(|listener| listener.on_hidden_service_published());
    }

    fn on_setup_failed(&self, error: &Error) {
        let message = error.to_string();
        self.notify_setup(move |listener| listener.on_setup_failed(&Error::Setup(message.clone())));
    }

    fn on_request_custom_bridges(&self) {
        self.notify_setup(|listener| listener.on_request_custom_bridges());
    }
}

impl NodeRelay {
    // Setup events come from the transport task, listeners are called on the user thread.
    fn notify_setup<F>(&self, notify: F)
    where
        F: Fn(&dyn SetupListener) + Send + 'static,
    {
        if let Some(node) = self.node.upgrade() {
            let listeners = node.setup_listeners.snapshot();
            node.context.user_thread.execute(move || {
                for listener in listeners {
                    notify(listener.as_ref());
                }
            });
        }
    }
}
