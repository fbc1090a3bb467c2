//! A session with one remote peer.
//!
//! A `Connection` is created as soon as a socket exists. It spawns one task reading frames
//! (see `InputHandler`) and one task writing them (see `Writer`), so concurrent senders never
//! interleave bytes on the wire. Every listener callback is executed on the `UserThread`.

use super::ban_list::BanFilter;
use super::close_connection_reason::CloseConnectionReason;
use super::connection_config::ConnectionConfig;
use super::connection_state::{ConnectionState, PeerType};
use super::input_handler::InputHandler;
use super::listener::{ConnectionListener, ListenerSet, MessageListener, SupportedCapabilitiesListener};
use super::rule_violation::RuleViolation;
use super::statistic::Statistic;
use super::writer::{Writer, WriterCommand};

use crate::capability::Capabilities;
use crate::channel::Channel;
use crate::message::{CloseConnectionMessage, NetworkEnvelope, Payload};
use crate::node_address::NodeAddress;
use crate::user_thread::UserThread;
use crate::{Error, Result};

use crate::colored::Colorize;

use parking_lot::Mutex;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use tracing::{debug, info, trace, warn, Level};
use tracing_futures::Instrument;

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

const WRITER_ABORT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Collaborators shared by every connection of a node.
#[derive(Clone)]
pub struct ConnectionContext {
    pub config: Arc<ConnectionConfig>,
    pub user_thread: UserThread,
    pub ban_filter: Option<Arc<dyn BanFilter>>,
}

impl ConnectionContext {
    pub fn new(config: ConnectionConfig, user_thread: UserThread) -> Self {
        ConnectionContext { config: Arc::new(config), user_thread, ban_filter: None }
    }

    pub fn with_ban_filter(mut self, ban_filter: Arc<dyn BanFilter>) -> Self {
        self.ban_filter = Some(ban_filter);
        self
    }

    pub(crate) fn is_banned(&self, address: &NodeAddress) -> bool {
        self.ban_filter.as_ref().map(|filter| filter.is_banned(address)).unwrap_or(false)
    }
}

pub type CompletionHandler = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct ShutdownState {
    started: bool,
    completed: bool,
    handlers: Vec<CompletionHandler>,
}

struct Inner {
    uid: u64,
    direction: Direction,
    remote_addr: Option<SocketAddr>,
    peers_node_address: OnceLock<NodeAddress>,
    stopped: AtomicBool,
    shutdown: Mutex<ShutdownState>,
    capabilities: OnceLock<Capabilities>,
    rule_violation: OnceLock<RuleViolation>,
    statistic: Statistic,
    connection_state: ConnectionState,
    message_listeners: ListenerSet<dyn MessageListener>,
    capabilities_listeners: ListenerSet<dyn SupportedCapabilitiesListener>,
    connection_listener: Arc<dyn ConnectionListener>,
    context: ConnectionContext,
    writer: mpsc::UnboundedSender<WriterCommand>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

/// A cheap handle to a session. Clones refer to the same session, equality is by `uid`.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wraps an accepted socket. The peer address is learned from the first message carrying it.
    pub fn inbound(
        socket: TcpStream,
        message_listener: Option<Arc<dyn MessageListener>>,
        connection_listener: Arc<dyn ConnectionListener>,
        context: &ConnectionContext,
    ) -> Connection {
        Connection::new(socket, Direction::Inbound, None, message_listener, connection_listener, context)
    }

    /// Wraps a socket connected to `peers_node_address`.
    pub fn outbound(
        socket: TcpStream,
        peers_node_address: NodeAddress,
        message_listener: Option<Arc<dyn MessageListener>>,
        connection_listener: Arc<dyn ConnectionListener>,
        context: &ConnectionContext,
    ) -> Connection {
        Connection::new(
            socket,
            Direction::Outbound,
            Some(peers_node_address),
            message_listener,
            connection_listener,
            context,
        )
    }

    fn new(
        socket: TcpStream,
        direction: Direction,
        peers_node_address: Option<NodeAddress>,
        message_listener: Option<Arc<dyn MessageListener>>,
        connection_listener: Arc<dyn ConnectionListener>,
        context: &ConnectionContext,
    ) -> Connection {
        let uid = NEXT_UID.fetch_add(1, Ordering::Relaxed);
        let remote_addr = socket.peer_addr().ok();
        let (sender, receiver) = Channel::wrap(socket, context.config.max_frame_length()).split();
        let (writer, commands) = mpsc::unbounded_channel();

        let connection = Connection {
            inner: Arc::new(Inner {
                uid,
                direction,
                remote_addr,
                peers_node_address: peers_node_address.map(OnceLock::from).unwrap_or_default(),
                stopped: AtomicBool::new(false),
                shutdown: Mutex::new(ShutdownState::default()),
                capabilities: OnceLock::new(),
                rule_violation: OnceLock::new(),
                statistic: Statistic::new(),
                connection_state: ConnectionState::new(context.user_thread.clone(), &context.config),
                message_listeners: ListenerSet::new(),
                capabilities_listeners: ListenerSet::new(),
                connection_listener,
                context: context.clone(),
                writer,
                writer_task: Mutex::new(None),
                reader_task: Mutex::new(None),
            }),
        };
        if let Some(listener) = message_listener {
            connection.add_message_listener(listener);
        }

        let span = tracing::span!(Level::DEBUG, "connection", uid);
        let writer_task = context
            .user_thread
            .spawn(Writer::new(sender, connection.clone()).run(commands).instrument(span.clone()));
        *connection.inner.writer_task.lock() = Some(writer_task);
        let reader_task = context
            .user_thread
            .spawn(InputHandler::new(receiver, connection.clone()).run().instrument(span));
        *connection.inner.reader_task.lock() = Some(reader_task);

        let notified = connection.clone();
        context.user_thread.execute(move || {
            notified.inner.connection_listener.on_connection(&notified);
        });

        if let Some(address) = connection.inner.peers_node_address.get() {
            if context.is_banned(address) {
                warn!("We detected a connection to a banned peer. We will close that connection.");
                connection.on_rule_violation(RuleViolation::PeerBanned);
            }
        }
        debug!("{} {}", "New connection:".cyan(), connection);
        connection
    }

    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn is_inbound(&self) -> bool {
        self.inner.direction == Direction::Inbound
    }

    /// The socket address of the remote end, which is the proxy for onion connections.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn peers_node_address(&self) -> Option<NodeAddress> {
        self.inner.peers_node_address.get().cloned()
    }

    pub fn has_peers_node_address(&self) -> bool {
        self.inner.peers_node_address.get().is_some()
    }

    /// Adopts the peer address, which can be set once only. Returns whether the peer is banned.
    pub(crate) fn set_peers_node_address(&self, address: NodeAddress) -> bool {
        let banned = self.inner.context.is_banned(&address);
        if self.inner.peers_node_address.set(address).is_ok() && self.is_inbound() {
            debug!("We got the peers node address set: {}", self);
        }
        banned
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Whether a shutdown was requested, the connection may still be sending its close message.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.lock().started
    }

    /// The capabilities advertised by the peer, empty until the first advertisement.
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities.get().cloned().unwrap_or_default()
    }

    pub fn has_capabilities(&self) -> bool {
        self.inner.capabilities.get().is_some()
    }

    /// Records the first advertised capability set. Later advertisements are ignored.
    pub(crate) fn set_capabilities(&self, capabilities: Capabilities) -> bool {
        self.inner.capabilities.set(capabilities).is_ok()
    }

    pub fn statistic(&self) -> &Statistic {
        &self.inner.statistic
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.inner.connection_state
    }

    pub fn peer_type(&self) -> PeerType {
        self.inner.connection_state.peer_type()
    }

    /// The violation that caused the shutdown, if any.
    pub fn rule_violation(&self) -> Option<RuleViolation> {
        self.inner.rule_violation.get().copied()
    }

    pub(crate) fn config(&self) -> &ConnectionConfig {
        &self.inner.context.config
    }

    pub(crate) fn user_thread(&self) -> &UserThread {
        &self.inner.context.user_thread
    }

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner.message_listeners.add(listener);
    }

    pub fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) {
        self.inner.message_listeners.remove(listener);
    }

    pub fn add_capabilities_listener(&self, listener: Arc<dyn SupportedCapabilitiesListener>) {
        self.inner.capabilities_listeners.add(listener);
    }

    pub fn remove_capabilities_listener(&self, listener: &Arc<dyn SupportedCapabilitiesListener>) {
        self.inner.capabilities_listeners.remove(listener);
    }

    /// Queues an envelope for the peer. Envelopes are dropped when the connection is stopped
    /// or the peer lacks a capability the payload requires.
    pub fn send_message(&self, envelope: NetworkEnvelope) {
        // failures are logged by the writer
        let _ = self.send(envelope);
    }

    /// Like `send_message`, the returned receiver resolves once the envelope was written.
    /// An envelope skipped for missing capabilities resolves successfully.
    pub(crate) fn send(&self, envelope: NetworkEnvelope) -> oneshot::Receiver<Result<()>> {
        let (ack, written) = oneshot::channel();
        if self.is_stopped() {
            debug!("called send_message but was already stopped");
            let _ = ack.send(Err(Error::ConnectionStopped));
            return written;
        }
        if let Some(required) = envelope.payload.required_capabilities() {
            if !self.capabilities().contains_all(&required) {
                debug!(
                    "We did not send {} because the peer does not support our required capabilities. peer={:?}, capabilities={}",
                    envelope.payload.name(),
                    self.peers_node_address(),
                    self.capabilities()
                );
                let _ = ack.send(Ok(()));
                return written;
            }
        }
        self.enqueue(envelope, ack);
        written
    }

    fn enqueue(&self, envelope: NetworkEnvelope, ack: oneshot::Sender<Result<()>>) {
        if let Err(mpsc::error::SendError(command)) =
            self.inner.writer.send(WriterCommand::Send { envelope, ack: Some(ack) })
        {
            if let WriterCommand::Send { ack: Some(ack), .. } = command {
                let _ = ack.send(Err(Error::ConnectionStopped));
            }
        }
    }

    /// Hands a received envelope to the message listeners. Bundles are unpacked.
    pub(crate) fn deliver(&self, envelope: NetworkEnvelope) {
        match envelope.payload {
            Payload::Bundle(bundle) => {
                for envelope in bundle.envelopes {
                    self.deliver_one(envelope);
                }
            }
            _ => self.deliver_one(envelope),
        }
    }

    fn deliver_one(&self, envelope: NetworkEnvelope) {
        let connection = self.clone();
        self.user_thread().execute(move || {
            for listener in connection.inner.message_listeners.snapshot() {
                listener.on_message(&envelope, &connection);
            }
        });
    }

    pub(crate) fn notify_message_sent(&self, envelope: NetworkEnvelope) {
        if self.inner.message_listeners.is_empty() {
            return;
        }
        let connection = self.clone();
        self.user_thread().execute(move || {
            for listener in connection.inner.message_listeners.snapshot() {
                listener.on_message_sent(&envelope, &connection);
            }
        });
    }

    pub(crate) fn notify_capabilities(&self, capabilities: &Capabilities) {
        for listener in self.inner.capabilities_listeners.snapshot() {
            let capabilities = capabilities.clone();
            self.user_thread().execute(move || listener.on_changed(&capabilities));
        }
    }

    /// Records the violation that exhausted its tolerance and shuts down accordingly.
    pub(crate) fn on_rule_violation(&self, violation: RuleViolation) {
        warn!("We close the connection because of {} at {}", violation.to_string().red(), self);
        let _ = self.inner.rule_violation.set(violation);
        self.shut_down(violation.close_reason());
    }

    pub fn shut_down(&self, reason: CloseConnectionReason) {
        self.shut_down_with_handler(reason, None);
    }

    /// Closes the connection once. With a close message, the peer is told the reason and
    /// given a grace period before the socket is closed. `handler` runs on the user thread when
    /// the connection is torn down, also if the shutdown was already started by another caller.
    pub fn shut_down_with_handler(
        &self,
        reason: CloseConnectionReason,
        handler: Option<CompletionHandler>,
    ) {
        {
            let mut shutdown = self.inner.shutdown.lock();
            if shutdown.completed {
                drop(shutdown);
                if let Some(handler) = handler {
                    self.user_thread().execute(handler);
                }
                return;
            }
            if let Some(handler) = handler {
                shutdown.handlers.push(handler);
            }
            if shutdown.started {
                trace!("shut down already in progress: {}", self);
                return;
            }
            shutdown.started = true;
        }
        info!("{} {} reason={}", "Shut down connection:".yellow(), self, reason);

        if reason.send_close_message() {
            let reason_name = match (reason, self.rule_violation()) {
                (CloseConnectionReason::RuleViolation, Some(violation)) => violation.name(),
                _ => reason.name(),
            };
            let envelope = NetworkEnvelope::with_version(
                self.config().message_version,
                Payload::CloseConnection(CloseConnectionMessage::new(reason_name)),
            );
            let connection = self.clone();
            self.user_thread().spawn(async move {
                let written = connection.send(envelope);
                let close_send_timeout = connection.config().close_send_timeout;
                match timeout(close_send_timeout, written).await {
                    Ok(Ok(Ok(()))) => trace!("close message sent"),
                    Ok(Ok(Err(err))) => debug!("close message not sent: {}", err),
                    Ok(Err(_)) => debug!("close message dropped by the writer"),
                    Err(_) => debug!("timeout sending the close message"),
                }
                connection.inner.stopped.store(true, Ordering::SeqCst);
                tokio::time::sleep(connection.config().close_grace_period).await;
                let torn_down = connection.clone();
                connection.user_thread().execute(move || torn_down.tear_down(reason));
            });
        } else {
            self.inner.stopped.store(true, Ordering::SeqCst);
            let connection = self.clone();
            self.user_thread().execute(move || connection.tear_down(reason));
        }
    }

    // Runs on the user thread. A failing step does not prevent the remaining ones.
    fn tear_down(&self, reason: CloseConnectionReason) {
        let listener = self.inner.connection_listener.clone();
        if catch_unwind(AssertUnwindSafe(|| listener.on_disconnect(reason, self))).is_err() {
            warn!("connection listener panicked on disconnect of {}", self);
        }

        if let Some(reader) = self.inner.reader_task.lock().take() {
            reader.abort();
        }
        let _ = self.inner.writer.send(WriterCommand::Close);
        if let Some(writer) = self.inner.writer_task.lock().take() {
            self.user_thread().spawn(async move {
                let abort = writer.abort_handle();
                if timeout(WRITER_ABORT_TIMEOUT, writer).await.is_err() {
                    abort.abort();
                }
            });
        }

        self.inner.message_listeners.clear();
        self.inner.capabilities_listeners.clear();
        self.inner.connection_state.shut_down();

        let handlers = {
            let mut shutdown = self.inner.shutdown.lock();
            shutdown.completed = true;
            std::mem::take(&mut shutdown.handlers)
        };
        debug!("Connection shutdown complete {}", self);
        for handler in handlers {
            self.user_thread().execute(handler);
        }
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uid == other.inner.uid
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.uid.hash(state);
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peer = self.peers_node_address().map(|a| a.to_string()).unwrap_or_else(|| "?".to_string());
        write!(f, "Connection{{peer={}, direction={:?}, uid={}}}", peer, self.inner.direction, self.inner.uid)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("uid", &self.inner.uid)
            .field("direction", &self.inner.direction)
            .field("peers_node_address", &self.peers_node_address())
            .field("stopped", &self.is_stopped())
            .field("rule_violation", &self.rule_violation())
            .finish()
    }
}
