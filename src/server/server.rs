use crate::p2p::close_connection_reason::CloseConnectionReason;
use crate::p2p::connection::{Connection, ConnectionContext};
use crate::p2p::connection_set::ConnectionSet;
use crate::p2p::listener::{ConnectionListener, MessageListener};
use crate::Error;

use crate::colored::Colorize;

use parking_lot::Mutex;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use tracing::{debug, error, info};

/// Implements a server turning incoming sockets into inbound connections.
pub struct Server {
    /// The address the listening socket is bound to.
    local_addr: Option<SocketAddr>,
    inner: Arc<ServerInner>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

struct ServerInner {
    connections: ConnectionSet,
    stopped: AtomicBool,
}

impl Server {
    /// Runs the accept loop on `listener`. Accepted connections report to `connection_listener`
    /// and deliver to `message_listener`.
    pub fn start(
        listener: TcpListener,
        message_listener: Arc<dyn MessageListener>,
        connection_listener: Arc<dyn ConnectionListener>,
        context: ConnectionContext,
    ) -> Server {
        let local_addr = listener.local_addr().ok();
        let inner = Arc::new(ServerInner { connections: ConnectionSet::new(), stopped: AtomicBool::new(false) });
        let tracking: Arc<dyn ConnectionListener> =
            Arc::new(TrackingListener { server: Arc::downgrade(&inner), delegate: connection_listener });
        let accept_task = context.user_thread.spawn(accept_loop(
            listener,
            inner.clone(),
            message_listener,
            tracking,
            context.clone(),
        ));
        info!("Server listening on {:?}", local_addr);
        Server { local_addr, inner, accept_task: Mutex::new(Some(accept_task)) }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// The inbound connections accepted by this server that are still open.
    pub fn connections(&self) -> Vec<Connection> {
        self.inner.connections.snapshot()
    }

    /// Stops accepting, closes the listening socket and shuts every accepted connection down.
    pub fn shut_down(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            debug!("Server already stopped");
            return;
        }
        // dropping the listener with the task closes the socket
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        let connections = self.inner.connections.snapshot();
        info!("{} closing {} connection(s)", "Server shut down:".yellow(), connections.len());
        for connection in connections {
            connection.shut_down(CloseConnectionReason::AppShutDown);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    server: Arc<ServerInner>,
    message_listener: Arc<dyn MessageListener>,
    connection_listener: Arc<dyn ConnectionListener>,
    context: ConnectionContext,
) {
    loop {
        match listener.accept().await {
            Ok((socket, remote)) => {
                if server.stopped.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Accepted new client on local port {:?} from {}", listener.local_addr().ok(), remote);
                let connection = Connection::inbound(
                    socket,
                    Some(message_listener.clone()),
                    connection_listener.clone(),
                    &context,
                );
                // the connection may already be gone if it was closed right away
                if !connection.is_shutting_down() {
                    server.connections.insert(connection.clone());
                    // shut_down may have taken its snapshot before the insert
                    if server.stopped.load(Ordering::SeqCst) {
                        connection.shut_down(CloseConnectionReason::AppShutDown);
                    }
                }
            }
            Err(err) => {
                if !server.stopped.load(Ordering::SeqCst) {
                    error!("Accepting connections failed: {}", err);
                    connection_listener.on_error(&Error::IO(err));
                }
                break;
            }
        }
    }
}

// Keeps the set of accepted connections current and forwards to the node.
struct TrackingListener {
    server: Weak<ServerInner>,
    delegate: Arc<dyn ConnectionListener>,
}

impl ConnectionListener for TrackingListener {
    fn on_connection(&self, connection: &Connection) {
        self.delegate.on_connection(connection);
    }

    fn on_disconnect(&self, reason: CloseConnectionReason, connection: &Connection) {
        if let Some(server) = self.server.upgrade() {
            server.connections.remove(connection);
        }
        self.delegate.on_disconnect(reason, connection);
    }

    fn on_error(&self, error: &Error) {
        self.delegate.on_error(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NetworkEnvelope, Payload, Ping};
    use crate::p2p::connection_config::ConnectionConfig;
    use crate::test_util::*;

    use tokio::net::TcpStream;

    async fn start_server(context: &ConnectionContext, listener: Arc<RecordingListener>) -> Server {
        let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Server::start(socket, listener.clone(), listener, context.clone())
    }

    async fn connect(server: &Server) -> RawPeer {
        RawPeer::new(TcpStream::connect(server.local_addr().unwrap()).await.unwrap())
    }

    #[actix_rt::test]
    async fn test_accepts_and_delivers() {
        let (context, _) = test_context(ConnectionConfig::default());
        let listener = RecordingListener::new();
        let server = start_server(&context, listener.clone()).await;

        let mut peer = connect(&server).await;
        let ping = NetworkEnvelope::new(Payload::Ping(Ping::new(1, 0)));
        peer.send(&ping).await;

        assert_eq!(listener.wait_for_messages(1).await, vec![ping]);
        assert_eq!(listener.connections(), 1);
        assert_eq!(server.connections().len(), 1);
    }

    #[actix_rt::test]
    async fn test_disconnect_untracks() {
        let (context, _) = test_context(ConnectionConfig::default());
        let listener = RecordingListener::new();
        let server = start_server(&context, listener.clone()).await;

        let peer = connect(&server).await;
        wait_for(|| server.connections().len() == 1).await;
        drop(peer);

        assert_eq!(listener.wait_for_disconnects(1).await, vec![CloseConnectionReason::Terminated]);
        assert!(server.connections().is_empty());
    }

    #[actix_rt::test]
    async fn test_shut_down_closes_everything() {
        let (context, _) = test_context(ConnectionConfig::default());
        let listener = RecordingListener::new();
        let server = start_server(&context, listener.clone()).await;
        let address = server.local_addr().unwrap();

        let mut peer = connect(&server).await;
        wait_for(|| server.connections().len() == 1).await;
        server.shut_down();
        server.shut_down();
        assert!(server.is_stopped());

        match peer.recv().await.map(|envelope| envelope.payload) {
            Some(Payload::CloseConnection(close)) => assert_eq!(close.reason, "APP_SHUT_DOWN"),
            other => panic!("expected a close message, got {:?}", other),
        }
        assert_eq!(listener.wait_for_disconnects(1).await, vec![CloseConnectionReason::AppShutDown]);

        // the listening socket is closed once the aborted task was dropped
        let mut refused = false;
        for _ in 0..50 {
            if TcpStream::connect(address).await.is_err() {
                refused = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(refused);
    }
}
