//! Helpers shared by the tests: a raw framed peer and listeners that record what they see.

use crate::channel::{decode, encode, Channel, Receiver, Sender};
use crate::message::NetworkEnvelope;
use crate::p2p::close_connection_reason::CloseConnectionReason;
use crate::p2p::connection::{Connection, ConnectionContext};
use crate::p2p::connection_config::ConnectionConfig;
use crate::p2p::listener::{ConnectionListener, MessageListener};
use crate::user_thread::UserThread;

use bytes::Bytes;
use parking_lot::Mutex;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn test_context(config: ConnectionConfig) -> (ConnectionContext, UserThread) {
    let user_thread = UserThread::start().unwrap();
    (ConnectionContext::new(config, user_thread.clone()), user_thread)
}

/// The remote end of a connection under test, speaking the wire format directly.
pub struct RawPeer {
    sender: Sender,
    receiver: Receiver,
}

impl RawPeer {
    pub fn new(socket: TcpStream) -> Self {
        let (sender, receiver) = Channel::wrap(socket, 64 * 1024 * 1024).split();
        RawPeer { sender, receiver }
    }

    pub async fn send(&mut self, envelope: &NetworkEnvelope) {
        self.sender.send(encode(envelope).unwrap()).await.unwrap();
    }

    pub async fn send_raw(&mut self, frame: Vec<u8>) {
        self.sender.send(Bytes::from(frame)).await.unwrap();
    }

    /// The next envelope, `None` once the stream ended.
    pub async fn recv(&mut self) -> Option<NetworkEnvelope> {
        match tokio::time::timeout(WAIT_TIMEOUT, self.receiver.recv()).await {
            Ok(Ok(Some(frame))) => Some(decode(&frame).unwrap()),
            Ok(Ok(None)) | Ok(Err(_)) => None,
            Err(_) => panic!("timeout waiting for an envelope"),
        }
    }
}

pub async fn raw_socket_pair() -> (TcpStream, RawPeer) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(address), listener.accept());
    (accepted.unwrap().0, RawPeer::new(client.unwrap()))
}

/// An inbound connection whose remote end is a raw peer.
pub async fn connect_pair(
    context: &ConnectionContext,
    listener: Arc<RecordingListener>,
) -> (Connection, RawPeer) {
    let (socket, peer) = raw_socket_pair().await;
    let message_listener: Arc<dyn MessageListener> = listener.clone();
    let connection = Connection::inbound(socket, Some(message_listener), listener, context);
    (connection, peer)
}

#[derive(Default)]
pub struct RecordingListener {
    messages: Mutex<Vec<NetworkEnvelope>>,
    sent: Mutex<Vec<NetworkEnvelope>>,
    disconnects: Mutex<Vec<CloseConnectionReason>>,
    connections: Mutex<usize>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingListener::default())
    }

    pub fn messages(&self) -> Vec<NetworkEnvelope> {
        self.messages.lock().clone()
    }

    pub fn sent(&self) -> Vec<NetworkEnvelope> {
        self.sent.lock().clone()
    }

    pub fn disconnects(&self) -> Vec<CloseConnectionReason> {
        self.disconnects.lock().clone()
    }

    pub fn connections(&self) -> usize {
        *self.connections.lock()
    }

    pub async fn wait_for_messages(&self, n: usize) -> Vec<NetworkEnvelope> {
        wait_for(|| self.messages().len() >= n).await;
        self.messages()
    }

    pub async fn wait_for_disconnects(&self, n: usize) -> Vec<CloseConnectionReason> {
        wait_for(|| self.disconnects().len() >= n).await;
        self.disconnects()
    }
}

pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    let started = tokio::time::Instant::now();
    while !condition() {
        if started.elapsed() > WAIT_TIMEOUT {
            panic!("condition not reached within {:?}", WAIT_TIMEOUT);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

impl MessageListener for RecordingListener {
    fn on_message(&self, envelope: &NetworkEnvelope, _connection: &Connection) {
        self.messages.lock().push(envelope.clone());
    }

    fn on_message_sent(&self, envelope: &NetworkEnvelope, _connection: &Connection) {
        self.sent.lock().push(envelope.clone());
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connection(&self, _connection: &Connection) {
        *self.connections.lock() += 1;
    }

    fn on_disconnect(&self, reason: CloseConnectionReason, _connection: &Connection) {
        self.disconnects.lock().push(reason);
    }
}
