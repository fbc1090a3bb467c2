use crate::capability::Capability;
use crate::version::P2P_MESSAGE_VERSION;

use std::time::Duration;

/// Limits and timeouts of a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Messages a peer may send within one second before it is throttled.
    pub msg_throttle_per_sec: usize,
    /// Messages a peer may send within ten seconds before it is throttled.
    pub msg_throttle_per_10_sec: usize,
    /// Writes closer together than this are delayed by `send_msg_throttle_sleep`.
    pub send_msg_throttle_trigger: Duration,
    pub send_msg_throttle_sleep: Duration,
    /// A peer silent for longer than this is disconnected.
    pub read_timeout: Duration,
    /// Serialized envelope size ceiling.
    pub max_permitted_message_size: usize,
    /// Ceiling for payloads with the extended size permission.
    pub permitted_message_size_extended: usize,
    pub message_version: u32,
    /// Time given to the peer to read the close message before the socket is closed.
    pub close_grace_period: Duration,
    pub close_send_timeout: Duration,
    /// Advertised capability sets lacking this one are rejected.
    pub mandatory_capability: Option<Capability>,
    pub expected_initial_data_requests: u32,
    pub peer_reset_timeout: Duration,
    pub completed_timeout: Duration,
}

impl ConnectionConfig {
    /// The largest frame the codec accepts. Anything between the permitted ceilings and this
    /// is read and then rejected as a rule violation, larger frames corrupt the stream.
    pub fn max_frame_length(&self) -> usize {
        self.permitted_message_size_extended * 2
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            msg_throttle_per_sec: 200,
            msg_throttle_per_10_sec: 1000,
            send_msg_throttle_trigger: Duration::from_millis(20),
            send_msg_throttle_sleep: Duration::from_millis(50),
            read_timeout: Duration::from_secs(120),
            max_permitted_message_size: 200 * 1024,
            permitted_message_size_extended: 10 * 1024 * 1024,
            message_version: P2P_MESSAGE_VERSION,
            close_grace_period: Duration::from_millis(200),
            close_send_timeout: Duration::from_secs(5),
            mandatory_capability: Some(Capability::MANDATORY),
            expected_initial_data_requests: 6,
            peer_reset_timeout: Duration::from_secs(4 * 60),
            completed_timeout: Duration::from_secs(10),
        }
    }
}

/// Limits and timeouts of the node as a whole.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub create_socket_timeout: Duration,
    /// Upper bound on `NetworkNode::shut_down`, after which the completion handler fires
    /// regardless of connections still closing.
    pub shutdown_timeout: Duration,
    /// Concurrent connect and send tasks.
    pub max_workers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            create_socket_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_millis(1500),
            max_workers: 64,
        }
    }
}
