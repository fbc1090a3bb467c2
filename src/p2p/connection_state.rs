//! Coarse classification of a peer from the traffic seen on its connection.

use super::connection_config::ConnectionConfig;

use crate::message::Payload;
use crate::user_thread::{Timer, UserThread};

use parking_lot::Mutex;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PeerType {
    /// A regular peer.
    Peer,
    /// Bulk data is being exchanged with the peer right after connecting.
    InitialDataExchange,
    /// The peer exchanged direct messages with us. Never downgraded.
    DirectMsgPeer,
}

struct State {
    peer_type: PeerType,
    num_initial_data_requests: u32,
    num_initial_data_responses: u32,
    peer_reset_timer: Option<Timer>,
    completed_timer: Option<Timer>,
    stopped: bool,
}

impl State {
    fn stop_timers(&mut self) {
        if let Some(timer) = self.peer_reset_timer.take() {
            timer.stop();
        }
        if let Some(timer) = self.completed_timer.take() {
            timer.stop();
        }
    }
}

#[derive(Clone)]
pub struct ConnectionState {
    state: Arc<Mutex<State>>,
    user_thread: UserThread,
    expected_requests: u32,
    peer_reset_timeout: Duration,
    completed_timeout: Duration,
}

impl ConnectionState {
    pub fn new(user_thread: UserThread, config: &ConnectionConfig) -> Self {
        ConnectionState {
            state: Arc::new(Mutex::new(State {
                peer_type: PeerType::Peer,
                num_initial_data_requests: 0,
                num_initial_data_responses: 0,
                peer_reset_timer: None,
                completed_timer: None,
                stopped: false,
            })),
            user_thread,
            expected_requests: config.expected_initial_data_requests,
            peer_reset_timeout: config.peer_reset_timeout,
            completed_timeout: config.completed_timeout,
        }
    }

    pub fn peer_type(&self) -> PeerType {
        self.state.lock().peer_type
    }

    pub fn num_initial_data_requests(&self) -> u32 {
        self.state.lock().num_initial_data_requests
    }

    pub fn num_initial_data_responses(&self) -> u32 {
        self.state.lock().num_initial_data_responses
    }

    /// Observes a payload sent or received on the connection. A direct message only promotes
    /// the peer once its address is known.
    pub fn on_message(&self, payload: &Payload, peer_address_known: bool) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        if payload.is_initial_data_request() {
            state.num_initial_data_requests += 1;
            self.on_initial_data_exchange(&mut state);
        } else if payload.is_initial_data_response() {
            state.num_initial_data_responses += 1;
            self.on_initial_data_exchange(&mut state);
        } else if payload.is_direct_message() && peer_address_known {
            if state.peer_type != PeerType::DirectMsgPeer {
                debug!("peer promoted to {:?}", PeerType::DirectMsgPeer);
            }
            state.peer_type = PeerType::DirectMsgPeer;
            state.stop_timers();
        }
    }

    fn on_initial_data_exchange(&self, state: &mut State) {
        if state.peer_type == PeerType::DirectMsgPeer {
            state.stop_timers();
            return;
        }
        state.peer_type = PeerType::InitialDataExchange;
        if state.peer_reset_timer.is_none() {
            state.peer_reset_timer = Some(self.reset_after(self.peer_reset_timeout));
        }
        if state.num_initial_data_requests >= self.expected_requests
            && state.num_initial_data_responses >= self.expected_requests
        {
            if let Some(timer) = state.completed_timer.take() {
                timer.stop();
            }
            state.completed_timer = Some(self.reset_after(self.completed_timeout));
        }
    }

    fn reset_after(&self, delay: Duration) -> Timer {
        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        self.user_thread.run_after(delay, move || {
            if let Some(state) = state.upgrade() {
                let mut state = state.lock();
                if state.peer_type == PeerType::InitialDataExchange {
                    state.peer_type = PeerType::Peer;
                }
                state.stop_timers();
            }
        })
    }

    /// Stops pending timers. Later observations are ignored.
    pub fn shut_down(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.stop_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use crate::message::{GetDataResponse, PreliminaryGetDataRequest, PrefixedSealedAndSigned};
    use crate::node_address::NodeAddress;

    fn config(peer_reset_ms: u64, completed_ms: u64) -> ConnectionConfig {
        ConnectionConfig {
            expected_initial_data_requests: 2,
            peer_reset_timeout: Duration::from_millis(peer_reset_ms),
            completed_timeout: Duration::from_millis(completed_ms),
            ..ConnectionConfig::default()
        }
    }

    fn request() -> Payload {
        Payload::PreliminaryGetDataRequest(PreliminaryGetDataRequest::new(1, Capabilities::new()))
    }

    fn response() -> Payload {
        Payload::GetDataResponse(GetDataResponse::new(1, false, vec![], Capabilities::new()))
    }

    fn direct() -> Payload {
        Payload::PrefixedSealedAndSigned(PrefixedSealedAndSigned::new(
            NodeAddress::localhost(2002),
            vec![],
            "uid",
        ))
    }

    #[actix_rt::test]
    async fn test_safety_timer_reverts_to_peer() {
        let state = ConnectionState::new(UserThread::start().unwrap(), &config(100, 10));
        state.on_message(&request(), false);
        assert_eq!(state.peer_type(), PeerType::InitialDataExchange);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(state.peer_type(), PeerType::Peer);
    }

    #[actix_rt::test]
    async fn test_completion_timer_reverts_to_peer() {
        let state = ConnectionState::new(UserThread::start().unwrap(), &config(60_000, 50));
        for _ in 0..2 {
            state.on_message(&request(), false);
            state.on_message(&response(), false);
        }
        assert_eq!(state.num_initial_data_requests(), 2);
        assert_eq!(state.num_initial_data_responses(), 2);
        assert_eq!(state.peer_type(), PeerType::InitialDataExchange);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(state.peer_type(), PeerType::Peer);
    }

    #[actix_rt::test]
    async fn test_direct_msg_peer_is_never_downgraded() {
        let state = ConnectionState::new(UserThread::start().unwrap(), &config(50, 10));
        state.on_message(&request(), false);
        state.on_message(&direct(), false);
        assert_eq!(state.peer_type(), PeerType::InitialDataExchange);

        state.on_message(&direct(), true);
        assert_eq!(state.peer_type(), PeerType::DirectMsgPeer);

        state.on_message(&request(), false);
        state.on_message(&response(), false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(state.peer_type(), PeerType::DirectMsgPeer);
    }

    #[actix_rt::test]
    async fn test_shut_down_stops_timers() {
        let state = ConnectionState::new(UserThread::start().unwrap(), &config(50, 10));
        state.on_message(&request(), false);
        state.shut_down();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(state.peer_type(), PeerType::InitialDataExchange);
    }
}
