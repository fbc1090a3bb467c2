//! The read loop of a connection.
//!
//! Every frame goes through the same checks before it reaches the message listeners:
//! decoding, size, throttle, network id, capabilities, close handshake and the sender
//! address. The violation counts and the throttle state belong to this loop alone.

use super::close_connection_reason::CloseConnectionReason;
use super::connection::Connection;
use super::rule_violation::{RuleViolation, Verdict, ViolationTracker};
use super::throttle::Throttle;

use crate::channel::{decode, DecodeError, Receiver};
use crate::message::{NetworkEnvelope, Payload};

use crate::colored::Colorize;

use std::io;
use std::time::Instant;

use tokio::time::timeout;

use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct InputHandler {
    receiver: Receiver,
    connection: Connection,
    violations: ViolationTracker,
    throttle: Throttle,
}

impl InputHandler {
    pub(crate) fn new(receiver: Receiver, connection: Connection) -> Self {
        let config = connection.config();
        let throttle = Throttle::new(config.msg_throttle_per_sec, config.msg_throttle_per_10_sec);
        InputHandler { receiver, connection, violations: ViolationTracker::new(), throttle }
    }

    pub(crate) async fn run(mut self) {
        let read_timeout = self.connection.config().read_timeout;
        while !self.connection.is_stopped() {
            let frame = match timeout(read_timeout, self.receiver.recv()).await {
                Ok(Ok(Some(frame))) => frame,
                Ok(Ok(None)) => {
                    debug!("end of stream, expected if the peer stopped without a close message");
                    self.connection.shut_down(CloseConnectionReason::Terminated);
                    return;
                }
                Ok(Err(err)) => {
                    let reason = classify_io_error(&err);
                    info!("read failed on {} ({}): {}", self.connection, reason, err);
                    self.connection.shut_down(reason);
                    return;
                }
                Err(_) => {
                    info!("no data from the peer within {:?}: {}", read_timeout, self.connection);
                    self.connection.shut_down(CloseConnectionReason::SocketTimeout);
                    return;
                }
            };
            if self.on_frame(&frame) == Flow::Stop {
                return;
            }
        }
        trace!("input handler stopped");
    }

    fn on_frame(&mut self, frame: &[u8]) -> Flow {
        let size = frame.len();
        // tracked even for invalid data
        self.connection.statistic().add_received_bytes(size);

        let envelope = match decode(frame) {
            Ok(envelope) => envelope,
            Err(DecodeError::UnknownKind(err)) => {
                error!("received an unknown payload kind: {}", err);
                return self.report(RuleViolation::InvalidClass);
            }
            Err(DecodeError::InvalidData(err)) => {
                error!("received an undecodable envelope: {}", err);
                return self.report(RuleViolation::InvalidDataType);
            }
        };
        let payload = &envelope.payload;
        trace!("<< received {} ({} bytes)", payload.name(), size);
        self.connection.statistic().add_received_message(payload.name());

        let config = self.connection.config();
        let ceiling = if payload.permits_extended_size() {
            config.permitted_message_size_extended
        } else {
            config.max_permitted_message_size
        };
        if size > ceiling {
            warn!("size > ceiling. size={}, ceiling={}, payload={}", size, ceiling, payload.name());
            if self.report(RuleViolation::MaxMsgSizeExceeded) == Flow::Stop {
                return Flow::Stop;
            }
        }

        if self.throttle.record(Instant::now())
            && self.report(RuleViolation::ThrottleLimitExceeded) == Flow::Stop
        {
            return Flow::Stop;
        }

        let expected_version = self.connection.config().message_version;
        if envelope.message_version != expected_version {
            warn!(
                "wrong network id. message version={}, ours={}",
                envelope.message_version, expected_version
            );
            if self.report(RuleViolation::WrongNetworkId) == Flow::Stop {
                return Flow::Stop;
            }
        }

        if let Some(capabilities) = payload.supported_capabilities() {
            if self.connection.set_capabilities(capabilities.clone()) {
                let mandatory = self.connection.config().mandatory_capability;
                if let Some(mandatory) = mandatory {
                    if !capabilities.is_empty() && !capabilities.contains(mandatory) {
                        info!(
                            "We close a connection to an old node. capabilities={}, payload={}",
                            capabilities,
                            payload.name()
                        );
                        self.connection
                            .shut_down(CloseConnectionReason::MandatoryCapabilitiesNotSupported);
                        return Flow::Stop;
                    }
                }
                self.connection.notify_capabilities(capabilities);
            }
        }

        if let Payload::CloseConnection(close) = payload {
            debug!("close message received. reason={}", close.reason);
            if close.reason == CloseConnectionReason::PeerBanned.name() {
                warn!("{}", "We got shut down because we are banned by the other peer.".red());
                self.connection.shut_down(CloseConnectionReason::PeerBanned);
            } else {
                self.connection.shut_down(CloseConnectionReason::CloseRequestedByPeer);
            }
            return Flow::Stop;
        }
        if self.connection.is_stopped() {
            return Flow::Stop;
        }

        if let Some(sender) = payload.sender_node_address() {
            match self.connection.peers_node_address() {
                Some(known) if &known != sender => {
                    error!(
                        "sender address {} does not match the peer address {} of {}",
                        sender, known, self.connection
                    );
                    self.connection.shut_down(CloseConnectionReason::UnknownException);
                    return Flow::Stop;
                }
                Some(_) => {}
                None => {
                    if self.connection.set_peers_node_address(sender.clone()) {
                        warn!("We detected a connection to a banned peer. We will close that connection.");
                        return self.report(RuleViolation::PeerBanned);
                    }
                }
            }
        }

        if !payload.is_keep_alive() {
            self.connection.statistic().update_last_activity();
        }

        self.observe(&envelope);
        self.connection.deliver(envelope);
        Flow::Continue
    }

    fn observe(&self, envelope: &NetworkEnvelope) {
        let address_known = self.connection.has_peers_node_address();
        let state = self.connection.connection_state();
        if let Payload::Bundle(bundle) = &envelope.payload {
            for inner in &bundle.envelopes {
                self.connection.statistic().add_received_message(inner.payload.name());
                state.on_message(&inner.payload, address_known);
            }
        } else {
            state.on_message(&envelope.payload, address_known);
        }
    }

    fn report(&mut self, violation: RuleViolation) -> Flow {
        match self.violations.report(violation) {
            Verdict::Tolerated { count } => {
                warn!(
                    "We got reported the rule violation {} ({}/{}) at {}",
                    violation,
                    count,
                    violation.max_tolerance(),
                    self.connection
                );
                Flow::Continue
            }
            Verdict::Exceeded => {
                self.connection.on_rule_violation(violation);
                Flow::Stop
            }
            Verdict::AlreadyExceeded => Flow::Stop,
        }
    }
}

/// Maps a socket error to the reason the connection is closed with.
pub(crate) fn classify_io_error(err: &io::Error) -> CloseConnectionReason {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => CloseConnectionReason::Reset,
        io::ErrorKind::NotConnected => CloseConnectionReason::SocketClosed,
        io::ErrorKind::TimedOut => CloseConnectionReason::SocketTimeout,
        io::ErrorKind::UnexpectedEof => CloseConnectionReason::Terminated,
        // frame length above the codec maximum
        io::ErrorKind::InvalidData => CloseConnectionReason::CorruptedData,
        // stream ended in the middle of a frame
        io::ErrorKind::Other => CloseConnectionReason::NoProtoBufferData,
        _ => CloseConnectionReason::UnknownException,
    }
}
