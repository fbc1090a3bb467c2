use std::fmt;

/// Why a connection was closed. Each reason decides whether the peer is told about it and
/// whether the close was intended by either side.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CloseConnectionReason {
    // Transport
    SocketClosed,
    Reset,
    SocketTimeout,
    Terminated,
    CorruptedData,
    NoProtoBufferData,
    NoProtoBufferEnv,
    UnknownException,

    // Intended
    AppShutDown,
    CloseRequestedByPeer,

    // Send failures
    SendMsgFailure,
    SendMsgTimeout,

    // Peer management
    TooManyConnectionsOpen,
    TooManySeedNodesConnected,
    UnknownPeerAddress,

    // Misbehaviour
    RuleViolation,
    PeerBanned,
    InvalidClassReceived,
    MandatoryCapabilitiesNotSupported,
}

impl CloseConnectionReason {
    /// Whether a close message carrying this reason is sent to the peer before closing.
    pub fn send_close_message(self) -> bool {
        use CloseConnectionReason::*;
        match self {
            AppShutDown
            | TooManyConnectionsOpen
            | TooManySeedNodesConnected
            | UnknownPeerAddress
            | RuleViolation
            | PeerBanned => true,
            _ => false,
        }
    }

    pub fn is_intended(self) -> bool {
        use CloseConnectionReason::*;
        matches!(
            self,
            AppShutDown
                | CloseRequestedByPeer
                | TooManyConnectionsOpen
                | TooManySeedNodesConnected
                | UnknownPeerAddress
        )
    }

    /// The name sent in close messages.
    pub fn name(self) -> &'static str {
        use CloseConnectionReason::*;
        match self {
            SocketClosed => "SOCKET_CLOSED",
            Reset => "RESET",
            SocketTimeout => "SOCKET_TIMEOUT",
            Terminated => "TERMINATED",
            CorruptedData => "CORRUPTED_DATA",
            NoProtoBufferData => "NO_PROTO_BUFFER_DATA",
            NoProtoBufferEnv => "NO_PROTO_BUFFER_ENV",
            UnknownException => "UNKNOWN_EXCEPTION",
            AppShutDown => "APP_SHUT_DOWN",
            CloseRequestedByPeer => "CLOSE_REQUESTED_BY_PEER",
            SendMsgFailure => "SEND_MSG_FAILURE",
            SendMsgTimeout => "SEND_MSG_TIMEOUT",
            TooManyConnectionsOpen => "TOO_MANY_CONNECTIONS_OPEN",
            TooManySeedNodesConnected => "TOO_MANY_SEED_NODES_CONNECTED",
            UnknownPeerAddress => "UNKNOWN_PEER_ADDRESS",
            RuleViolation => "RULE_VIOLATION",
            PeerBanned => "PEER_BANNED",
            InvalidClassReceived => "INVALID_CLASS_RECEIVED",
            MandatoryCapabilitiesNotSupported => "MANDATORY_CAPABILITIES_NOT_SUPPORTED",
        }
    }
}

impl fmt::Display for CloseConnectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::CloseConnectionReason::*;

    #[test]
    fn test_close_message_table() {
        for reason in [AppShutDown, TooManyConnectionsOpen, RuleViolation, PeerBanned] {
            assert!(reason.send_close_message(), "{}", reason);
        }
        for reason in [SocketClosed, Reset, CloseRequestedByPeer, SendMsgTimeout, InvalidClassReceived]
        {
            assert!(!reason.send_close_message(), "{}", reason);
        }
    }

    #[test]
    fn test_intended_table() {
        assert!(AppShutDown.is_intended());
        assert!(CloseRequestedByPeer.is_intended());
        assert!(UnknownPeerAddress.is_intended());
        assert!(!RuleViolation.is_intended());
        assert!(!PeerBanned.is_intended());
        assert!(!SocketTimeout.is_intended());
        assert!(!MandatoryCapabilitiesNotSupported.is_intended());
    }

    #[test]
    fn test_name() {
        assert_eq!(MandatoryCapabilitiesNotSupported.to_string(), "MANDATORY_CAPABILITIES_NOT_SUPPORTED");
        assert_eq!(PeerBanned.name(), "PEER_BANNED");
    }
}
