use super::close_connection_reason::CloseConnectionReason;

use std::collections::HashMap;
use std::fmt;

/// A protocol rule a peer can break. A peer is tolerated until it breaks the same rule
/// `max_tolerance` times; a tolerance of zero closes the connection on the first occurrence.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RuleViolation {
    InvalidDataType,
    WrongNetworkId,
    MaxMsgSizeExceeded,
    ThrottleLimitExceeded,
    TooManyReportedPeersSent,
    PeerBanned,
    InvalidClass,
}

impl RuleViolation {
    pub fn max_tolerance(self) -> u32 {
        use RuleViolation::*;
        match self {
            InvalidDataType => 2,
            WrongNetworkId => 0,
            MaxMsgSizeExceeded => 2,
            ThrottleLimitExceeded => 2,
            TooManyReportedPeersSent => 2,
            PeerBanned => 0,
            InvalidClass => 0,
        }
    }

    /// The reason the connection is closed with once this rule is broken too often.
    pub fn close_reason(self) -> CloseConnectionReason {
        match self {
            RuleViolation::PeerBanned => CloseConnectionReason::PeerBanned,
            RuleViolation::InvalidClass => CloseConnectionReason::InvalidClassReceived,
            _ => CloseConnectionReason::RuleViolation,
        }
    }

    pub fn name(self) -> &'static str {
        use RuleViolation::*;
        match self {
            InvalidDataType => "INVALID_DATA_TYPE",
            WrongNetworkId => "WRONG_NETWORK_ID",
            MaxMsgSizeExceeded => "MAX_MSG_SIZE_EXCEEDED",
            ThrottleLimitExceeded => "THROTTLE_LIMIT_EXCEEDED",
            TooManyReportedPeersSent => "TOO_MANY_REPORTED_PEERS_SENT",
            PeerBanned => "PEER_BANNED",
            InvalidClass => "INVALID_CLASS",
        }
    }
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Verdict {
    Tolerated { count: u32 },
    /// The tolerance was reached. Returned once per tracker, later reports are ignored.
    Exceeded,
    AlreadyExceeded,
}

/// Per-kind violation counts of one connection. Owned by the read loop.
#[derive(Debug, Default)]
pub struct ViolationTracker {
    counts: HashMap<RuleViolation, u32>,
    exceeded: bool,
}

impl ViolationTracker {
    pub fn new() -> Self {
        ViolationTracker::default()
    }

    pub fn report(&mut self, violation: RuleViolation) -> Verdict {
        if self.exceeded {
            return Verdict::AlreadyExceeded;
        }
        let count = self.counts.entry(violation).or_insert(0);
        *count += 1;
        if *count >= violation.max_tolerance().max(1) {
            self.exceeded = true;
            Verdict::Exceeded
        } else {
            Verdict::Tolerated { count: *count }
        }
    }

    pub fn count(&self, violation: RuleViolation) -> u32 {
        self.counts.get(&violation).copied().unwrap_or(0)
    }
}
