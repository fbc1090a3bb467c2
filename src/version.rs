//! Protocol versioning for envelopes on the wire.

/// The message version tagged on every envelope of the main network. Peers running a
/// different network (or an incompatible wire format) use a different value and are
/// disconnected on the first envelope.
pub const P2P_MESSAGE_VERSION: u32 = 1;

/// The message version of the regtest network, used by the local test setup.
pub const REGTEST_MESSAGE_VERSION: u32 = 101;

/// Returns the message version for a named network.
pub fn message_version_for(network: &str) -> Option<u32> {
    match network {
        "mainnet" => Some(P2P_MESSAGE_VERSION),
        "regtest" => Some(REGTEST_MESSAGE_VERSION),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_version_for() {
        assert_eq!(message_version_for("mainnet"), Some(P2P_MESSAGE_VERSION));
        assert_eq!(message_version_for("regtest"), Some(REGTEST_MESSAGE_VERSION));
        assert_eq!(message_version_for("moonnet"), None);
    }
}
