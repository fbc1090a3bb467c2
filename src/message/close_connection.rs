/// Sent by a peer right before it closes the socket. `reason` is the name of the close reason,
/// or of the rule violation that caused it.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CloseConnectionMessage {
    pub reason: String,
}

impl CloseConnectionMessage {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        CloseConnectionMessage { reason: reason.into() }
    }
}
