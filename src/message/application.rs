use crate::capability::Capabilities;
use crate::node_address::NodeAddress;

/// A message of a higher layer (offer book, gossip, trade protocol). Only the framing
/// metadata is interpreted here, `data` is passed through untouched.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub kind: String,
    pub data: Vec<u8>,
    /// The receiving peer must advertise all of these, otherwise the message is not sent.
    pub required_capabilities: Capabilities,
    /// Allows the message to grow up to the extended size ceiling.
    pub extended_size: bool,
    pub sender: Option<NodeAddress>,
}

impl ApplicationMessage {
    pub fn new<S: Into<String>>(kind: S, data: Vec<u8>) -> Self {
        ApplicationMessage {
            kind: kind.into(),
            data,
            required_capabilities: Capabilities::new(),
            extended_size: false,
            sender: None,
        }
    }

    pub fn with_required_capabilities(mut self, required_capabilities: Capabilities) -> Self {
        self.required_capabilities = required_capabilities;
        self
    }

    pub fn with_extended_size(mut self) -> Self {
        self.extended_size = true;
        self
    }

    pub fn with_sender(mut self, sender: NodeAddress) -> Self {
        self.sender = Some(sender);
        self
    }
}
