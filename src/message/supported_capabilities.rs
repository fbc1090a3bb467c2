use crate::capability::Capabilities;
use crate::node_address::NodeAddress;

/// Advertises the feature ids supported by the sender.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SupportedCapabilitiesMessage {
    pub capabilities: Capabilities,
    pub sender: Option<NodeAddress>,
}

impl SupportedCapabilitiesMessage {
    pub fn new(capabilities: Capabilities, sender: Option<NodeAddress>) -> Self {
        SupportedCapabilitiesMessage { capabilities, sender }
    }
}
