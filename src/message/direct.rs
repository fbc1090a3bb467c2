use crate::node_address::NodeAddress;

/// An encrypted application message addressed to a single peer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PrefixedSealedAndSigned {
    pub sender: NodeAddress,
    pub sealed: Vec<u8>,
    pub uid: String,
}

impl PrefixedSealedAndSigned {
    pub fn new<S: Into<String>>(sender: NodeAddress, sealed: Vec<u8>, uid: S) -> Self {
        PrefixedSealedAndSigned { sender, sealed, uid: uid.into() }
    }
}
