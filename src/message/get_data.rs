//! Initial data exchange between a freshly connected node and a seed or peer.

use crate::capability::Capabilities;
use crate::node_address::NodeAddress;

/// First request of a node that does not yet know its own address.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PreliminaryGetDataRequest {
    pub nonce: u32,
    pub supported_capabilities: Capabilities,
}

impl PreliminaryGetDataRequest {
    pub fn new(nonce: u32, supported_capabilities: Capabilities) -> Self {
        PreliminaryGetDataRequest { nonce, supported_capabilities }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GetUpdatedDataRequest {
    pub sender: NodeAddress,
    pub nonce: u32,
}

impl GetUpdatedDataRequest {
    pub fn new(sender: NodeAddress, nonce: u32) -> Self {
        GetUpdatedDataRequest { sender, nonce }
    }
}

/// The bulk response to either request. The payload data is opaque to this layer.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct GetDataResponse {
    pub request_nonce: u32,
    pub is_get_updated_data_response: bool,
    pub data: Vec<u8>,
    pub supported_capabilities: Capabilities,
}

impl GetDataResponse {
    pub fn new(
        request_nonce: u32,
        is_get_updated_data_response: bool,
        data: Vec<u8>,
        supported_capabilities: Capabilities,
    ) -> Self {
        GetDataResponse { request_nonce, is_get_updated_data_response, data, supported_capabilities }
    }
}
