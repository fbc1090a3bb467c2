//! Envelopes exchanged on the wire and the payload kinds this layer knows about.
mod application;
mod bundle;
mod close_connection;
mod direct;
mod get_data;
mod keep_alive;
mod supported_capabilities;

pub use application::ApplicationMessage;
pub use bundle::BundleOfEnvelopes;
pub use close_connection::CloseConnectionMessage;
pub use direct::PrefixedSealedAndSigned;
pub use get_data::{GetDataResponse, GetUpdatedDataRequest, PreliminaryGetDataRequest};
pub use keep_alive::{Ping, Pong};
pub use supported_capabilities::SupportedCapabilitiesMessage;

use crate::capability::{Capabilities, Capability};
use crate::node_address::NodeAddress;
use crate::version::P2P_MESSAGE_VERSION;

/// A single framed record on the wire.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetworkEnvelope {
    pub message_version: u32,
    pub payload: Payload,
}

impl NetworkEnvelope {
    pub fn new(payload: Payload) -> Self {
        NetworkEnvelope { message_version: P2P_MESSAGE_VERSION, payload }
    }

    pub fn with_version(message_version: u32, payload: Payload) -> Self {
        NetworkEnvelope { message_version, payload }
    }
}

impl From<Payload> for NetworkEnvelope {
    fn from(payload: Payload) -> Self {
        NetworkEnvelope::new(payload)
    }
}

// New variants are appended only: the variant index is the payload kind on the wire.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    // Session
    CloseConnection(CloseConnectionMessage),
    SupportedCapabilities(SupportedCapabilitiesMessage),
    // Keep-alive
    Ping(Ping),
    Pong(Pong),
    // Initial data exchange
    PreliminaryGetDataRequest(PreliminaryGetDataRequest),
    GetUpdatedDataRequest(GetUpdatedDataRequest),
    GetDataResponse(GetDataResponse),
    // Direct messaging
    PrefixedSealedAndSigned(PrefixedSealedAndSigned),
    Bundle(BundleOfEnvelopes),
    // Higher layers
    Application(ApplicationMessage),
}

impl Payload {
    /// The kind name, used for logging and the message histograms.
    pub fn name(&self) -> &str {
        match self {
            Payload::CloseConnection(_) => "CloseConnectionMessage",
            Payload::SupportedCapabilities(_) => "SupportedCapabilitiesMessage",
            Payload::Ping(_) => "Ping",
            Payload::Pong(_) => "Pong",
            Payload::PreliminaryGetDataRequest(_) => "PreliminaryGetDataRequest",
            Payload::GetUpdatedDataRequest(_) => "GetUpdatedDataRequest",
            Payload::GetDataResponse(_) => "GetDataResponse",
            Payload::PrefixedSealedAndSigned(_) => "PrefixedSealedAndSigned",
            Payload::Bundle(_) => "BundleOfEnvelopes",
            Payload::Application(msg) => &msg.kind,
        }
    }

    /// Capabilities the receiving peer must have advertised for this payload to be sent.
    pub fn required_capabilities(&self) -> Option<Capabilities> {
        match self {
            Payload::Bundle(_) => Some(vec![Capability::BundleOfEnvelopes].into_iter().collect()),
            Payload::Application(msg) if !msg.required_capabilities.is_empty() => {
                Some(msg.required_capabilities.clone())
            }
            _ => None,
        }
    }

    /// Capabilities advertised by the sender of this payload.
    pub fn supported_capabilities(&self) -> Option<&Capabilities> {
        match self {
            Payload::SupportedCapabilities(msg) => Some(&msg.capabilities),
            Payload::PreliminaryGetDataRequest(msg) => Some(&msg.supported_capabilities),
            Payload::GetDataResponse(msg) => Some(&msg.supported_capabilities),
            _ => None,
        }
    }

    pub fn permits_extended_size(&self) -> bool {
        match self {
            Payload::GetDataResponse(_) | Payload::Bundle(_) => true,
            Payload::Application(msg) => msg.extended_size,
            _ => false,
        }
    }

    pub fn sender_node_address(&self) -> Option<&NodeAddress> {
        match self {
            Payload::SupportedCapabilities(msg) => msg.sender.as_ref(),
            Payload::GetUpdatedDataRequest(msg) => Some(&msg.sender),
            Payload::PrefixedSealedAndSigned(msg) => Some(&msg.sender),
            Payload::Application(msg) => msg.sender.as_ref(),
            _ => None,
        }
    }

    pub fn is_keep_alive(&self) -> bool {
        matches!(self, Payload::Ping(_) | Payload::Pong(_))
    }

    pub fn is_initial_data_request(&self) -> bool {
        matches!(self, Payload::PreliminaryGetDataRequest(_) | Payload::GetUpdatedDataRequest(_))
    }

    pub fn is_initial_data_response(&self) -> bool {
        matches!(self, Payload::GetDataResponse(_))
    }

    pub fn is_direct_message(&self) -> bool {
        matches!(self, Payload::PrefixedSealedAndSigned(_))
    }
}
