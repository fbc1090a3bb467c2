use super::NetworkEnvelope;

/// Several envelopes sent as one frame. Each inner envelope is dispatched on its own.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BundleOfEnvelopes {
    pub envelopes: Vec<NetworkEnvelope>,
}

impl BundleOfEnvelopes {
    pub fn new(envelopes: Vec<NetworkEnvelope>) -> Self {
        BundleOfEnvelopes { envelopes }
    }
}
