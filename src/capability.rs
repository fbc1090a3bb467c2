//! Feature ids advertised by peers during the handshake.

use std::collections::BTreeSet;
use std::fmt;

/// Known feature ids. The discriminant is the id on the wire and must never be reordered.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(u32)]
pub enum Capability {
    TradeStatistics = 0,
    TradeStatistics2 = 1,
    AccountAgeWitness = 2,
    SeedNode = 3,
    DaoFullNode = 4,
    Proposal = 5,
    BlindVote = 6,
    AckMsg = 7,
    ReceiveBsqBlock = 8,
    DaoState = 9,
    BundleOfEnvelopes = 10,
    SignedAccountAgeWitness = 11,
    Mediation = 12,
    RefundAgent = 13,
    TradeStatisticsHashUpdate = 14,
    NoAddressPrefix = 15,
    TradeStatistics3 = 16,
    BsqSwapOffer = 17,
}

impl Capability {
    /// A peer advertising a non-empty set without this capability is disconnected.
    pub const MANDATORY: Capability = Capability::DaoState;

    pub fn id(self) -> u32 {
        self as u32
    }
}

/// A set of feature ids. Unknown ids are retained so that newer peers can be relayed faithfully.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Capabilities(BTreeSet<u32>);

impl Capabilities {
    pub fn new() -> Self {
        Capabilities(BTreeSet::new())
    }

    pub fn from_ids<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        Capabilities(ids.into_iter().collect())
    }

    pub fn add(&mut self, capability: Capability) {
        self.0.insert(capability.id());
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability.id())
    }

    /// Whether every id of `required` is present in `self`.
    pub fn contains_all(&self, required: &Capabilities) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl From<&[Capability]> for Capabilities {
    fn from(capabilities: &[Capability]) -> Self {
        Capabilities(capabilities.iter().map(|c| c.id()).collect())
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Capabilities(iter.into_iter().map(|c| c.id()).collect())
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_all() {
        let advertised: Capabilities =
            vec![Capability::DaoState, Capability::Mediation, Capability::AckMsg]
                .into_iter()
                .collect();
        let required: Capabilities = vec![Capability::Mediation].into_iter().collect();
        assert!(advertised.contains_all(&required));
        assert!(advertised.contains_all(&Capabilities::new()));

        let missing: Capabilities = vec![Capability::RefundAgent].into_iter().collect();
        assert!(!advertised.contains_all(&missing));
    }

    #[test]
    fn test_unknown_ids_are_kept() {
        let capabilities = Capabilities::from_ids(vec![9, 4000]);
        assert!(capabilities.contains(Capability::MANDATORY));
        assert_eq!(capabilities.ids().collect::<Vec<_>>(), vec![9, 4000]);
        assert_eq!(format!("{}", capabilities), "[9, 4000]");
    }
}
