use crate::node_address::NodeAddress;

use parking_lot::RwLock;

use std::collections::HashSet;

/// Decides whether connections to a peer are refused.
pub trait BanFilter: Send + Sync {
    fn is_banned(&self, address: &NodeAddress) -> bool;
}

/// A ban filter backed by a set of addresses, typically loaded from settings.
#[derive(Default)]
pub struct BanList {
    banned: RwLock<HashSet<NodeAddress>>,
}

impl BanList {
    pub fn new<I: IntoIterator<Item = NodeAddress>>(banned: I) -> Self {
        BanList { banned: RwLock::new(banned.into_iter().collect()) }
    }

    pub fn add(&self, address: NodeAddress) {
        self.banned.write().insert(address);
    }

    pub fn remove(&self, address: &NodeAddress) {
        self.banned.write().remove(address);
    }

    pub fn len(&self) -> usize {
        self.banned.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.banned.read().is_empty()
    }
}

impl BanFilter for BanList {
    fn is_banned(&self, address: &NodeAddress) -> bool {
        self.banned.read().contains(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ban_and_unban() {
        let banned = NodeAddress::new("3a5dkb7xlb4n5rfe.onion", 9999);
        let list = BanList::new(vec![banned.clone()]);
        assert!(list.is_banned(&banned));
        assert!(!list.is_banned(&NodeAddress::localhost(9999)));

        list.remove(&banned);
        assert!(!list.is_banned(&banned));
        assert!(list.is_empty());

        list.add(NodeAddress::localhost(9999));
        assert!(list.is_banned(&NodeAddress::localhost(9999)));
        assert_eq!(list.len(), 1);
    }
}
