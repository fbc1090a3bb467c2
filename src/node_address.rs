use crate::{Error, Result};

use std::str::FromStr;

/// The identity of a peer on the network: a host name (usually an onion address) and a port.
#[derive(
    Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize, derive_more::Display,
)]
#[display(fmt = "{}:{}", host_name, port)]
pub struct NodeAddress {
    host_name: String,
    port: u16,
}

impl NodeAddress {
    pub fn new<S: Into<String>>(host_name: S, port: u16) -> Self {
        NodeAddress { host_name: host_name.into(), port }
    }

    /// A loopback address, as used by the localhost transport.
    pub fn localhost(port: u16) -> Self {
        NodeAddress::new("localhost", port)
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The address in the form `host:port`.
    pub fn full_address(&self) -> String {
        format!("{}:{}", self.host_name, self.port)
    }

    pub fn is_onion(&self) -> bool {
        self.host_name.ends_with(".onion")
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    /// Parses an address of the form `host:port`.
    fn from_str(s: &str) -> Result<NodeAddress> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| Error::AddressParse(s.to_string()))?;
        if host.is_empty() {
            return Err(Error::AddressParse(s.to_string()));
        }
        let port: u16 = port.parse().map_err(|_| Error::AddressParse(s.to_string()))?;
        Ok(NodeAddress::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_address() {
        let address: NodeAddress = "3a5dkb7xlb4n5rfe.onion:9999".parse().unwrap();
        assert_eq!(address.host_name(), "3a5dkb7xlb4n5rfe.onion");
        assert_eq!(address.port(), 9999);
        assert!(address.is_onion());
        assert_eq!(address.full_address(), "3a5dkb7xlb4n5rfe.onion:9999");
        assert_eq!(format!("{}", address), address.full_address());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("localhost".parse::<NodeAddress>().is_err());
        assert!(":2002".parse::<NodeAddress>().is_err());
        assert!("localhost:port".parse::<NodeAddress>().is_err());
        assert!("localhost:70000".parse::<NodeAddress>().is_err());
    }

    #[test]
    fn test_localhost_is_not_onion() {
        let address = NodeAddress::localhost(2002);
        assert!(!address.is_onion());
        assert_eq!(address, "localhost:2002".parse().unwrap());
    }
}
