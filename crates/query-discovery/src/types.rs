//! Core types for cluster discovery

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of this process in discovery clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Full UUID, used as the member's child name
    pub fn child_name(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", &self.0.to_string()[..8])
    }
}

/// Network address of a cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a raw node payload
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| DiscoveryError::parse(String::from_utf8_lossy(payload), e.to_string()))?;
        text.parse()
    }

    /// Payload stored under a member's node
    pub fn to_payload(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DiscoveryError::parse(s, "expected host:port"))?;
        if host.is_empty() {
            return Err(DiscoveryError::parse(s, "empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| DiscoveryError::parse(s, format!("invalid port: {}", e)))?;
        Ok(Self::new(host, port))
    }
}

/// What is known about one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: NodeAddress,
}

impl NodeInfo {
    pub fn new(address: NodeAddress) -> Self {
        Self { address }
    }
}

/// Members of one cluster keyed by child name
pub type NodesInfo = HashMap<String, NodeInfo>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new();
        let display = id.to_string();
        assert!(display.starts_with("node-"));
        assert_eq!(display.len(), 13);
        assert_eq!(id.child_name().len(), 36);
    }

    #[test]
    fn test_address_parse() {
        let addr: NodeAddress = "h1:9000".parse().unwrap();
        assert_eq!(addr, NodeAddress::new("h1", 9000));
        assert_eq!(addr.to_string(), "h1:9000");

        // IPv6 hosts keep their colons
        let addr: NodeAddress = "::1:9000".parse().unwrap();
        assert_eq!(addr.host, "::1");
    }

    #[test]
    fn test_address_parse_errors() {
        for bad in ["h1", ":9000", "h1:port", "h1:70000", ""] {
            assert!(
                matches!(bad.parse::<NodeAddress>(), Err(DiscoveryError::Parse { .. })),
                "{:?} should not parse",
                bad
            );
        }
        assert!(NodeAddress::from_payload(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_payload_round_trip() {
        let addr = NodeAddress::new("replica-2.local", 9440);
        assert_eq!(NodeAddress::from_payload(&addr.to_payload()).unwrap(), addr);
    }
}
