//! Host address and attachment types.

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::topology::{NodeId, PortId, Termination};

/// Ethernet address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress {
    bytes: [u8; 6],
}

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(format!("Invalid MAC address format: {}", s));
        }
        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| format!("Invalid hex in MAC: {}", part))?;
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// A host address tracked by the attachment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostAddress {
    Ipv4(Ipv4Addr),
    Mac(MacAddress),
}

impl HostAddress {
    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            HostAddress::Ipv4(ip) => Some(*ip),
            HostAddress::Mac(_) => None,
        }
    }
}

impl From<Ipv4Addr> for HostAddress {
    fn from(ip: Ipv4Addr) -> Self {
        HostAddress::Ipv4(ip)
    }
}

impl From<MacAddress> for HostAddress {
    fn from(mac: MacAddress) -> Self {
        HostAddress::Mac(mac)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostAddress::Ipv4(ip) => write!(f, "{}", ip),
            HostAddress::Mac(mac) => write!(f, "{}", mac),
        }
    }
}

/// The switch port through which a host is reachable.
pub type AttachmentPoint = Termination;

/// Current attachment of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub address: HostAddress,
    pub point: AttachmentPoint,
    pub since: DateTime<Utc>,
}

impl AttachmentRecord {
    pub fn new(address: HostAddress, point: AttachmentPoint) -> Self {
        Self {
            address,
            point,
            since: Utc::now(),
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.point.node
    }

    pub fn port(&self) -> &PortId {
        &self.point.port
    }
}
