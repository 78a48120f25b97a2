//! Route request types and packet-in classification.

use fabric_orch_common::{Operation, SyncEvent};
use std::fmt;
use std::net::Ipv4Addr;

use crate::flow::{HostEndpoint, IP_PROTO_ICMP};
use crate::host::{HostAddress, MacAddress};
use crate::topology::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Unicast,
    Multicast,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::Unicast => write!(f, "unicast"),
            RouteKind::Multicast => write!(f, "multicast"),
        }
    }
}

/// A request to install forwarding state between two hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRequest {
    Unicast { src: HostEndpoint, dst: HostEndpoint },
    /// Carry mDNS traffic between a multicast source and one consumer.
    Multicast { source: Ipv4Addr, consumer: Ipv4Addr },
}

impl RouteRequest {
    pub fn kind(&self) -> RouteKind {
        match self {
            RouteRequest::Unicast { .. } => RouteKind::Unicast,
            RouteRequest::Multicast { .. } => RouteKind::Multicast,
        }
    }

    fn endpoints(&self) -> (Ipv4Addr, Ipv4Addr) {
        match self {
            RouteRequest::Unicast { src, dst } => (src.ip, dst.ip),
            RouteRequest::Multicast { source, consumer } => (*source, *consumer),
        }
    }
}

impl fmt::Display for RouteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src, dst) = self.endpoints();
        write!(f, "{} {}->{}", self.kind(), src, dst)
    }
}

impl SyncEvent for RouteRequest {
    fn key(&self) -> String {
        let (src, dst) = self.endpoints();
        format!("route:{}:{}->{}", self.kind(), src, dst)
    }

    fn op(&self) -> Operation {
        Operation::Set
    }
}

/// Reasons a route request did not fully install.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("host {0} has no attachment point")]
    HostUnresolved(HostAddress),

    #[error("no path from {src} to {dst}")]
    PathUnreachable { src: NodeId, dst: NodeId },

    /// Some writes failed; the ones that succeeded stay installed.
    #[error("{failed_writes} forwarding writes failed")]
    PartialInstall { failed_writes: usize },
}

pub type Result<T> = std::result::Result<T, RouteError>;

/// Header fields of a packet punted to the controller, already decoded by
/// the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIn {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_mac: MacAddress,
    pub dst_mac: MacAddress,
    pub protocol: u8,
}

impl PacketIn {
    /// Unicast route request for this packet's flow, or None for mDNS
    /// traffic to `multicast_address` and for ICMP.
    pub fn classify(&self, multicast_address: Ipv4Addr) -> Option<RouteRequest> {
        if self.dst_ip == multicast_address || self.protocol == IP_PROTO_ICMP {
            return None;
        }
        Some(RouteRequest::Unicast {
            src: HostEndpoint::new(self.src_ip, self.src_mac),
            dst: HostEndpoint::new(self.dst_ip, self.dst_mac),
        })
    }
}
