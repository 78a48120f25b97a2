//! Flow and group value types handed to the switch transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::host::MacAddress;
use crate::topology::{NodeId, PortId};

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_UDP: u8 = 17;

pub type GroupId = u32;
pub type BucketId = u32;

/// Priority and timeouts shared by one class of rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowProfile {
    pub priority: u16,
    /// Seconds without a matching packet before the switch drops the rule.
    pub idle_timeout: u16,
    /// Seconds after install before the switch drops the rule.
    pub hard_timeout: u16,
}

impl FlowProfile {
    pub const fn new(priority: u16, idle_timeout: u16, hard_timeout: u16) -> Self {
        Self {
            priority,
            idle_timeout,
            hard_timeout,
        }
    }
}

impl Default for FlowProfile {
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}

/// Match fields. Unset fields are wildcards; IPv4 fields match a /32.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub eth_type: Option<u16>,
    pub eth_dst: Option<MacAddress>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub ip_proto: Option<u8>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
}

impl FlowMatch {
    /// Matches every packet.
    pub fn any() -> Self {
        Self::default()
    }

    /// IPv4 traffic addressed to one host.
    pub fn unicast_to(ip: Ipv4Addr, mac: MacAddress) -> Self {
        Self {
            eth_type: Some(ETH_TYPE_IPV4),
            eth_dst: Some(mac),
            ipv4_dst: Some(ip),
            ..Self::default()
        }
    }

    /// UDP datagrams from `src` to `dst` with both ports equal to `port`.
    pub fn udp_between(src: Ipv4Addr, dst: Ipv4Addr, port: u16) -> Self {
        Self {
            eth_type: Some(ETH_TYPE_IPV4),
            ipv4_src: Some(src),
            ipv4_dst: Some(dst),
            ip_proto: Some(IP_PROTO_UDP),
            udp_src: Some(port),
            udp_dst: Some(port),
            ..Self::default()
        }
    }

    pub fn is_any(&self) -> bool {
        self == &Self::default()
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return write!(f, "*");
        }
        let mut fields = Vec::new();
        if let Some(t) = self.eth_type {
            fields.push(format!("eth_type=0x{:04x}", t));
        }
        if let Some(mac) = &self.eth_dst {
            fields.push(format!("eth_dst={}", mac));
        }
        if let Some(ip) = self.ipv4_src {
            fields.push(format!("ipv4_src={}/32", ip));
        }
        if let Some(ip) = self.ipv4_dst {
            fields.push(format!("ipv4_dst={}/32", ip));
        }
        if let Some(p) = self.ip_proto {
            fields.push(format!("ip_proto={}", p));
        }
        if let Some(p) = self.udp_src {
            fields.push(format!("udp_src={}", p));
        }
        if let Some(p) = self.udp_dst {
            fields.push(format!("udp_dst={}", p));
        }
        write!(f, "{}", fields.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlowAction {
    Output(PortId),
    Controller,
    Group(GroupId),
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Output(port) => write!(f, "output:{}", port),
            FlowAction::Controller => write!(f, "output:CONTROLLER"),
            FlowAction::Group(id) => write!(f, "group:{}", id),
        }
    }
}

/// A rule to install on one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSpec {
    pub node: NodeId,
    pub table_id: u8,
    pub flow_id: String,
    pub flow_match: FlowMatch,
    pub action: FlowAction,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub cookie: u64,
}

impl fmt::Display for FlowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} [{}] -> {} prio={} idle={} hard={}",
            self.node,
            self.flow_id,
            self.flow_match,
            self.action,
            self.priority,
            self.idle_timeout,
            self.hard_timeout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupType {
    /// Every bucket receives a copy.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub id: BucketId,
    pub port: PortId,
}

/// A fan-out group on one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpec {
    pub node: NodeId,
    pub group_id: GroupId,
    pub group_type: GroupType,
    pub buckets: Vec<Bucket>,
}

impl GroupSpec {
    pub fn new(node: NodeId, group_id: GroupId, buckets: Vec<Bucket>) -> Self {
        Self {
            node,
            group_id,
            group_type: GroupType::All,
            buckets,
        }
    }

    pub fn has_port(&self, port: &PortId) -> bool {
        self.buckets.iter().any(|b| &b.port == port)
    }

    /// Egress ports in bucket order.
    pub fn ports(&self) -> Vec<PortId> {
        self.buckets.iter().map(|b| b.port.clone()).collect()
    }

    /// Copy of this group with `bucket` appended, same group id.
    pub fn with_bucket(&self, bucket: Bucket) -> Self {
        let mut updated = self.clone();
        updated.buckets.push(bucket);
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_display() {
        let m = FlowMatch::unicast_to(Ipv4Addr::new(10, 0, 0, 2), MacAddress::new([0, 0, 0, 0, 0, 2]));
        assert_eq!(
            m.to_string(),
            "eth_type=0x0800,eth_dst=00:00:00:00:00:02,ipv4_dst=10.0.0.2/32"
        );
        assert_eq!(FlowMatch::any().to_string(), "*");
    }

    #[test]
    fn test_udp_match() {
        let m = FlowMatch::udp_between(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(224, 0, 0, 251), 5353);
        assert_eq!(m.ip_proto, Some(IP_PROTO_UDP));
        assert_eq!(m.udp_src, Some(5353));
        assert_eq!(m.udp_dst, Some(5353));
        assert!(!m.is_any());
    }

    #[test]
    fn test_group_with_bucket_keeps_id() {
        let group = GroupSpec::new(
            NodeId::from("openflow:1"),
            7,
            vec![Bucket { id: 1, port: PortId::from("openflow:1:1") }],
        );
        let updated = group.with_bucket(Bucket { id: 2, port: PortId::from("openflow:1:2") });

        assert_eq!(updated.group_id, 7);
        assert_eq!(updated.group_type, GroupType::All);
        assert_eq!(updated.ports(), vec![PortId::from("openflow:1:1"), PortId::from("openflow:1:2")]);
        assert!(updated.has_port(&PortId::from("openflow:1:2")));
        assert!(!group.has_port(&PortId::from("openflow:1:2")));
    }
}
