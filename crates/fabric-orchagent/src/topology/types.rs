//! Topology identifiers and link types.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Stable switch identifier (e.g. `openflow:1`).
    NodeId
);

string_id!(
    /// Port identifier, unique across the fabric (e.g. `openflow:1:2`).
    PortId
);

string_id!(
    /// Identifier of a directed link as reported by the transport.
    LinkId
);

impl NodeId {
    /// Returns true for switches managed over OpenFlow.
    pub fn is_openflow(&self) -> bool {
        self.0.starts_with("openflow:")
    }
}

/// One end of a link: a switch and one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Termination {
    pub node: NodeId,
    pub port: PortId,
}

impl Termination {
    pub fn new(node: impl Into<NodeId>, port: impl Into<PortId>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

/// A directed link between two switch ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: Termination,
    pub destination: Termination,
}

impl Link {
    pub fn new(id: impl Into<LinkId>, source: Termination, destination: Termination) -> Self {
        Self {
            id: id.into(),
            source,
            destination,
        }
    }

    /// Links into end hosts carry `host` in their id and never enter the
    /// routing graph.
    pub fn is_host_link(&self) -> bool {
        self.id.as_str().contains("host")
    }

    /// Order-independent key of the physical connection.
    pub fn edge_key(&self) -> EdgeKey {
        EdgeKey::new(&self.source.port, &self.destination.port)
    }

    /// Returns the termination on the far side of `node`, if the link touches it.
    pub fn far_end(&self, node: &NodeId) -> Option<&Termination> {
        if &self.source.node == node {
            Some(&self.destination)
        } else if &self.destination.node == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.source.port, self.destination.port, self.id
        )
    }
}

/// Undirected edge key: the two port ids, smaller first.
///
/// Ordering is lexicographic on the port id strings so the same physical
/// connection always yields the same key, whichever direction was reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    low: PortId,
    high: PortId,
}

impl EdgeKey {
    pub fn new(a: &PortId, b: &PortId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.low, self.high)
    }
}
