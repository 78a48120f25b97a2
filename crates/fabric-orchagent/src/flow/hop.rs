//! Per-hop orientation of a path.
//!
//! Paths come out of the undirected routing view, so each link is in
//! whatever direction it was first reported. Walking the path from its
//! start switch and tracking the switch the next link must leave from
//! recovers, for every hop, the egress port on the switch being left and
//! the ingress port on the switch being entered.

use crate::topology::{Link, LinkId, NodeId, Termination};

/// One oriented hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Port on the switch being left.
    pub egress: Termination,
    /// Port on the switch being entered.
    pub ingress: Termination,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HopError {
    #[error("link {link} does not touch {expected}")]
    Discontinuous { expected: NodeId, link: LinkId },
}

/// Orients every link of `path`, starting at `start`.
///
/// A link that touches neither side of the expected switch yields an error
/// for that hop only; the walk then continues from that link's destination.
pub fn orient_path(start: &NodeId, path: &[Link]) -> Vec<Result<Hop, HopError>> {
    let mut expected = start.clone();
    let mut hops = Vec::with_capacity(path.len());

    for link in path {
        if link.source.node == expected {
            expected = link.destination.node.clone();
            hops.push(Ok(Hop {
                egress: link.source.clone(),
                ingress: link.destination.clone(),
            }));
        } else if link.destination.node == expected {
            expected = link.source.node.clone();
            hops.push(Ok(Hop {
                egress: link.destination.clone(),
                ingress: link.source.clone(),
            }));
        } else {
            hops.push(Err(HopError::Discontinuous {
                expected: expected.clone(),
                link: link.id.clone(),
            }));
            expected = link.destination.node.clone();
        }
    }

    hops
}

/// Switch the walk of `path` from `start` ends on.
pub fn path_end(start: &NodeId, path: &[Link]) -> NodeId {
    path.iter().fold(start.clone(), |expected, link| {
        match link.far_end(&expected) {
            Some(far) => far.node.clone(),
            None => link.destination.node.clone(),
        }
    })
}
