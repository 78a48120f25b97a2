//! Switch/link topology: the routing graph, the link inventory and the
//! orch that keeps both in sync with transport reports.

mod graph;
mod orch;
mod refresh;
mod types;

pub use graph::TopologyGraph;
pub use orch::{
    TopologyEvent, TopologyOrch, TopologyOrchCallbacks, TopologyOrchConfig, TopologyOrchStats,
};
pub use refresh::{LinkInventory, TopologyRefresher};
pub use types::{EdgeKey, Link, LinkId, NodeId, PortId, Termination};
