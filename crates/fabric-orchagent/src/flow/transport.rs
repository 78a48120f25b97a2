//! Contract with the switch transport.

use async_trait::async_trait;

use super::types::{FlowSpec, GroupId, GroupSpec};
use crate::topology::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{node} rejected write: {reason}")]
    Rejected { node: NodeId, reason: String },

    #[error("{0} is disconnected")]
    Disconnected(NodeId),

    #[error("write to {0} timed out")]
    Timeout(NodeId),
}

/// Executes forwarding-state writes on switches.
///
/// Calls return once the write has been handed to the switch session; they
/// do not wait for the switch to acknowledge it. An error means the write
/// could not be submitted at all.
#[async_trait]
pub trait SwitchTransport: Send + Sync {
    async fn install_flow(&self, flow: &FlowSpec) -> Result<(), TransportError>;

    async fn install_group(&self, group: &GroupSpec) -> Result<(), TransportError>;

    /// Replaces the buckets of an installed group in place.
    async fn update_group(
        &self,
        original: &GroupSpec,
        updated: &GroupSpec,
    ) -> Result<(), TransportError>;

    async fn remove_group(&self, node: &NodeId, group_id: GroupId) -> Result<(), TransportError>;
}
