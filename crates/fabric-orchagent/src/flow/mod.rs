//! Forwarding state: flow and group types, the switch transport contract,
//! per-hop orientation, per-switch group bookkeeping and the writer that
//! ties them together.

mod group;
mod hop;
mod transport;
mod types;
mod writer;

pub use group::{GroupChange, GroupError, GroupTable};
pub use hop::{orient_path, path_end, Hop, HopError};
pub use transport::{SwitchTransport, TransportError};
pub use types::{
    Bucket, BucketId, FlowAction, FlowMatch, FlowProfile, FlowSpec, GroupId, GroupSpec, GroupType,
    ETH_TYPE_IPV4, IP_PROTO_ICMP, IP_PROTO_UDP,
};
pub use writer::{
    ForwardingStateWriter, HostEndpoint, InstallReport, WriterConfig, FLOW_COOKIE_BASE,
    TABLE_MISS_COOKIE_BASE,
};
