//! Fabric controller core
//!
//! Control plane of an SDN fabric that discovers devices over mDNS and
//! steers their traffic through OpenFlow switches. It keeps a live graph of
//! switches and inter-switch links, tracks where every host attaches, and
//! turns unicast and multicast route requests into per-switch flows and
//! fan-out groups.
//!
//! # Architecture
//!
//! ```text
//! [transport] ──events──> [FabricDaemon] ──> TopologyOrch ──> TopologyGraph
//!                               │         ──> HostOrch     ──> AttachmentTable
//!                               │         ──> RouteOrch    ──> ForwardingStateWriter ──> [transport]
//!                               ↓
//!                        notifications
//! ```
//!
//! # Key Components
//!
//! - [`topology`]: the routing graph, with deduplicated links and shortest paths
//! - [`host`]: host address to switch port attachment table
//! - [`flow`]: hop orientation, flow rules and multicast group reconciliation
//! - [`route`]: path resolution for unicast and multicast requests
//! - [`daemon::FabricDaemon`]: event loop and orch coordination
//!
//! # Feature Flags
//!
//! - `full` (default): everything
//! - `mod-daemon`: the event loop and the `fabricorch` binary

pub mod audit;
pub mod config;
pub mod flow;
pub mod host;
pub mod route;
pub mod topology;

#[cfg(feature = "mod-daemon")]
pub mod daemon;

// Re-export commonly used types (always available)
pub use fabric_orch_common::{Consumer, ConsumerConfig, Operation, Orch, SyncMap};

pub use config::{ConfigError, FabricConfig};

pub use flow::{
    ForwardingStateWriter, GroupChange, GroupError, GroupTable, HostEndpoint, InstallReport,
    SwitchTransport, TransportError, WriterConfig,
};

pub use host::{
    AttachOutcome, AttachmentPoint, AttachmentTable, HostAddress, HostEventSink, HostOrch,
    MacAddress,
};

pub use route::{PacketIn, RouteError, RouteOrch, RouteOrchCallbacks, RouteRequest};

pub use topology::{Link, LinkId, NodeId, PortId, Termination, TopologyGraph, TopologyOrch};

#[cfg(feature = "mod-daemon")]
pub use daemon::{ControllerEvent, FabricDaemon, FabricNotification};
