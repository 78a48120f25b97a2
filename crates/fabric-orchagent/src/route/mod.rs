//! Route orchestration: turns route requests into forwarding state along
//! the shortest path between two attached hosts.

mod orch;
mod types;

pub use orch::{RouteOrch, RouteOrchCallbacks, RouteOrchStats};
pub use types::{PacketIn, Result, RouteError, RouteKind, RouteRequest};
