//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for all orchestration agents.
///
/// Each Orch owns one [`Consumer`](crate::Consumer) of controller events and
/// participates in the daemon event loop. The daemon queues events on the
/// Orch and then calls [`Orch::do_task`] for every Orch with pending work,
/// lowest priority value first.
///
/// # Thread Safety
///
/// Orch implementations must be `Send + Sync`: shared state (topology graph,
/// attachment table, group tables) is reached through `Arc`s that installer
/// tasks hold concurrently with the daemon.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes every event pending on this Orch's consumer.
    async fn do_task(&mut self);

    /// Returns the priority of this Orch (lower = processed earlier).
    fn priority(&self) -> i32 {
        0
    }

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}
