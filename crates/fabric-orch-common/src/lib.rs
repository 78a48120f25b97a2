//! Common orchestration abstractions for the fabric controller.
//!
//! Every orchestration module of the controller is built from the same
//! small set of pieces:
//!
//! - [`Orch`]: Base trait for orchestration agents driven by the daemon loop
//! - [`Consumer`]: Keyed, coalescing queue of inbound controller events
//! - [`SyncMap`]: Map that never creates entries implicitly, with ref counting
//! - [`IdAllocator`]: Monotonic allocator for cookies, group and bucket ids
//!
//! # Architecture
//!
//! 1. The transport layer reports switches, links, addresses and packet-ins
//! 2. The daemon turns each report into an event and queues it on the
//!    [`Consumer`] of the owning Orch
//! 3. On every pass the daemon runs `do_task()` on each Orch in priority order
//! 4. Orchs translate pending events into forwarding-state writes
//!
//! # Example
//!
//! ```ignore
//! use fabric_orch_common::{Consumer, ConsumerConfig, Operation, Orch};
//!
//! struct LinkOrch {
//!     consumer: Consumer<LinkEvent>,
//! }
//!
//! #[async_trait]
//! impl Orch for LinkOrch {
//!     fn name(&self) -> &str { "LinkOrch" }
//!
//!     async fn do_task(&mut self) {
//!         for event in self.consumer.drain() {
//!             match event.op() {
//!                 Operation::Set => self.add(event),
//!                 Operation::Del => self.remove(event),
//!             }
//!         }
//!     }
//! }
//! ```

mod consumer;
mod id_alloc;
mod orch;
mod sync_map;

pub use consumer::{Consumer, ConsumerConfig, Operation, SyncEvent};
pub use id_alloc::IdAllocator;
pub use orch::Orch;
pub use sync_map::{HasRefCount, SyncMap, SyncMapError};
