//! Keyed event queue feeding an Orch.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

/// Operation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Add or refresh an object
    Set,
    /// Withdraw an object
    Del,
}

impl Operation {
    /// Returns true if this is a Set operation.
    pub fn is_set(&self) -> bool {
        matches!(self, Operation::Set)
    }

    /// Returns true if this is a Del operation.
    pub fn is_del(&self) -> bool {
        matches!(self, Operation::Del)
    }
}

/// An event that can be queued on a [`Consumer`].
///
/// Events with the same key describe the same object (a link, a host
/// address, a route between two endpoints) and are coalesced.
pub trait SyncEvent {
    /// Coalescing key (e.g. `link:openflow:1:2`).
    fn key(&self) -> String;

    /// Whether the event adds or withdraws the keyed object.
    fn op(&self) -> Operation;
}

/// Configuration for a Consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue name used in logs (e.g. "LINK_EVENTS")
    pub table_name: String,
    /// Priority (lower = higher priority)
    pub priority: i32,
}

impl ConsumerConfig {
    /// Creates a new consumer config.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            priority: 0,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Coalescing queue of controller events.
///
/// # Deduplication Logic
///
/// When several events arrive for the same key before the Orch drains:
/// - DEL drops every pending event for the key and is queued alone
/// - SET behind a pending SET is dropped (the first report wins)
/// - SET behind a DEL is queued (withdraw, then re-add)
pub struct Consumer<T> {
    config: ConsumerConfig,
    to_sync: BTreeMap<String, VecDeque<T>>,
    pending_count: usize,
}

impl<T: SyncEvent> Consumer<T> {
    /// Creates a new consumer with the given configuration.
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            to_sync: BTreeMap::new(),
            pending_count: 0,
        }
    }

    /// Returns the priority.
    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    /// Returns true if there are pending events.
    pub fn has_pending(&self) -> bool {
        self.pending_count > 0
    }

    /// Queues one event, coalescing with what is pending for its key.
    pub fn push(&mut self, event: T) {
        let queue = self.to_sync.entry(event.key()).or_default();

        match event.op() {
            Operation::Del => {
                self.pending_count -= queue.len();
                queue.clear();
                queue.push_back(event);
                self.pending_count += 1;
            }
            Operation::Set => {
                if queue.back().is_some_and(|last| last.op().is_set()) {
                    return;
                }
                queue.push_back(event);
                self.pending_count += 1;
            }
        }
    }

    /// Drains all pending events, grouped by key in key order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.pending_count);

        for (_key, queue) in std::mem::take(&mut self.to_sync) {
            result.extend(queue);
        }

        self.pending_count = 0;
        result
    }
}

impl<T: SyncEvent + Debug> Consumer<T> {
    /// Dumps pending events for debugging.
    pub fn dump(&self) -> Vec<String> {
        self.to_sync
            .iter()
            .flat_map(|(key, queue)| {
                queue.iter().map(move |e| {
                    format!(
                        "{} {}: {} {:?}",
                        self.config.table_name,
                        key,
                        if e.op().is_set() { "SET" } else { "DEL" },
                        e
                    )
                })
            })
            .collect()
    }
}
