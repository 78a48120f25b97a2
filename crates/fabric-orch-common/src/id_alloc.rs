//! Monotonic identifier allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing ids starting at a base value.
///
/// Used for flow cookies, flow-id suffixes, group ids and bucket ids. Ids
/// are never handed out twice for the lifetime of the allocator, and
/// allocation is safe from any number of concurrent installer tasks.
#[derive(Debug)]
pub struct IdAllocator {
    base: u64,
    next: AtomicU64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is `base`.
    pub fn new(base: u64) -> Self {
        Self {
            base,
            next: AtomicU64::new(base),
        }
    }

    /// Returns the next id.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the id the next call to [`next_id`](Self::next_id) would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Returns how many ids have been handed out.
    pub fn allocated(&self) -> u64 {
        self.peek() - self.base
    }
}
