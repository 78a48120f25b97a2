//! Link inventory and debounced topology rebuilds.

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::graph::TopologyGraph;
use super::types::{Link, LinkId};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;

/// Every link currently reported by the transport, host links included.
#[derive(Debug, Default)]
pub struct LinkInventory {
    links: BTreeMap<LinkId, Link>,
}

impl LinkInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a link. Returns true if the id was not known yet.
    pub fn insert(&mut self, link: Link) -> bool {
        self.links.insert(link.id.clone(), link).is_none()
    }

    /// Forgets a link. Returns true if it was known.
    pub fn remove(&mut self, id: &LinkId) -> bool {
        self.links.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Switch-to-switch links, the input of a graph rebuild.
    pub fn switch_links(&self) -> Vec<Link> {
        self.links
            .values()
            .filter(|l| !l.is_host_link())
            .cloned()
            .collect()
    }
}

/// Coalesces bursts of link changes into one graph rebuild.
///
/// The first [`schedule`](Self::schedule) call sets the pending flag and
/// spawns a task that waits out the debounce window, clears the flag and
/// rebuilds the graph from the inventory. Calls made while the flag is set
/// are merged into that rebuild.
pub struct TopologyRefresher {
    graph: Arc<TopologyGraph>,
    inventory: Arc<RwLock<LinkInventory>>,
    delay: Duration,
    pending: Arc<AtomicBool>,
}

impl TopologyRefresher {
    pub fn new(
        graph: Arc<TopologyGraph>,
        inventory: Arc<RwLock<LinkInventory>>,
        delay: Duration,
    ) -> Self {
        Self {
            graph,
            inventory,
            delay,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns true while a rebuild is scheduled but has not started.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Schedules a rebuild. Returns false if one was already pending.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self) -> bool {
        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("TopologyRefresher: Rebuild already pending, merging trigger");
            return false;
        }

        let graph = Arc::clone(&self.graph);
        let inventory = Arc::clone(&self.inventory);
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;

        debug!("TopologyRefresher: Rebuild scheduled in {:?}", delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.store(false, Ordering::Release);
            rebuild(&graph, &inventory);
        });
        true
    }

    /// Rebuilds immediately, bypassing the debounce window.
    pub fn refresh_now(&self) -> usize {
        rebuild(&self.graph, &self.inventory)
    }
}

fn rebuild(graph: &TopologyGraph, inventory: &RwLock<LinkInventory>) -> usize {
    let links = inventory.read().switch_links();
    let added = graph.rebuild(&links);
    let (directed, undirected) = graph.edge_counts();

    info!(
        "TopologyRefresher: Rebuilt graph with {} nodes, {} links ({} connections)",
        graph.node_count(),
        directed,
        undirected
    );
    audit_log!(AuditRecord::new(AuditCategory::Topology, "TopologyRefresher", "rebuild_graph")
        .with_outcome(AuditOutcome::Success)
        .with_object_type("topology_graph")
        .with_details(serde_json::json!({
            "nodes": graph.node_count(),
            "directed_links": directed,
            "connections": undirected,
        })));
    added
}
