//! TopologyOrch implementation.
//!
//! Consumes switch and link reports, keeps the link inventory current and
//! schedules debounced rebuilds of the routing graph.

use async_trait::async_trait;
use fabric_orch_common::{Consumer, ConsumerConfig, Operation, Orch, SyncEvent};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::graph::TopologyGraph;
use super::refresh::{LinkInventory, TopologyRefresher};
use super::types::{Link, NodeId};

/// Switch and link reports from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TopologyEvent {
    SwitchAdded(NodeId),
    LinkAdded(Link),
    LinkRemoved(Link),
}

impl SyncEvent for TopologyEvent {
    fn key(&self) -> String {
        match self {
            TopologyEvent::SwitchAdded(node) => format!("switch:{}", node),
            TopologyEvent::LinkAdded(link) | TopologyEvent::LinkRemoved(link) => {
                format!("link:{}", link.id)
            }
        }
    }

    fn op(&self) -> Operation {
        match self {
            TopologyEvent::SwitchAdded(_) | TopologyEvent::LinkAdded(_) => Operation::Set,
            TopologyEvent::LinkRemoved(_) => Operation::Del,
        }
    }
}

/// Configuration for TopologyOrch.
#[derive(Debug, Clone)]
pub struct TopologyOrchConfig {
    /// Debounce window between a link change and the graph rebuild.
    pub refresh_delay: Duration,
}

impl Default for TopologyOrchConfig {
    fn default() -> Self {
        Self {
            refresh_delay: Duration::from_millis(1000),
        }
    }
}

/// Callbacks for TopologyOrch to reach the forwarding layer.
#[async_trait]
pub trait TopologyOrchCallbacks: Send + Sync {
    /// Called once per switch, on its first report.
    async fn on_switch_added(&self, node: &NodeId);
}

#[derive(Debug, Clone, Default)]
pub struct TopologyOrchStats {
    pub switches_added: u64,
    pub links_added: u64,
    pub links_removed: u64,
    pub host_links_seen: u64,
    pub rebuilds_scheduled: u64,
}

pub struct TopologyOrch {
    consumer: Consumer<TopologyEvent>,
    graph: Arc<TopologyGraph>,
    inventory: Arc<RwLock<LinkInventory>>,
    refresher: TopologyRefresher,
    switches: BTreeSet<NodeId>,
    callbacks: Option<Arc<dyn TopologyOrchCallbacks>>,
    stats: TopologyOrchStats,
}

impl TopologyOrch {
    pub fn new(config: TopologyOrchConfig, graph: Arc<TopologyGraph>) -> Self {
        let inventory = Arc::new(RwLock::new(LinkInventory::new()));
        let refresher = TopologyRefresher::new(
            Arc::clone(&graph),
            Arc::clone(&inventory),
            config.refresh_delay,
        );
        Self {
            consumer: Consumer::new(ConsumerConfig::new("TOPOLOGY_EVENTS")),
            graph,
            inventory,
            refresher,
            switches: BTreeSet::new(),
            callbacks: None,
            stats: TopologyOrchStats::default(),
        }
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn TopologyOrchCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    /// Queues a report for the next `do_task` pass.
    pub fn enqueue(&mut self, event: TopologyEvent) {
        self.consumer.push(event);
    }

    pub fn graph(&self) -> &Arc<TopologyGraph> {
        &self.graph
    }

    pub fn refresher(&self) -> &TopologyRefresher {
        &self.refresher
    }

    pub fn switch_count(&self) -> usize {
        self.switches.len()
    }

    pub fn link_count(&self) -> usize {
        self.inventory.read().len()
    }

    pub fn stats(&self) -> &TopologyOrchStats {
        &self.stats
    }

    async fn add_switch(&mut self, node: NodeId) {
        if !self.switches.insert(node.clone()) {
            debug!("TopologyOrch: Switch {} already known", node);
            return;
        }
        info!("TopologyOrch: Switch {} added", node);
        self.stats.switches_added += 1;
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_switch_added(&node).await;
        }
    }

    /// Returns true if the change affects the routing graph.
    fn add_link(&mut self, link: Link) -> bool {
        let host_link = link.is_host_link();
        if !self.inventory.write().insert(link.clone()) {
            debug!("TopologyOrch: Link {} already known", link.id);
            return false;
        }
        self.stats.links_added += 1;
        if host_link {
            self.stats.host_links_seen += 1;
            debug!("TopologyOrch: Host link {} recorded", link.id);
            return false;
        }
        debug!("TopologyOrch: Link {} added", link);
        true
    }

    fn remove_link(&mut self, link: Link) -> bool {
        if !self.inventory.write().remove(&link.id) {
            debug!("TopologyOrch: Link {} not known, ignoring removal", link.id);
            return false;
        }
        self.stats.links_removed += 1;
        debug!("TopologyOrch: Link {} removed", link);
        !link.is_host_link()
    }
}

#[async_trait]
impl Orch for TopologyOrch {
    fn name(&self) -> &str {
        "TopologyOrch"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn do_task(&mut self) {
        let mut topology_changed = false;

        for event in self.consumer.drain() {
            match event {
                TopologyEvent::SwitchAdded(node) => self.add_switch(node).await,
                TopologyEvent::LinkAdded(link) => topology_changed |= self.add_link(link),
                TopologyEvent::LinkRemoved(link) => topology_changed |= self.remove_link(link),
            }
        }

        if topology_changed && self.refresher.schedule() {
            self.stats.rebuilds_scheduled += 1;
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::Termination;
    use std::sync::Mutex;

    struct TestCallbacks {
        switches: Mutex<Vec<NodeId>>,
    }

    #[async_trait]
    impl TopologyOrchCallbacks for TestCallbacks {
        async fn on_switch_added(&self, node: &NodeId) {
            self.switches.lock().unwrap().push(node.clone());
        }
    }

    fn link(a: u32, a_port: u32, b: u32, b_port: u32) -> Link {
        Link::new(
            format!("openflow:{}:{}", a, a_port),
            Termination::new(format!("openflow:{}", a), format!("openflow:{}:{}", a, a_port)),
            Termination::new(format!("openflow:{}", b), format!("openflow:{}:{}", b, b_port)),
        )
    }

    fn orch() -> TopologyOrch {
        TopologyOrch::new(
            TopologyOrchConfig {
                refresh_delay: Duration::from_millis(10),
            },
            Arc::new(TopologyGraph::new()),
        )
    }

    #[test]
    fn test_event_keys() {
        let l = link(1, 2, 2, 1);
        assert_eq!(TopologyEvent::LinkAdded(l.clone()).key(), "link:openflow:1:2");
        assert_eq!(TopologyEvent::LinkRemoved(l).op(), Operation::Del);
        assert_eq!(TopologyEvent::SwitchAdded(NodeId::from("openflow:1")).key(), "switch:openflow:1");
    }

    #[tokio::test]
    async fn test_link_changes_rebuild_graph_once() {
        let mut orch = orch();
        orch.enqueue(TopologyEvent::LinkAdded(link(1, 2, 2, 1)));
        orch.enqueue(TopologyEvent::LinkAdded(link(2, 1, 1, 2)));
        orch.enqueue(TopologyEvent::LinkAdded(link(2, 2, 3, 2)));
        assert!(orch.has_pending_tasks());

        orch.do_task().await;
        assert!(!orch.has_pending_tasks());
        assert_eq!(orch.stats().links_added, 3);
        assert_eq!(orch.stats().rebuilds_scheduled, 1);
        assert!(orch.refresher().is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(orch.graph().edge_counts(), (3, 2));
        assert!(orch.graph().shortest_path(&NodeId::from("openflow:1"), &NodeId::from("openflow:3")).is_some());

        orch.enqueue(TopologyEvent::LinkRemoved(link(2, 2, 3, 2)));
        orch.do_task().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(orch.link_count(), 2);
        assert!(orch.graph().shortest_path(&NodeId::from("openflow:1"), &NodeId::from("openflow:3")).is_none());
    }

    #[tokio::test]
    async fn test_host_links_do_not_trigger_rebuild() {
        let mut orch = orch();
        orch.enqueue(TopologyEvent::LinkAdded(Link::new(
            "host:00:00:00:00:00:01/openflow:1:1",
            Termination::new("host:00:00:00:00:00:01", "host:00:00:00:00:00:01"),
            Termination::new("openflow:1", "openflow:1:1"),
        )));

        orch.do_task().await;
        assert_eq!(orch.stats().host_links_seen, 1);
        assert_eq!(orch.stats().rebuilds_scheduled, 0);
        assert!(!orch.refresher().is_pending());
    }

    #[tokio::test]
    async fn test_unknown_link_removal_is_ignored() {
        let mut orch = orch();
        orch.enqueue(TopologyEvent::LinkRemoved(link(1, 2, 2, 1)));

        orch.do_task().await;
        assert_eq!(orch.stats().links_removed, 0);
        assert!(!orch.refresher().is_pending());
    }

    #[tokio::test]
    async fn test_switch_added_notifies_callbacks() {
        let mut orch = orch();
        let callbacks = Arc::new(TestCallbacks {
            switches: Mutex::new(Vec::new()),
        });
        orch.set_callbacks(callbacks.clone());

        orch.enqueue(TopologyEvent::SwitchAdded(NodeId::from("openflow:1")));
        orch.enqueue(TopologyEvent::SwitchAdded(NodeId::from("openflow:1")));
        orch.do_task().await;

        assert_eq!(orch.stats().switches_added, 1);
        assert_eq!(*callbacks.switches.lock().unwrap(), vec![NodeId::from("openflow:1")]);
    }

    #[tokio::test]
    async fn test_repeated_switch_report_is_ignored() {
        let mut orch = orch();
        let callbacks = Arc::new(TestCallbacks {
            switches: Mutex::new(Vec::new()),
        });
        orch.set_callbacks(callbacks.clone());

        orch.enqueue(TopologyEvent::SwitchAdded(NodeId::from("openflow:1")));
        orch.do_task().await;
        orch.enqueue(TopologyEvent::SwitchAdded(NodeId::from("openflow:1")));
        orch.enqueue(TopologyEvent::SwitchAdded(NodeId::from("openflow:2")));
        orch.do_task().await;

        assert_eq!(orch.stats().switches_added, 2);
        assert_eq!(orch.switch_count(), 2);
        assert_eq!(
            *callbacks.switches.lock().unwrap(),
            vec![NodeId::from("openflow:1"), NodeId::from("openflow:2")]
        );
    }
}
