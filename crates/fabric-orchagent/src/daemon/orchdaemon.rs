//! FabricDaemon implementation.
//!
//! The FabricDaemon owns the controller's shared state and its three orchs:
//! - TopologyOrch (priority 0): switch and link reports
//! - HostOrch (priority 5): address reports
//! - RouteOrch (priority 10): route requests and classified packet-ins
//!
//! Events arrive on an unbounded channel. Each loop iteration queues every
//! available event on its orch, then runs `do_task` on every orch with
//! pending work, lowest priority value first, so a route request sees the
//! host reports that arrived with it.

use async_trait::async_trait;
use fabric_orch_common::Orch;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::FabricConfig;
use crate::flow::{ForwardingStateWriter, SwitchTransport};
use crate::host::{AttachmentPoint, AttachmentTable, HostAddress, HostEvent, HostEventSink, HostOrch};
use crate::route::{self, PacketIn, RouteOrch, RouteOrchCallbacks, RouteRequest};
use crate::topology::{Link, NodeId, TopologyEvent, TopologyGraph, TopologyOrch};

/// Inbound events from the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    SwitchAdded(NodeId),
    LinkAdded(Link),
    LinkRemoved(Link),
    AddressObserved {
        address: HostAddress,
        point: AttachmentPoint,
    },
    AddressExpired(HostAddress),
    Route(RouteRequest),
    PacketIn(PacketIn),
    /// Forget all multicast group bookkeeping.
    FlushGroups,
}

/// Outbound notifications for the layer above the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum FabricNotification {
    HostAdded { address: HostAddress, node: NodeId },
    HostRemoved(HostAddress),
    RouteCompleted {
        request: RouteRequest,
        result: route::Result<()>,
    },
}

struct Notifier {
    tx: mpsc::UnboundedSender<FabricNotification>,
}

impl Notifier {
    fn publish(&self, notification: FabricNotification) {
        if self.tx.send(notification).is_err() {
            debug!("FabricDaemon: No notification listener");
        }
    }
}

impl HostEventSink for Notifier {
    fn host_added(&self, address: &HostAddress, node: &NodeId) {
        self.publish(FabricNotification::HostAdded {
            address: *address,
            node: node.clone(),
        });
    }

    fn host_removed(&self, address: &HostAddress) {
        self.publish(FabricNotification::HostRemoved(*address));
    }
}

#[async_trait]
impl RouteOrchCallbacks for Notifier {
    async fn on_route_completed(&self, request: &RouteRequest, result: &route::Result<()>) {
        self.publish(FabricNotification::RouteCompleted {
            request: request.clone(),
            result: result.clone(),
        });
    }
}

pub struct FabricDaemon {
    config: FabricConfig,
    graph: Arc<TopologyGraph>,
    attachments: Arc<AttachmentTable>,
    writer: Arc<ForwardingStateWriter>,
    topology: TopologyOrch,
    hosts: HostOrch,
    routes: RouteOrch,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    notifications: Option<mpsc::UnboundedReceiver<FabricNotification>>,
    running: bool,
}

impl FabricDaemon {
    pub fn new(config: FabricConfig, transport: Arc<dyn SwitchTransport>) -> Self {
        let graph = Arc::new(TopologyGraph::new());
        let attachments = Arc::new(AttachmentTable::new());
        let writer = Arc::new(ForwardingStateWriter::new(config.writer_config(), transport));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(Notifier { tx: notify_tx });
        attachments.set_sink(notifier.clone());

        let mut topology = TopologyOrch::new(config.topology_config(), Arc::clone(&graph));
        topology.set_callbacks(writer.clone());

        let mut hosts = HostOrch::new(Arc::clone(&attachments));
        hosts.set_callbacks(writer.clone());

        let mut routes = RouteOrch::new(
            Arc::clone(&graph),
            Arc::clone(&attachments),
            Arc::clone(&writer),
        );
        routes.set_callbacks(notifier);

        Self {
            config,
            graph,
            attachments,
            writer,
            topology,
            hosts,
            routes,
            events_tx,
            events_rx,
            notifications: Some(notify_rx),
            running: false,
        }
    }

    /// Handle for the transport layer to submit events.
    pub fn sender(&self) -> mpsc::UnboundedSender<ControllerEvent> {
        self.events_tx.clone()
    }

    /// Takes the notification stream. Returns None after the first call.
    pub fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<FabricNotification>> {
        self.notifications.take()
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    pub fn graph(&self) -> &Arc<TopologyGraph> {
        &self.graph
    }

    pub fn attachments(&self) -> &Arc<AttachmentTable> {
        &self.attachments
    }

    pub fn writer(&self) -> &Arc<ForwardingStateWriter> {
        &self.writer
    }

    pub fn topology(&self) -> &TopologyOrch {
        &self.topology
    }

    pub fn hosts(&self) -> &HostOrch {
        &self.hosts
    }

    pub fn routes(&self) -> &RouteOrch {
        &self.routes
    }

    /// Queues one event on the orch that handles it.
    pub fn dispatch(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::SwitchAdded(node) => {
                self.topology.enqueue(TopologyEvent::SwitchAdded(node))
            }
            ControllerEvent::LinkAdded(link) => self.topology.enqueue(TopologyEvent::LinkAdded(link)),
            ControllerEvent::LinkRemoved(link) => {
                self.topology.enqueue(TopologyEvent::LinkRemoved(link))
            }
            ControllerEvent::AddressObserved { address, point } => {
                self.hosts.enqueue(HostEvent::AddressObserved { address, point })
            }
            ControllerEvent::AddressExpired(address) => {
                self.hosts.enqueue(HostEvent::AddressExpired(address))
            }
            ControllerEvent::Route(request) => self.routes.enqueue(request),
            ControllerEvent::PacketIn(packet) => {
                match packet.classify(self.config.multicast_address) {
                    Some(request) => self.routes.enqueue(request),
                    None => debug!(
                        "FabricDaemon: Ignoring packet-in {} -> {} (proto {})",
                        packet.src_ip, packet.dst_ip, packet.protocol
                    ),
                }
            }
            ControllerEvent::FlushGroups => {
                warn!("FabricDaemon: Flushing multicast group state");
                self.writer.flush_groups();
            }
        }
    }

    /// Runs every orch with pending work in priority order. Returns the
    /// number of orchs that ran.
    pub async fn process_pending(&mut self) -> usize {
        let mut orchs: [&mut dyn Orch; 3] = [&mut self.topology, &mut self.hosts, &mut self.routes];
        orchs.sort_by_key(|orch| orch.priority());

        let mut ran = 0;
        for orch in orchs {
            if orch.has_pending_tasks() {
                debug!("Processing tasks for {}", orch.name());
                orch.do_task().await;
                ran += 1;
            }
        }
        ran
    }

    fn drain_events(&mut self, first: ControllerEvent) {
        self.dispatch(first);
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
        }
    }

    /// Runs the event loop until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!("Starting FabricDaemon event loop");
        self.running = true;

        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "FabricDaemon", "event_loop_started")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({
                "heartbeat_interval_ms": self.config.heartbeat_interval_ms,
                "topology_refresh_delay_ms": self.config.topology_refresh_delay_ms,
            })));

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events_rx.recv() => event,
                _ = heartbeat.tick() => None,
            };
            if let Some(event) = next {
                self.drain_events(event);
            }
            self.process_pending().await;
        }

        self.running = false;
        info!("FabricDaemon event loop stopped");
        audit_log!(AuditRecord::new(AuditCategory::SystemLifecycle, "FabricDaemon", "event_loop_stopped")
            .with_outcome(AuditOutcome::Success));
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Dumps state for debugging.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!("FabricDaemon running: {}", self.running));

        let orchs: [&dyn Orch; 3] = [&self.topology, &self.hosts, &self.routes];
        for orch in orchs {
            lines.push(format!(
                "  [{:3}] {} - {} pending",
                orch.priority(),
                orch.name(),
                orch.dump_pending_tasks().len()
            ));
        }

        let (directed, undirected) = self.graph.edge_counts();
        lines.push(format!(
            "  graph: {} nodes, {} links ({} connections)",
            self.graph.node_count(),
            directed,
            undirected
        ));
        lines.push(format!("  hosts: {}", self.attachments.len()));
        lines.push(format!(
            "  flows: {} written, {} failed",
            self.writer.flows_written(),
            self.writer.write_failures()
        ));
        lines
    }
}
