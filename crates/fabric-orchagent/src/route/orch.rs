//! RouteOrch implementation.
//!
//! Resolves both endpoints of a route request through the attachment table,
//! asks the topology graph for a path between their switches and drives the
//! forwarding-state writer along it.
//!
//! Resolution and path lookup failures abort the request before anything
//! beyond the host rules is written. Write failures along the path do not:
//! every hop is attempted, and the request then reports
//! [`RouteError::PartialInstall`] without undoing the writes that landed.

use async_trait::async_trait;
use fabric_orch_common::{Consumer, ConsumerConfig, Orch};
use log::{debug, info, warn};
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::types::{Result, RouteError, RouteRequest};
use crate::flow::{ForwardingStateWriter, HostEndpoint, InstallReport};
use crate::host::{AttachmentPoint, AttachmentTable, HostAddress};
use crate::topology::{Link, TopologyGraph};

/// Callbacks for RouteOrch to report request outcomes.
#[async_trait]
pub trait RouteOrchCallbacks: Send + Sync {
    /// Called once per processed request. The caller is expected to resend
    /// the packet that triggered it on success.
    async fn on_route_completed(&self, request: &RouteRequest, result: &Result<()>);
}

#[derive(Debug, Clone, Default)]
pub struct RouteOrchStats {
    pub unicast_routed: u64,
    pub multicast_routed: u64,
    pub host_unresolved: u64,
    pub path_unreachable: u64,
    pub partial_installs: u64,
}

pub struct RouteOrch {
    consumer: Consumer<RouteRequest>,
    graph: Arc<TopologyGraph>,
    attachments: Arc<AttachmentTable>,
    writer: Arc<ForwardingStateWriter>,
    callbacks: Option<Arc<dyn RouteOrchCallbacks>>,
    stats: RouteOrchStats,
}

impl RouteOrch {
    pub fn new(
        graph: Arc<TopologyGraph>,
        attachments: Arc<AttachmentTable>,
        writer: Arc<ForwardingStateWriter>,
    ) -> Self {
        Self {
            consumer: Consumer::new(ConsumerConfig::new("ROUTE_REQUESTS").with_priority(10)),
            graph,
            attachments,
            writer,
            callbacks: None,
            stats: RouteOrchStats::default(),
        }
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn RouteOrchCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn enqueue(&mut self, request: RouteRequest) {
        self.consumer.push(request);
    }

    pub fn stats(&self) -> &RouteOrchStats {
        &self.stats
    }

    fn resolve(&mut self, ip: Ipv4Addr) -> Result<AttachmentPoint> {
        self.attachments.lookup_ipv4(ip).ok_or_else(|| {
            warn!("RouteOrch: Host {} is not attached anywhere", ip);
            self.stats.host_unresolved += 1;
            RouteError::HostUnresolved(HostAddress::Ipv4(ip))
        })
    }

    fn path_between(&mut self, src: &AttachmentPoint, dst: &AttachmentPoint) -> Result<Vec<Link>> {
        self.graph.shortest_path(&src.node, &dst.node).ok_or_else(|| {
            warn!("RouteOrch: No path from {} to {}", src.node, dst.node);
            self.stats.path_unreachable += 1;
            RouteError::PathUnreachable {
                src: src.node.clone(),
                dst: dst.node.clone(),
            }
        })
    }

    fn finish(&mut self, report: InstallReport) -> Result<()> {
        if report.is_complete() {
            return Ok(());
        }
        self.stats.partial_installs += 1;
        Err(RouteError::PartialInstall {
            failed_writes: report.failed,
        })
    }

    /// Installs forwarding state for traffic between `src` and `dst`.
    ///
    /// Each host gets a delivery rule on its own switch. When the hosts sit
    /// on different switches, every hop of the shortest path gets rules for
    /// both directions, once walked from the source and once walked back
    /// from the destination.
    pub async fn route_unicast(&mut self, src: &HostEndpoint, dst: &HostEndpoint) -> Result<()> {
        let src_at = self.resolve(src.ip)?;
        let dst_at = self.resolve(dst.ip)?;

        let mut report = InstallReport::default();
        report.record(&self.writer.install_host_flow(src, &src_at).await);
        report.record(&self.writer.install_host_flow(dst, &dst_at).await);

        if src_at.node == dst_at.node {
            debug!("RouteOrch: {} and {} share switch {}", src.ip, dst.ip, src_at.node);
            self.stats.unicast_routed += 1;
            return self.finish(report);
        }

        let path = self.path_between(&src_at, &dst_at)?;
        report.merge(
            self.writer
                .install_unicast_path(src, dst, &src_at.node, &path)
                .await,
        );

        let reversed: Vec<Link> = path.iter().rev().cloned().collect();
        report.merge(
            self.writer
                .install_unicast_path(dst, src, &dst_at.node, &reversed)
                .await,
        );

        info!(
            "RouteOrch: Routed {} -> {} over {} hops ({} writes, {} failed)",
            src.ip,
            dst.ip,
            path.len(),
            report.written,
            report.failed
        );
        self.stats.unicast_routed += 1;
        self.finish(report)
    }

    /// Installs mDNS forwarding from `source` to `consumer` and adds the
    /// consumer to the fan-out groups carrying its traffic back to `source`.
    pub async fn route_multicast(&mut self, source: Ipv4Addr, consumer: Ipv4Addr) -> Result<()> {
        let source_at = self.resolve(source)?;
        let consumer_at = self.resolve(consumer)?;

        let path = if source_at.node == consumer_at.node {
            Vec::new()
        } else {
            self.path_between(&source_at, &consumer_at)?
        };

        let mut report = self
            .writer
            .install_multicast_forward(source, &consumer_at, &source_at.node, &path)
            .await;
        report.merge(
            self.writer
                .install_multicast_reverse(consumer, &source_at, &path)
                .await,
        );

        info!(
            "RouteOrch: Multicast {} -> {} over {} hops ({} writes, {} failed)",
            source,
            consumer,
            path.len(),
            report.written,
            report.failed
        );
        self.stats.multicast_routed += 1;
        self.finish(report)
    }

    async fn route(&mut self, request: &RouteRequest) -> Result<()> {
        match request {
            RouteRequest::Unicast { src, dst } => self.route_unicast(src, dst).await,
            RouteRequest::Multicast { source, consumer } => {
                self.route_multicast(*source, *consumer).await
            }
        }
    }
}

#[async_trait]
impl Orch for RouteOrch {
    fn name(&self) -> &str {
        "RouteOrch"
    }

    fn priority(&self) -> i32 {
        self.consumer.priority()
    }

    async fn do_task(&mut self) {
        for request in self.consumer.drain() {
            let result = self.route(&request).await;
            if let Err(e) = &result {
                debug!("RouteOrch: {} failed: {}", request, e);
            }
            if let Some(callbacks) = &self.callbacks {
                callbacks.on_route_completed(&request, &result).await;
            }
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }
}
