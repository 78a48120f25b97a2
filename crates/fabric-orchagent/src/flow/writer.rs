//! Forwarding-state writer.
//!
//! Turns attachment points and oriented paths into flow and group writes:
//!
//! - unicast host rules at each endpoint's own switch
//! - unicast hop rules along a path, both directions per hop
//! - multicast forward rules from a source toward the rendezvous address
//! - multicast reverse fan-out through per-switch groups
//! - the send-to-controller table-miss rule of every new switch
//!
//! Writes are best effort. A failed write or an unorientable hop is logged
//! and counted in the returned [`InstallReport`], and the walk continues
//! with the remaining hops. Nothing already written is rolled back; rule
//! timeouts clean up after partial installs.

use async_trait::async_trait;
use fabric_orch_common::IdAllocator;
use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::group::{GroupChange, GroupError, GroupTable};
use super::hop::{orient_path, path_end};
use super::transport::{SwitchTransport, TransportError};
use super::types::{FlowAction, FlowMatch, FlowProfile, FlowSpec, GroupId};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::host::{AttachmentPoint, HostAddress, HostOrchCallbacks, MacAddress};
use crate::topology::{Link, NodeId, PortId, TopologyOrchCallbacks};

pub const FLOW_COOKIE_BASE: u64 = 0x4a00_0000_0000_0000;
pub const TABLE_MISS_COOKIE_BASE: u64 = 0x2b00_0000_0000_0000;

/// Rule parameters used by the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub table_id: u8,
    pub unicast: FlowProfile,
    pub mdns: FlowProfile,
    pub multicast_group: FlowProfile,
    pub table_miss: FlowProfile,
    pub multicast_address: Ipv4Addr,
    pub mdns_port: u16,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            table_id: 0,
            unicast: FlowProfile::new(1000, 15, 0),
            mdns: FlowProfile::new(10, 0, 35),
            multicast_group: FlowProfile::new(10, 0, 0),
            table_miss: FlowProfile::new(0, 0, 0),
            multicast_address: Ipv4Addr::new(224, 0, 0, 251),
            mdns_port: 5353,
        }
    }
}

/// Network- and link-layer address of a unicast endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEndpoint {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

impl HostEndpoint {
    pub fn new(ip: Ipv4Addr, mac: MacAddress) -> Self {
        Self { ip, mac }
    }
}

/// Outcome of a multi-write install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub written: usize,
    pub failed: usize,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn record<T, E>(&mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.written += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: InstallReport) {
        self.written += other.written;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy)]
enum FlowKind {
    Unicast,
    Mdns,
    Multicast,
    TableMiss,
}

impl FlowKind {
    fn prefix(&self) -> &'static str {
        match self {
            FlowKind::Unicast => "fabric-unicast",
            FlowKind::Mdns => "fabric-mdns",
            FlowKind::Multicast => "fabric-mcast",
            FlowKind::TableMiss => "fabric-miss",
        }
    }
}

pub struct ForwardingStateWriter {
    config: WriterConfig,
    transport: Arc<dyn SwitchTransport>,
    groups: GroupTable,
    flow_ids: IdAllocator,
    flow_cookies: IdAllocator,
    miss_cookies: IdAllocator,
    flows_written: AtomicU64,
    write_failures: AtomicU64,
}

impl ForwardingStateWriter {
    pub fn new(config: WriterConfig, transport: Arc<dyn SwitchTransport>) -> Self {
        Self {
            config,
            groups: GroupTable::new(Arc::clone(&transport)),
            transport,
            flow_ids: IdAllocator::new(0),
            flow_cookies: IdAllocator::new(FLOW_COOKIE_BASE),
            miss_cookies: IdAllocator::new(TABLE_MISS_COOKIE_BASE),
            flows_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    pub fn flows_written(&self) -> u64 {
        self.flows_written.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    fn build_flow(
        &self,
        kind: FlowKind,
        node: &NodeId,
        flow_match: FlowMatch,
        action: FlowAction,
        profile: FlowProfile,
    ) -> FlowSpec {
        let cookie = match kind {
            FlowKind::TableMiss => self.miss_cookies.next_id(),
            _ => self.flow_cookies.next_id(),
        };
        FlowSpec {
            node: node.clone(),
            table_id: self.config.table_id,
            flow_id: format!("{}-{}", kind.prefix(), self.flow_ids.next_id()),
            flow_match,
            action,
            priority: profile.priority,
            idle_timeout: profile.idle_timeout,
            hard_timeout: profile.hard_timeout,
            cookie,
        }
    }

    async fn write_flow(&self, flow: FlowSpec) -> Result<(), TransportError> {
        let record = AuditRecord::new(AuditCategory::FlowWrite, "ForwardingStateWriter", "install_flow")
            .with_object_id(format!("{}/{}", flow.node, flow.flow_id))
            .with_object_type("flow")
            .with_details(serde_json::json!({
                "match": flow.flow_match.to_string(),
                "action": flow.action.to_string(),
                "priority": flow.priority,
                "cookie": format!("0x{:x}", flow.cookie),
            }));

        match self.transport.install_flow(&flow).await {
            Ok(()) => {
                self.flows_written.fetch_add(1, Ordering::Relaxed);
                debug!("ForwardingStateWriter: Installed {}", flow);
                audit_log!(record.with_outcome(AuditOutcome::Success));
                Ok(())
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                error!("ForwardingStateWriter: Failed to install {}: {}", flow, e);
                audit_log!(record.with_error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn write_unicast(
        &self,
        node: &NodeId,
        host: &HostEndpoint,
        port: &PortId,
    ) -> Result<(), TransportError> {
        let flow = self.build_flow(
            FlowKind::Unicast,
            node,
            FlowMatch::unicast_to(host.ip, host.mac),
            FlowAction::Output(port.clone()),
            self.config.unicast,
        );
        self.write_flow(flow).await
    }

    async fn write_mdns(
        &self,
        node: &NodeId,
        source: Ipv4Addr,
        port: &PortId,
    ) -> Result<(), TransportError> {
        let flow = self.build_flow(
            FlowKind::Mdns,
            node,
            FlowMatch::udp_between(source, self.config.multicast_address, self.config.mdns_port),
            FlowAction::Output(port.clone()),
            self.config.mdns,
        );
        self.write_flow(flow).await
    }

    async fn write_group_flow(
        &self,
        node: &NodeId,
        consumer: Ipv4Addr,
        group_id: GroupId,
    ) -> Result<(), TransportError> {
        let flow = self.build_flow(
            FlowKind::Multicast,
            node,
            FlowMatch::udp_between(consumer, self.config.multicast_address, self.config.mdns_port),
            FlowAction::Group(group_id),
            self.config.multicast_group,
        );
        self.write_flow(flow).await
    }

    /// Rule delivering traffic for `host` out of its attachment port.
    pub async fn install_host_flow(
        &self,
        host: &HostEndpoint,
        at: &AttachmentPoint,
    ) -> Result<(), TransportError> {
        self.write_unicast(&at.node, host, &at.port).await
    }

    /// Hop rules for traffic between `src` and `dst` along `path`, walked
    /// from `start`. Each hop gets a rule toward `dst` on the switch being
    /// left and a rule toward `src` on the switch being entered.
    pub async fn install_unicast_path(
        &self,
        src: &HostEndpoint,
        dst: &HostEndpoint,
        start: &NodeId,
        path: &[Link],
    ) -> InstallReport {
        let mut report = InstallReport::default();

        for hop in orient_path(start, path) {
            let hop = match hop {
                Ok(hop) => hop,
                Err(e) => {
                    warn!("ForwardingStateWriter: Skipping hop: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            let result = self.write_unicast(&hop.egress.node, dst, &hop.egress.port).await;
            report.record(&result);
            let result = self.write_unicast(&hop.ingress.node, src, &hop.ingress.port).await;
            report.record(&result);
        }

        report
    }

    /// Rules carrying `source`'s multicast traffic along `path` (walked from
    /// `start`, the source's switch) to the consumer attached at `consumer_at`.
    pub async fn install_multicast_forward(
        &self,
        source: Ipv4Addr,
        consumer_at: &AttachmentPoint,
        start: &NodeId,
        path: &[Link],
    ) -> InstallReport {
        let mut report = InstallReport::default();

        let result = self.write_mdns(&consumer_at.node, source, &consumer_at.port).await;
        report.record(&result);

        for hop in orient_path(start, path) {
            match hop {
                Ok(hop) => {
                    let result = self.write_mdns(&hop.egress.node, source, &hop.egress.port).await;
                    report.record(&result);
                }
                Err(e) => {
                    warn!("ForwardingStateWriter: Skipping hop: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Fans the consumer's multicast traffic back toward the source at
    /// `source_at`: every switch on `path` gets the port leading back to
    /// the source added to the consumer's group.
    pub async fn install_multicast_reverse(
        &self,
        consumer: Ipv4Addr,
        source_at: &AttachmentPoint,
        path: &[Link],
    ) -> InstallReport {
        let mut report = InstallReport::default();
        let mut toward_source = source_at.port.clone();

        for hop in orient_path(&source_at.node, path) {
            match hop {
                Ok(hop) => {
                    let result = self
                        .upsert_group_member(&hop.egress.node, consumer, &toward_source)
                        .await;
                    report.record(&result);
                    toward_source = hop.ingress.port;
                }
                Err(e) => {
                    warn!("ForwardingStateWriter: Skipping hop: {}", e);
                    report.failed += 1;
                }
            }
        }

        let last = path_end(&source_at.node, path);
        let result = self.upsert_group_member(&last, consumer, &toward_source).await;
        report.record(&result);

        report
    }

    /// Adds `port` to the consumer's group on `node`, then writes the flow
    /// that points at the group if it is not in place yet. A group whose
    /// flow write failed gets the flow on the next upsert, whatever the
    /// membership change.
    pub async fn upsert_group_member(
        &self,
        node: &NodeId,
        consumer: Ipv4Addr,
        port: &PortId,
    ) -> Result<GroupChange, GroupError> {
        let change = self.groups.upsert_member(node, consumer, port).await?;
        self.groups
            .ensure_group_flow(node, consumer, |group_id| {
                self.write_group_flow(node, consumer, group_id)
            })
            .await?;
        Ok(change)
    }

    /// Removes every group of `consumer` and releases its group id.
    pub async fn remove_consumer(&self, consumer: Ipv4Addr) -> usize {
        self.groups.remove_consumer(consumer).await
    }

    /// Forgets all group bookkeeping; switches are not touched.
    pub fn flush_groups(&self) {
        self.groups.flush();
    }

    /// Installs the send-to-controller rule on an OpenFlow switch. Returns
    /// false for switches that are not managed over OpenFlow.
    pub async fn install_table_miss(&self, node: &NodeId) -> Result<bool, TransportError> {
        if !node.is_openflow() {
            debug!("ForwardingStateWriter: {} is not an OpenFlow switch, no table-miss rule", node);
            return Ok(false);
        }
        let flow = self.build_flow(
            FlowKind::TableMiss,
            node,
            FlowMatch::any(),
            FlowAction::Controller,
            self.config.table_miss,
        );
        self.write_flow(flow).await?;
        info!("ForwardingStateWriter: Table-miss rule installed on {}", node);
        Ok(true)
    }
}

#[async_trait]
impl TopologyOrchCallbacks for ForwardingStateWriter {
    async fn on_switch_added(&self, node: &NodeId) {
        // Failure is already logged and audited by the write.
        let _ = self.install_table_miss(node).await;
    }
}

#[async_trait]
impl HostOrchCallbacks for ForwardingStateWriter {
    async fn on_host_removed(&self, address: &HostAddress) {
        if let Some(consumer) = address.as_ipv4() {
            self.remove_consumer(consumer).await;
        }
    }
}
