//! Integration tests for the fabric controller with a recording transport
//!
//! These tests drive the public API end to end: topology graph, attachment
//! table, route orchestration, forwarding-state writes and the daemon loop.

use async_trait::async_trait;
use fabric_orchagent::flow::{FlowAction, FlowSpec, GroupId, GroupSpec};
use fabric_orchagent::{
    AttachmentPoint, AttachmentTable, ForwardingStateWriter, HostAddress, HostEndpoint,
    HostEventSink, Link, MacAddress, NodeId, PortId, SwitchTransport, Termination, TopologyGraph,
    TransportError, WriterConfig,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// One call made into the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOp {
    InstallFlow(FlowSpec),
    InstallGroup(GroupSpec),
    UpdateGroup { original: GroupSpec, updated: GroupSpec },
    RemoveGroup { node: NodeId, group_id: GroupId },
}

/// Mock switch transport for testing
///
/// Records every call in order. Writes to nodes marked as failing are
/// rejected and not recorded.
#[derive(Default)]
pub struct MockTransport {
    ops: Mutex<Vec<TransportOp>>,
    failing: Mutex<HashSet<NodeId>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_node(&self, node: &str) {
        self.failing.lock().unwrap().insert(NodeId::from(node));
    }

    fn check(&self, node: &NodeId) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(node) {
            return Err(TransportError::Rejected {
                node: node.clone(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn flows(&self) -> Vec<FlowSpec> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                TransportOp::InstallFlow(flow) => Some(flow.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn group_ops(&self) -> Vec<TransportOp> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| !matches!(op, TransportOp::InstallFlow(_)))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }
}

#[async_trait]
impl SwitchTransport for MockTransport {
    async fn install_flow(&self, flow: &FlowSpec) -> Result<(), TransportError> {
        self.check(&flow.node)?;
        self.ops.lock().unwrap().push(TransportOp::InstallFlow(flow.clone()));
        Ok(())
    }

    async fn install_group(&self, group: &GroupSpec) -> Result<(), TransportError> {
        self.check(&group.node)?;
        self.ops.lock().unwrap().push(TransportOp::InstallGroup(group.clone()));
        Ok(())
    }

    async fn update_group(&self, original: &GroupSpec, updated: &GroupSpec) -> Result<(), TransportError> {
        self.check(&updated.node)?;
        self.ops.lock().unwrap().push(TransportOp::UpdateGroup {
            original: original.clone(),
            updated: updated.clone(),
        });
        Ok(())
    }

    async fn remove_group(&self, node: &NodeId, group_id: GroupId) -> Result<(), TransportError> {
        self.check(node)?;
        self.ops.lock().unwrap().push(TransportOp::RemoveGroup {
            node: node.clone(),
            group_id,
        });
        Ok(())
    }
}

/// Records host lifecycle events emitted by the attachment table.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<String>>,
}

impl HostEventSink for RecordingSink {
    fn host_added(&self, address: &HostAddress, node: &NodeId) {
        self.events.lock().unwrap().push(format!("added {} at {}", address, node));
    }

    fn host_removed(&self, address: &HostAddress) {
        self.events.lock().unwrap().push(format!("removed {}", address));
    }
}

fn sw(n: u32) -> NodeId {
    NodeId::new(format!("openflow:{}", n))
}

fn port(n: u32, p: u32) -> PortId {
    PortId::new(format!("openflow:{}:{}", n, p))
}

fn link(a: u32, a_port: u32, b: u32, b_port: u32) -> Link {
    Link::new(
        format!("openflow:{}:{}", a, a_port),
        Termination::new(sw(a), port(a, a_port)),
        Termination::new(sw(b), port(b, b_port)),
    )
}

/// Both directions of S1:2 <-> S2:1 and S2:2 <-> S3:2.
fn line_links() -> Vec<Link> {
    vec![
        link(1, 2, 2, 1),
        link(2, 1, 1, 2),
        link(2, 2, 3, 2),
        link(3, 2, 2, 2),
    ]
}

fn host(n: u8) -> HostEndpoint {
    HostEndpoint::new(Ipv4Addr::new(10, 0, 0, n), MacAddress::new([0, 0, 0, 0, 0, n]))
}

fn at(switch: u32, p: u32) -> AttachmentPoint {
    AttachmentPoint::new(sw(switch), port(switch, p))
}

/// (switch, destination ip, output port) of every flow.
fn flow_summary(flows: &[FlowSpec]) -> Vec<(NodeId, Option<Ipv4Addr>, FlowAction)> {
    flows
        .iter()
        .map(|f| (f.node.clone(), f.flow_match.ipv4_dst, f.action.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_records_and_fails() {
        let transport = MockTransport::new();
        transport.fail_node("openflow:9");

        let group = GroupSpec::new(sw(1), 1, vec![]);
        transport.install_group(&group).await.unwrap();
        assert!(transport
            .remove_group(&sw(9), 1)
            .await
            .is_err());

        assert_eq!(transport.ops(), vec![TransportOp::InstallGroup(group)]);
        transport.clear();
        assert!(transport.ops().is_empty());
    }
}

// Integration tests for the controller core
#[cfg(test)]
mod integration_tests {
    use super::*;

    mod topology_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_duplicate_reports_never_double_edges() {
            let graph = TopologyGraph::new();
            assert_eq!(graph.add_links(&line_links()), 4);
            assert_eq!(graph.add_links(&line_links()), 0);
            assert_eq!(graph.edge_counts(), (4, 2));
        }

        #[test]
        fn test_reverse_path_covers_same_edges() {
            let graph = TopologyGraph::new();
            graph.add_links(&line_links());

            let forward = graph.shortest_path(&sw(1), &sw(3)).unwrap();
            let backward = graph.shortest_path(&sw(3), &sw(1)).unwrap();
            let mut reversed = forward.clone();
            reversed.reverse();

            assert_eq!(forward.len(), 2);
            let ids = |path: &[Link]| path.iter().map(|l| l.edge_key()).collect::<Vec<_>>();
            assert_eq!(ids(&backward), ids(&reversed));
        }

        #[test]
        fn test_disjoint_or_unknown_is_unreachable() {
            let graph = TopologyGraph::new();
            graph.add_links(&line_links());
            graph.add_links(&[link(7, 1, 8, 1)]);

            assert!(graph.shortest_path(&sw(1), &sw(8)).is_none());
            assert!(graph.shortest_path(&sw(1), &sw(42)).is_none());
        }
    }

    mod attachment_tests {
        use super::*;

        #[test]
        fn test_first_writer_wins_and_events() {
            let table = AttachmentTable::new();
            let sink = Arc::new(RecordingSink::default());
            table.set_sink(sink.clone());
            let h1 = HostAddress::Ipv4(host(1).ip);

            table.set_attachment(h1, at(1, 1));
            table.set_attachment(h1, at(2, 2));
            assert_eq!(table.lookup(&h1), Some(at(1, 1)));

            table.remove_attachment(&h1);
            table.remove_attachment(&h1);
            assert_eq!(table.lookup(&h1), None);

            assert_eq!(
                *sink.events.lock().unwrap(),
                vec![
                    "added 10.0.0.1 at openflow:1".to_string(),
                    "removed 10.0.0.1".to_string(),
                ]
            );
        }
    }

    mod unicast_tests {
        use super::*;
        use fabric_orchagent::{RouteError, RouteOrch};
        use pretty_assertions::assert_eq;

        struct Fabric {
            transport: Arc<MockTransport>,
            table: Arc<AttachmentTable>,
            orch: RouteOrch,
        }

        /// S1 - S2 - S3 with H1 on S1 port 1 and H2 on S3 port 1.
        fn fabric() -> Fabric {
            let graph = Arc::new(TopologyGraph::new());
            graph.add_links(&line_links());
            let table = Arc::new(AttachmentTable::new());
            table.set_attachment(HostAddress::Ipv4(host(1).ip), at(1, 1));
            table.set_attachment(HostAddress::Ipv4(host(2).ip), at(3, 1));
            let transport = Arc::new(MockTransport::new());
            let writer = Arc::new(ForwardingStateWriter::new(WriterConfig::default(), transport.clone()));
            let orch = RouteOrch::new(graph, Arc::clone(&table), writer);
            Fabric { transport, table, orch }
        }

        #[tokio::test]
        async fn test_two_hop_unicast_installs_host_forward_and_reverse_rules() {
            let mut f = fabric();
            let (h1, h2) = (host(1), host(2));

            f.orch.route_unicast(&h1, &h2).await.unwrap();

            let out = |n: u32, p: u32| FlowAction::Output(port(n, p));
            assert_eq!(
                flow_summary(&f.transport.flows()),
                vec![
                    // Host rules.
                    (sw(1), Some(h1.ip), out(1, 1)),
                    (sw(3), Some(h2.ip), out(3, 1)),
                    // Forward walk from S1.
                    (sw(1), Some(h2.ip), out(1, 2)),
                    (sw(2), Some(h1.ip), out(2, 1)),
                    (sw(2), Some(h2.ip), out(2, 2)),
                    (sw(3), Some(h1.ip), out(3, 2)),
                    // Reverse walk from S3.
                    (sw(3), Some(h1.ip), out(3, 2)),
                    (sw(2), Some(h2.ip), out(2, 2)),
                    (sw(2), Some(h1.ip), out(2, 1)),
                    (sw(1), Some(h2.ip), out(1, 2)),
                ]
            );

            let flows = f.transport.flows();
            assert!(flows.iter().all(|flow| flow.priority == 1000 && flow.idle_timeout == 15));
            let cookies: HashSet<u64> = flows.iter().map(|flow| flow.cookie).collect();
            assert_eq!(cookies.len(), 10);
            assert_eq!(f.orch.stats().unicast_routed, 1);
        }

        #[tokio::test]
        async fn test_removed_host_is_unresolved_and_writes_nothing() {
            let mut f = fabric();
            f.table.remove_attachment(&HostAddress::Ipv4(host(2).ip));

            let result = f.orch.route_unicast(&host(1), &host(2)).await;

            assert_eq!(result, Err(RouteError::HostUnresolved(HostAddress::Ipv4(host(2).ip))));
            assert!(f.transport.ops().is_empty());
        }

        #[tokio::test]
        async fn test_failed_switch_reports_partial_install_without_rollback() {
            let mut f = fabric();
            f.transport.fail_node("openflow:2");

            let result = f.orch.route_unicast(&host(1), &host(2)).await;

            assert_eq!(result, Err(RouteError::PartialInstall { failed_writes: 4 }));
            let flows = f.transport.flows();
            assert_eq!(flows.len(), 6);
            assert!(flows.iter().all(|flow| flow.node != sw(2)));
        }
    }

    mod multicast_tests {
        use super::*;
        use fabric_orchagent::flow::IP_PROTO_UDP;
        use fabric_orchagent::{GroupChange, RouteOrch};
        use pretty_assertions::assert_eq;

        #[tokio::test]
        async fn test_group_idempotence() {
            let transport = Arc::new(MockTransport::new());
            let writer = ForwardingStateWriter::new(WriterConfig::default(), transport.clone());
            let consumer = host(3).ip;

            let first = writer.upsert_group_member(&sw(1), consumer, &port(1, 1)).await.unwrap();
            let second = writer.upsert_group_member(&sw(1), consumer, &port(1, 1)).await.unwrap();

            assert_eq!(first, GroupChange::Created(1));
            assert_eq!(second, GroupChange::Unchanged(1));
            let group_ops = transport.group_ops();
            assert_eq!(group_ops.len(), 1);
            assert!(matches!(group_ops[0], TransportOp::InstallGroup(_)));
        }

        #[tokio::test]
        async fn test_group_additive_update_keeps_id() {
            let transport = Arc::new(MockTransport::new());
            let writer = ForwardingStateWriter::new(WriterConfig::default(), transport.clone());
            let consumer = host(3).ip;

            writer.upsert_group_member(&sw(1), consumer, &port(1, 1)).await.unwrap();
            let change = writer.upsert_group_member(&sw(1), consumer, &port(1, 2)).await.unwrap();
            assert_eq!(change, GroupChange::Extended(1));

            let group_ops = transport.group_ops();
            assert_eq!(group_ops.len(), 2);
            let TransportOp::InstallGroup(installed) = &group_ops[0] else {
                panic!("expected InstallGroup, got {:?}", group_ops[0]);
            };
            let TransportOp::UpdateGroup { original, updated } = &group_ops[1] else {
                panic!("expected UpdateGroup, got {:?}", group_ops[1]);
            };
            assert_eq!(installed.ports(), vec![port(1, 1)]);
            assert_eq!(original.ports(), vec![port(1, 1)]);
            assert_eq!(updated.ports(), vec![port(1, 1), port(1, 2)]);
            assert_eq!(installed.group_id, updated.group_id);
            assert_eq!(original.group_id, updated.group_id);
        }

        #[tokio::test]
        async fn test_multicast_over_line_and_second_source() {
            let graph = Arc::new(TopologyGraph::new());
            graph.add_links(&line_links());
            let table = Arc::new(AttachmentTable::new());
            table.set_attachment(HostAddress::Ipv4(host(1).ip), at(1, 1));
            table.set_attachment(HostAddress::Ipv4(host(3).ip), at(3, 1));
            table.set_attachment(HostAddress::Ipv4(host(5).ip), at(2, 3));
            let transport = Arc::new(MockTransport::new());
            let writer = Arc::new(ForwardingStateWriter::new(WriterConfig::default(), transport.clone()));
            let mut orch = RouteOrch::new(graph, table, Arc::clone(&writer));
            let consumer = host(3).ip;

            orch.route_multicast(host(1).ip, consumer).await.unwrap();

            let mdns: Vec<_> = transport
                .flows()
                .into_iter()
                .filter(|f| f.flow_id.starts_with("fabric-mdns-"))
                .collect();
            assert_eq!(mdns.len(), 3);
            assert!(mdns.iter().all(|f| f.flow_match.ip_proto == Some(IP_PROTO_UDP)
                && f.flow_match.ipv4_src == Some(host(1).ip)
                && f.flow_match.ipv4_dst == Some(Ipv4Addr::new(224, 0, 0, 251))));

            // One group per switch, all sharing the consumer's group id.
            let groups = writer.groups();
            assert_eq!(groups.switch_count(consumer), 3);
            for (n, p) in [(1, 1), (2, 1), (3, 2)] {
                let group = groups.group(&sw(n), consumer).await.unwrap();
                assert_eq!(group.ports(), vec![port(n, p)]);
                assert_eq!(group.group_id, 1);
            }

            // Same request again touches no group.
            let before = transport.group_ops().len();
            orch.route_multicast(host(1).ip, consumer).await.unwrap();
            assert_eq!(transport.group_ops().len(), before);

            // A source on S2 extends the consumer's group there only.
            transport.clear();
            orch.route_multicast(host(5).ip, consumer).await.unwrap();
            let group_ops = transport.group_ops();
            assert_eq!(group_ops.len(), 1);
            let TransportOp::UpdateGroup { original, updated } = &group_ops[0] else {
                panic!("expected UpdateGroup, got {:?}", group_ops[0]);
            };
            assert_eq!(updated.node, sw(2));
            assert_eq!(original.ports(), vec![port(2, 1)]);
            assert_eq!(updated.ports(), vec![port(2, 1), port(2, 3)]);
        }

        #[tokio::test]
        async fn test_consumer_removal_removes_groups_and_releases_id() {
            let transport = Arc::new(MockTransport::new());
            let writer = ForwardingStateWriter::new(WriterConfig::default(), transport.clone());
            let consumer = host(3).ip;

            writer.upsert_group_member(&sw(1), consumer, &port(1, 1)).await.unwrap();
            writer.upsert_group_member(&sw(2), consumer, &port(2, 1)).await.unwrap();
            assert_eq!(writer.remove_consumer(consumer).await, 2);

            let removed: Vec<_> = transport
                .group_ops()
                .into_iter()
                .filter(|op| matches!(op, TransportOp::RemoveGroup { .. }))
                .collect();
            assert_eq!(
                removed,
                vec![
                    TransportOp::RemoveGroup { node: sw(1), group_id: 1 },
                    TransportOp::RemoveGroup { node: sw(2), group_id: 1 },
                ]
            );
            assert_eq!(writer.groups().group_id(consumer), None);

            // Ids are never reused.
            let change = writer.upsert_group_member(&sw(1), consumer, &port(1, 1)).await.unwrap();
            assert_eq!(change, GroupChange::Created(2));
        }
    }

    mod daemon_tests {
        use super::*;
        use fabric_orchagent::route::PacketIn;
        use fabric_orchagent::{ControllerEvent, FabricConfig, FabricDaemon, FabricNotification};
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;

        #[tokio::test]
        async fn test_daemon_end_to_end() {
            let transport = Arc::new(MockTransport::new());
            let config = FabricConfig {
                topology_refresh_delay_ms: 10,
                heartbeat_interval_ms: 5,
                ..FabricConfig::default()
            };
            let mut daemon = FabricDaemon::new(config, transport.clone());
            let mut notifications = daemon.take_notifications().unwrap();
            let events = daemon.sender();
            let shutdown = CancellationToken::new();

            for n in 1..=3 {
                events.send(ControllerEvent::SwitchAdded(sw(n))).unwrap();
            }
            for l in line_links() {
                events.send(ControllerEvent::LinkAdded(l)).unwrap();
            }
            events
                .send(ControllerEvent::AddressObserved {
                    address: HostAddress::Ipv4(host(1).ip),
                    point: at(1, 1),
                })
                .unwrap();
            events
                .send(ControllerEvent::AddressObserved {
                    address: HostAddress::Ipv4(host(2).ip),
                    point: at(3, 1),
                })
                .unwrap();

            let driver = {
                let events = events.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    // Let the debounced rebuild land first.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    events
                        .send(ControllerEvent::PacketIn(PacketIn {
                            src_ip: host(1).ip,
                            dst_ip: host(2).ip,
                            src_mac: host(1).mac,
                            dst_mac: host(2).mac,
                            protocol: 6,
                        }))
                        .unwrap();
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    events
                        .send(ControllerEvent::AddressExpired(HostAddress::Ipv4(host(2).ip)))
                        .unwrap();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    shutdown.cancel();
                })
            };

            daemon.run(shutdown).await;
            driver.await.unwrap();

            let flows = transport.flows();
            let table_miss = flows.iter().filter(|f| f.action == FlowAction::Controller).count();
            assert_eq!(table_miss, 3);
            assert_eq!(flows.len() - table_miss, 10);
            assert_eq!(daemon.attachments().len(), 1);

            let mut seen = Vec::new();
            while let Ok(notification) = notifications.try_recv() {
                seen.push(notification);
            }
            assert!(seen.contains(&FabricNotification::HostAdded {
                address: HostAddress::Ipv4(host(1).ip),
                node: sw(1),
            }));
            assert!(seen.contains(&FabricNotification::HostRemoved(HostAddress::Ipv4(host(2).ip))));
            assert!(seen.iter().any(|n| matches!(
                n,
                FabricNotification::RouteCompleted { result: Ok(()), .. }
            )));
        }
    }
}
