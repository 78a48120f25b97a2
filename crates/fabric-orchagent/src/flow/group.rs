//! Multicast fan-out group reconciliation.
//!
//! Each switch keeps, per multicast consumer, one ALL group whose buckets
//! output toward every source that registered through that switch. A
//! consumer has one group id, shared by all switches holding a group for
//! it and released when the last of them is removed.
//!
//! Group tables are locked per switch with an async mutex held across the
//! transport call, so two consumers arriving on the same switch can never
//! both build an update from the same bucket snapshot.

use fabric_orch_common::{HasRefCount, IdAllocator, SyncMap};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::transport::{SwitchTransport, TransportError};
use super::types::{Bucket, BucketId, GroupId, GroupSpec};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::topology::{NodeId, PortId};

/// Result of [`GroupTable::upsert_member`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupChange {
    /// New group installed; a flow pointing at it must be written.
    Created(GroupId),
    /// Port was already a member.
    Unchanged(GroupId),
    /// Port appended to an existing group.
    Extended(GroupId),
}

impl GroupChange {
    pub fn group_id(&self) -> GroupId {
        match self {
            GroupChange::Created(id) | GroupChange::Unchanged(id) | GroupChange::Extended(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    #[error("group write failed: {0}")]
    Transport(#[from] TransportError),

    #[error("group id space exhausted")]
    IdsExhausted,
}

/// Group id of one consumer, counted once per switch holding its group.
#[derive(Debug, Clone)]
struct GroupIdEntry {
    group_id: GroupId,
    switches: u32,
}

impl HasRefCount for GroupIdEntry {
    fn increment_ref(&mut self) -> u32 {
        self.switches += 1;
        self.switches
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        if self.switches == 0 {
            None
        } else {
            self.switches -= 1;
            Some(self.switches)
        }
    }

    fn ref_count(&self) -> u32 {
        self.switches
    }
}

/// A group installed on a switch and whether the flow applying it was
/// written.
#[derive(Debug, Clone)]
struct InstalledGroup {
    spec: GroupSpec,
    flow_installed: bool,
}

/// Groups installed on one switch, by consumer.
#[derive(Debug, Default)]
struct SwitchGroups {
    groups: BTreeMap<Ipv4Addr, InstalledGroup>,
}

pub struct GroupTable {
    transport: Arc<dyn SwitchTransport>,
    switches: parking_lot::Mutex<HashMap<NodeId, Arc<Mutex<SwitchGroups>>>>,
    registry: parking_lot::Mutex<SyncMap<Ipv4Addr, GroupIdEntry>>,
    group_ids: IdAllocator,
    bucket_ids: IdAllocator,
}

impl GroupTable {
    pub fn new(transport: Arc<dyn SwitchTransport>) -> Self {
        Self {
            transport,
            switches: parking_lot::Mutex::new(HashMap::new()),
            registry: parking_lot::Mutex::new(SyncMap::new()),
            group_ids: IdAllocator::new(1),
            bucket_ids: IdAllocator::new(1),
        }
    }

    fn switch_groups(&self, node: &NodeId) -> Arc<Mutex<SwitchGroups>> {
        let mut switches = self.switches.lock();
        Arc::clone(
            switches
                .entry(node.clone())
                .or_insert_with(|| Arc::new(Mutex::new(SwitchGroups::default()))),
        )
    }

    fn next_bucket_id(&self) -> Result<BucketId, GroupError> {
        BucketId::try_from(self.bucket_ids.next_id()).map_err(|_| GroupError::IdsExhausted)
    }

    /// Returns the consumer's group id, allocating one on first use, and
    /// counts one more switch against it.
    fn acquire_group_id(&self, consumer: Ipv4Addr) -> Result<GroupId, GroupError> {
        let mut registry = self.registry.lock();
        if let Some(entry) = registry.get_mut(&consumer) {
            entry.increment_ref();
            return Ok(entry.group_id);
        }
        let group_id =
            GroupId::try_from(self.group_ids.next_id()).map_err(|_| GroupError::IdsExhausted)?;
        registry.insert(
            consumer,
            GroupIdEntry {
                group_id,
                switches: 1,
            },
        );
        Ok(group_id)
    }

    /// Drops one switch from the consumer's count; the id is released at zero.
    fn release_group_id(&self, consumer: Ipv4Addr) {
        let mut registry = self.registry.lock();
        match registry.decrement_ref(&consumer) {
            Ok(0) => {
                registry.remove(&consumer);
                debug!("GroupTable: Released group id of consumer {}", consumer);
            }
            Ok(_) => {}
            Err(e) => warn!("GroupTable: Releasing group id of {}: {}", consumer, e),
        }
    }

    async fn create_group(
        &self,
        table: &mut SwitchGroups,
        node: &NodeId,
        consumer: Ipv4Addr,
        port: &PortId,
    ) -> Result<GroupChange, GroupError> {
        let group_id = self.acquire_group_id(consumer)?;
        let bucket = Bucket {
            id: self.next_bucket_id()?,
            port: port.clone(),
        };
        let group = GroupSpec::new(node.clone(), group_id, vec![bucket]);

        if let Err(e) = self.transport.install_group(&group).await {
            self.release_group_id(consumer);
            error!("GroupTable: Failed to install group {} on {}: {}", group_id, node, e);
            audit_group(&group, consumer, "install_group", Some(&e));
            return Err(e.into());
        }

        info!(
            "GroupTable: Created group {} on {} for consumer {} -> {}",
            group_id, node, consumer, port
        );
        audit_group(&group, consumer, "install_group", None);
        table.groups.insert(
            consumer,
            InstalledGroup {
                spec: group,
                flow_installed: false,
            },
        );
        Ok(GroupChange::Created(group_id))
    }

    /// Makes `port` a member of the consumer's group on `node`.
    pub async fn upsert_member(
        &self,
        node: &NodeId,
        consumer: Ipv4Addr,
        port: &PortId,
    ) -> Result<GroupChange, GroupError> {
        let switch = self.switch_groups(node);
        let mut table = switch.lock().await;

        let existing = match table.groups.get(&consumer) {
            Some(existing) => existing.spec.clone(),
            None => return self.create_group(&mut table, node, consumer, port).await,
        };

        if existing.has_port(port) {
            debug!(
                "GroupTable: Port {} already in group {} on {}",
                port, existing.group_id, node
            );
            return Ok(GroupChange::Unchanged(existing.group_id));
        }

        let updated = existing.with_bucket(Bucket {
            id: self.next_bucket_id()?,
            port: port.clone(),
        });
        if let Err(e) = self.transport.update_group(&existing, &updated).await {
            error!(
                "GroupTable: Failed to update group {} on {}: {}",
                existing.group_id, node, e
            );
            audit_group(&updated, consumer, "update_group", Some(&e));
            return Err(e.into());
        }

        let group_id = updated.group_id;
        info!(
            "GroupTable: Added {} to group {} on {} ({} buckets)",
            port,
            group_id,
            node,
            updated.buckets.len()
        );
        audit_group(&updated, consumer, "update_group", None);
        if let Some(installed) = table.groups.get_mut(&consumer) {
            installed.spec = updated;
        }
        Ok(GroupChange::Extended(group_id))
    }

    /// Runs `write` for the flow applying the consumer's group on `node`
    /// unless that flow is already in place. The switch stays locked until
    /// the write returns, and a failed write is attempted again on the next
    /// call. Returns true if the flow was written by this call.
    pub async fn ensure_group_flow<F, Fut>(
        &self,
        node: &NodeId,
        consumer: Ipv4Addr,
        write: F,
    ) -> Result<bool, TransportError>
    where
        F: FnOnce(GroupId) -> Fut,
        Fut: Future<Output = Result<(), TransportError>>,
    {
        let switch = self.switch_groups(node);
        let mut table = switch.lock().await;

        let group_id = match table.groups.get(&consumer) {
            Some(installed) if !installed.flow_installed => installed.spec.group_id,
            Some(_) => return Ok(false),
            None => {
                debug!("GroupTable: No group for {} on {}, no flow to write", consumer, node);
                return Ok(false);
            }
        };

        write(group_id).await?;
        if let Some(installed) = table.groups.get_mut(&consumer) {
            installed.flow_installed = true;
        }
        Ok(true)
    }

    /// Returns true if the flow applying the consumer's group on `node` has
    /// been written.
    pub async fn has_group_flow(&self, node: &NodeId, consumer: Ipv4Addr) -> bool {
        let Some(switch) = self.switches.lock().get(node).cloned() else {
            return false;
        };
        let table = switch.lock().await;
        table
            .groups
            .get(&consumer)
            .is_some_and(|installed| installed.flow_installed)
    }

    /// Removes the consumer's group from every switch and releases its id.
    /// Returns the number of switches that held a group.
    pub async fn remove_consumer(&self, consumer: Ipv4Addr) -> usize {
        let mut switches: Vec<_> = self
            .switches
            .lock()
            .iter()
            .map(|(node, switch)| (node.clone(), Arc::clone(switch)))
            .collect();
        switches.sort_by(|a, b| a.0.cmp(&b.0));

        let mut removed = 0;
        for (_, switch) in switches {
            let mut table = switch.lock().await;
            let Some(InstalledGroup { spec: group, .. }) = table.groups.remove(&consumer) else {
                continue;
            };
            removed += 1;

            match self.transport.remove_group(&group.node, group.group_id).await {
                Ok(()) => audit_group(&group, consumer, "remove_group", None),
                Err(e) => {
                    error!(
                        "GroupTable: Failed to remove group {} on {}: {}",
                        group.group_id, group.node, e
                    );
                    audit_group(&group, consumer, "remove_group", Some(&e));
                }
            }

            // Released only once this switch's group is gone; a switch that
            // joined meanwhile still holds its own count on the id.
            self.release_group_id(consumer);
        }

        if removed > 0 {
            info!("GroupTable: Removed consumer {} from {} switches", consumer, removed);
        }
        removed
    }

    /// Forgets every group and group id without touching the switches.
    pub fn flush(&self) {
        let switches = std::mem::take(&mut *self.switches.lock());
        self.registry.lock().clear();
        info!("GroupTable: Flushed group state of {} switches", switches.len());
        audit_log!(AuditRecord::new(AuditCategory::GroupWrite, "GroupTable", "flush_groups")
            .with_outcome(AuditOutcome::Success)
            .with_details(serde_json::json!({ "switches": switches.len() })));
    }

    /// Installed group of `consumer` on `node`.
    pub async fn group(&self, node: &NodeId, consumer: Ipv4Addr) -> Option<GroupSpec> {
        let switch = self.switches.lock().get(node).cloned()?;
        let table = switch.lock().await;
        table.groups.get(&consumer).map(|installed| installed.spec.clone())
    }

    pub fn group_id(&self, consumer: Ipv4Addr) -> Option<GroupId> {
        self.registry.lock().get(&consumer).map(|e| e.group_id)
    }

    /// Number of switches holding a group for `consumer`.
    pub fn switch_count(&self, consumer: Ipv4Addr) -> u32 {
        self.registry.lock().ref_count(&consumer).unwrap_or(0)
    }
}

fn audit_group(group: &GroupSpec, consumer: Ipv4Addr, action: &str, error: Option<&TransportError>) {
    let record = AuditRecord::new(AuditCategory::GroupWrite, "GroupTable", action)
        .with_outcome(AuditOutcome::Success)
        .with_object_id(format!("{}/{}", group.node, group.group_id))
        .with_object_type("group")
        .with_details(serde_json::json!({
            "consumer": consumer.to_string(),
            "ports": group.ports().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
        }));
    match error {
        Some(e) => {
            audit_log!(record.with_error(e.to_string()));
        }
        None => {
            audit_log!(record);
        }
    }
}
