//! Host attachment table.
//!
//! The only place a logical address is resolved to a physical location.
//! Network-layer and link-layer addresses share the table and the same
//! first-writer-wins rule: once an address has an attachment, conflicting
//! reports are logged and dropped until the address is removed.

use fabric_orch_common::SyncMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::net::Ipv4Addr;
use std::sync::Arc;

use super::types::{AttachmentPoint, AttachmentRecord, HostAddress};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::topology::NodeId;

/// Receives host lifecycle events.
pub trait HostEventSink: Send + Sync {
    fn host_added(&self, address: &HostAddress, node: &NodeId);
    fn host_removed(&self, address: &HostAddress);
}

/// Result of [`AttachmentTable::set_attachment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// New address recorded, host-added emitted.
    Added,
    /// Same attachment reported again.
    Unchanged,
    /// Address already attached elsewhere; the existing record was kept.
    Conflict { existing: AttachmentPoint },
}

#[derive(Default)]
pub struct AttachmentTable {
    records: RwLock<SyncMap<HostAddress, AttachmentRecord>>,
    sink: RwLock<Option<Arc<dyn HostEventSink>>>,
}

impl AttachmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sink(&self, sink: Arc<dyn HostEventSink>) {
        *self.sink.write() = Some(sink);
    }

    pub fn set_attachment(&self, address: HostAddress, point: AttachmentPoint) -> AttachOutcome {
        let outcome = {
            let mut records = self.records.write();
            match records.get(&address) {
                Some(existing) if existing.point == point => AttachOutcome::Unchanged,
                Some(existing) => AttachOutcome::Conflict {
                    existing: existing.point.clone(),
                },
                None => {
                    records.insert(address, AttachmentRecord::new(address, point.clone()));
                    AttachOutcome::Added
                }
            }
        };

        match &outcome {
            AttachOutcome::Added => {
                info!(
                    "AttachmentTable: Host {} attached at {}/{}",
                    address, point.node, point.port
                );
                audit_log!(AuditRecord::new(AuditCategory::HostAttachment, "AttachmentTable", "attach_host")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(address.to_string())
                    .with_object_type("host")
                    .with_details(serde_json::json!({
                        "node": point.node.as_str(),
                        "port": point.port.as_str(),
                    })));
                if let Some(sink) = self.sink.read().as_ref() {
                    sink.host_added(&address, &point.node);
                }
            }
            AttachOutcome::Unchanged => {
                debug!("AttachmentTable: Host {} already attached at {}", address, point.port);
            }
            AttachOutcome::Conflict { existing } => {
                warn!(
                    "AttachmentTable: Host {} reported at {} but already attached at {}, keeping existing",
                    address, point.port, existing.port
                );
                audit_log!(AuditRecord::new(AuditCategory::HostAttachment, "AttachmentTable", "attach_host")
                    .with_outcome(AuditOutcome::Denied)
                    .with_object_id(address.to_string())
                    .with_object_type("host")
                    .with_details(serde_json::json!({
                        "existing_port": existing.port.as_str(),
                        "reported_port": point.port.as_str(),
                    })));
            }
        }

        outcome
    }

    /// Deletes the record of `address`. Host-removed is emitted only if a
    /// record existed.
    pub fn remove_attachment(&self, address: &HostAddress) -> Option<AttachmentRecord> {
        let removed = self.records.write().remove(address);

        match &removed {
            Some(record) => {
                info!("AttachmentTable: Host {} detached from {}", address, record.port());
                audit_log!(AuditRecord::new(AuditCategory::HostAttachment, "AttachmentTable", "detach_host")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_id(address.to_string())
                    .with_object_type("host"));
                if let Some(sink) = self.sink.read().as_ref() {
                    sink.host_removed(address);
                }
            }
            None => debug!("AttachmentTable: Host {} not attached, nothing to remove", address),
        }

        removed
    }

    pub fn lookup(&self, address: &HostAddress) -> Option<AttachmentPoint> {
        self.records.read().get(address).map(|r| r.point.clone())
    }

    pub fn lookup_ipv4(&self, ip: Ipv4Addr) -> Option<AttachmentPoint> {
        self.lookup(&HostAddress::Ipv4(ip))
    }

    pub fn record(&self, address: &HostAddress) -> Option<AttachmentRecord> {
        self.records.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Attached addresses, sorted.
    pub fn addresses(&self) -> Vec<HostAddress> {
        let mut addresses: Vec<_> = self.records.read().keys().copied().collect();
        addresses.sort();
        addresses
    }
}
