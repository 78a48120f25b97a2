//! HostOrch implementation.

use async_trait::async_trait;
use fabric_orch_common::{Consumer, ConsumerConfig, Operation, Orch, SyncEvent};
use log::debug;
use std::sync::Arc;

use super::table::{AttachOutcome, AttachmentTable};
use super::types::{AttachmentPoint, HostAddress};

/// Address reports from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    AddressObserved {
        address: HostAddress,
        point: AttachmentPoint,
    },
    AddressExpired(HostAddress),
}

impl HostEvent {
    pub fn address(&self) -> &HostAddress {
        match self {
            HostEvent::AddressObserved { address, .. } | HostEvent::AddressExpired(address) => {
                address
            }
        }
    }
}

impl SyncEvent for HostEvent {
    fn key(&self) -> String {
        format!("host:{}", self.address())
    }

    fn op(&self) -> Operation {
        match self {
            HostEvent::AddressObserved { .. } => Operation::Set,
            HostEvent::AddressExpired(_) => Operation::Del,
        }
    }
}

/// Callbacks for HostOrch to reach the forwarding layer.
#[async_trait]
pub trait HostOrchCallbacks: Send + Sync {
    /// Called after an address lost its attachment record.
    async fn on_host_removed(&self, address: &HostAddress);
}

#[derive(Debug, Clone, Default)]
pub struct HostOrchStats {
    pub hosts_added: u64,
    pub hosts_removed: u64,
    pub conflicts: u64,
}

/// Applies address reports to the shared [`AttachmentTable`].
pub struct HostOrch {
    consumer: Consumer<HostEvent>,
    table: Arc<AttachmentTable>,
    callbacks: Option<Arc<dyn HostOrchCallbacks>>,
    stats: HostOrchStats,
}

impl HostOrch {
    pub fn new(table: Arc<AttachmentTable>) -> Self {
        Self {
            consumer: Consumer::new(ConsumerConfig::new("HOST_EVENTS").with_priority(5)),
            table,
            callbacks: None,
            stats: HostOrchStats::default(),
        }
    }

    pub fn set_callbacks(&mut self, callbacks: Arc<dyn HostOrchCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn enqueue(&mut self, event: HostEvent) {
        self.consumer.push(event);
    }

    pub fn table(&self) -> &Arc<AttachmentTable> {
        &self.table
    }

    pub fn stats(&self) -> &HostOrchStats {
        &self.stats
    }

    async fn expire(&mut self, address: HostAddress) {
        if self.table.remove_attachment(&address).is_none() {
            return;
        }
        self.stats.hosts_removed += 1;
        if let Some(callbacks) = &self.callbacks {
            callbacks.on_host_removed(&address).await;
        }
    }
}

#[async_trait]
impl Orch for HostOrch {
    fn name(&self) -> &str {
        "HostOrch"
    }

    fn priority(&self) -> i32 {
        self.consumer.priority()
    }

    async fn do_task(&mut self) {
        for event in self.consumer.drain() {
            match event {
                HostEvent::AddressObserved { address, point } => {
                    match self.table.set_attachment(address, point) {
                        AttachOutcome::Added => self.stats.hosts_added += 1,
                        AttachOutcome::Conflict { .. } => self.stats.conflicts += 1,
                        AttachOutcome::Unchanged => {}
                    }
                }
                HostEvent::AddressExpired(address) => {
                    debug!("HostOrch: Address {} expired", address);
                    self.expire(address).await;
                }
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
