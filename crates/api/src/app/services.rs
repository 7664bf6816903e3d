//! Service wiring: repository, event bus, lending service and audit worker.

use std::sync::Arc;

use equiplend_core::{Clock, SystemClock};
use equiplend_events::{EventEnvelope, InMemoryEventBus};
use equiplend_infra::workers::{AuditTrail, WorkerHandle};
use equiplend_infra::{InMemoryLendingRepository, LendingRepository, LendingService};
use equiplend_lending::LendingEvent;

pub type SharedRepository = Arc<dyn LendingRepository>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<LendingEvent>>>;
pub type Lending = LendingService<SharedRepository, SharedBus>;

/// Everything a handler needs, shared behind one `Arc`.
pub struct AppServices {
    lending: Arc<Lending>,
    bus: SharedBus,
    audit: Arc<AuditTrail>,
    audit_worker: Option<WorkerHandle>,
}

impl AppServices {
    /// Wire the services over `repo`, subscribing the audit trail before any
    /// event can be published.
    pub fn new(repo: SharedRepository, clock: Arc<dyn Clock>) -> std::io::Result<Self> {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let audit = Arc::new(AuditTrail::new());
        let audit_worker = audit.spawn_worker(&bus)?;

        Ok(Self {
            lending: Arc::new(LendingService::new(repo, Arc::clone(&bus), clock)),
            bus,
            audit,
            audit_worker: Some(audit_worker),
        })
    }

    /// In-memory repository and the wall clock.
    pub fn in_memory() -> std::io::Result<Self> {
        Self::new(
            Arc::new(InMemoryLendingRepository::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn lending(&self) -> &Arc<Lending> {
        &self.lending
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }
}

impl Drop for AppServices {
    fn drop(&mut self) {
        // Closing the bus disconnects the worker's subscription.
        self.bus.close();
        if let Some(worker) = self.audit_worker.take() {
            worker.shutdown();
        }
    }
}
