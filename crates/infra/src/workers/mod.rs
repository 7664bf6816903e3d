//! Background workers: bus subscribers (threads) and periodic tasks (tokio).

pub mod audit_trail;
pub mod event_worker;
pub mod overdue_sweep;

pub use audit_trail::{AuditEntry, AuditTrail};
pub use event_worker::{EventWorker, WorkerHandle};
pub use overdue_sweep::spawn_overdue_sweep;
