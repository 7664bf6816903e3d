//! Per-request audit history, fed from the event bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use equiplend_core::{RequestId, UserId};
use equiplend_events::{EventBus, EventEnvelope};
use equiplend_lending::{LendingEvent, RequestStatus};

use super::event_worker::{EventWorker, WorkerHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub sequence_number: u64,
    pub event_id: Uuid,
    pub event_type: String,
    pub status: RequestStatus,
    pub actor: Option<UserId>,
    /// Rejection reason or return notes.
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    fn from_envelope(envelope: &EventEnvelope<LendingEvent>) -> Self {
        let event = envelope.payload();
        let (actor, detail) = match event {
            LendingEvent::RequestSubmitted(e) => (Some(e.requester), None),
            LendingEvent::RequestApproved(e) => (Some(e.approver), None),
            LendingEvent::RequestRejected(e) => (Some(e.approver), Some(e.reason.clone())),
            LendingEvent::RequestIssued(e) => (Some(e.issuer), None),
            LendingEvent::RequestReturned(e) => (Some(e.processor), e.notes.clone()),
            LendingEvent::RequestCancelled(e) => (Some(e.cancelled_by), None),
            LendingEvent::RequestMarkedOverdue(_) => (None, None),
        };

        Self {
            sequence_number: envelope.sequence_number(),
            event_id: envelope.event_id(),
            event_type: envelope.event_type().to_string(),
            status: event.resulting_status(),
            actor,
            detail,
            occurred_at: envelope.occurred_at(),
        }
    }
}

/// In-memory audit read model.
///
/// Idempotent: re-delivered envelopes (same sequence number) are ignored,
/// and entries are kept in sequence order regardless of arrival order.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: RwLock<HashMap<RequestId, Vec<AuditEntry>>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, envelope: &EventEnvelope<LendingEvent>) {
        let request_id = envelope.payload().request_id();
        let entry = AuditEntry::from_envelope(envelope);

        let Ok(mut map) = self.entries.write() else {
            return;
        };
        let history = map.entry(request_id).or_default();
        if history
            .iter()
            .any(|e| e.sequence_number == entry.sequence_number)
        {
            return;
        }
        let at = history.partition_point(|e| e.sequence_number < entry.sequence_number);
        history.insert(at, entry);
    }

    pub fn history(&self, request_id: RequestId) -> Vec<AuditEntry> {
        self.entries
            .read()
            .ok()
            .and_then(|m| m.get(&request_id).cloned())
            .unwrap_or_default()
    }

    /// Subscribe this trail to `bus` on a background thread.
    pub fn spawn_worker<B>(self: &Arc<Self>, bus: &B) -> std::io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<LendingEvent>> + ?Sized,
    {
        let trail = Arc::clone(self);
        EventWorker::spawn("audit-trail", bus, move |envelope: EventEnvelope<LendingEvent>| {
            trail.apply(&envelope);
            Ok::<(), std::convert::Infallible>(())
        })
    }
}
