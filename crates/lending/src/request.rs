use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use equiplend_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, EquipmentId, RequestId, UserId,
};
use equiplend_events::Event;

use crate::status::RequestStatus;
use crate::window::BorrowWindow;

/// Aggregate root: BorrowRequest.
///
/// Holds the request's own rules (status transitions, field validation, audit
/// stamps). Rules that need other records (capacity across overlapping
/// requests, stock on hand) are checked by the lending service before it
/// applies the events decided here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRequest {
    id: RequestId,
    requester: UserId,
    equipment_id: EquipmentId,
    quantity: u32,
    purpose: String,
    window: BorrowWindow,
    status: RequestStatus,
    requested_at: DateTime<Utc>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    issued_at: Option<DateTime<Utc>>,
    returned_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    notes: Option<String>,
    version: u64,
}

/// Flat, serializable view of a borrow request (persistence + API).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub id: RequestId,
    pub requester: UserId,
    pub equipment_id: EquipmentId,
    pub quantity: u32,
    pub purpose: String,
    #[serde(flatten)]
    pub window: BorrowWindow,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub version: u64,
}

impl BorrowRequest {
    /// Decide whether a new request may be opened.
    ///
    /// Checks what the request alone can know: `quantity >= 1`, a non-blank
    /// purpose, and a window that does not start before `occurred_at`.
    pub fn submit(cmd: &SubmitRequest) -> DomainResult<LendingEvent> {
        if cmd.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.purpose.trim().is_empty() {
            return Err(DomainError::validation("purpose cannot be empty"));
        }
        if cmd.window.starts_before(cmd.occurred_at) {
            return Err(DomainError::validation("borrow_from cannot be in the past"));
        }

        Ok(LendingEvent::RequestSubmitted(RequestSubmitted {
            request_id: cmd.request_id,
            requester: cmd.requester,
            equipment_id: cmd.equipment_id,
            quantity: cmd.quantity,
            purpose: cmd.purpose.trim().to_string(),
            window: cmd.window,
            occurred_at: cmd.occurred_at,
        }))
    }

    /// Build the aggregate from its creation event.
    pub fn from_submitted(e: &RequestSubmitted) -> Self {
        Self {
            id: e.request_id,
            requester: e.requester,
            equipment_id: e.equipment_id,
            quantity: e.quantity,
            purpose: e.purpose.clone(),
            window: e.window,
            status: RequestStatus::Pending,
            requested_at: e.occurred_at,
            approved_by: None,
            approved_at: None,
            issued_at: None,
            returned_at: None,
            rejection_reason: None,
            notes: None,
            version: 1,
        }
    }

    /// Rehydrate from storage.
    pub fn restore(s: RequestSnapshot) -> Self {
        Self {
            id: s.id,
            requester: s.requester,
            equipment_id: s.equipment_id,
            quantity: s.quantity,
            purpose: s.purpose,
            window: s.window,
            status: s.status,
            requested_at: s.requested_at,
            approved_by: s.approved_by,
            approved_at: s.approved_at,
            issued_at: s.issued_at,
            returned_at: s.returned_at,
            rejection_reason: s.rejection_reason,
            notes: s.notes,
            version: s.version,
        }
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            id: self.id,
            requester: self.requester,
            equipment_id: self.equipment_id,
            quantity: self.quantity,
            purpose: self.purpose.clone(),
            window: self.window,
            status: self.status,
            requested_at: self.requested_at,
            approved_by: self.approved_by,
            approved_at: self.approved_at,
            issued_at: self.issued_at,
            returned_at: self.returned_at,
            rejection_reason: self.rejection_reason.clone(),
            notes: self.notes.clone(),
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn requester(&self) -> UserId {
        self.requester
    }

    pub fn equipment_id(&self) -> EquipmentId {
        self.equipment_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn window(&self) -> BorrowWindow {
        self.window
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Handed out and past its window end.
    ///
    /// Holds whether or not the status has been materialised as `overdue`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RequestStatus::Issued => self.window.ended_before(now),
            RequestStatus::Overdue => true,
            _ => false,
        }
    }

    /// Counts against the item's capacity over its window.
    pub fn holds_capacity(&self) -> bool {
        self.status.holds_capacity()
    }
}

impl AggregateRoot for BorrowRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: SubmitRequest (creation; decided by [`BorrowRequest::submit`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request_id: RequestId,
    pub requester: UserId,
    pub equipment_id: EquipmentId,
    pub quantity: u32,
    pub purpose: String,
    pub window: BorrowWindow,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub request_id: RequestId,
    pub approver: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub request_id: RequestId,
    pub approver: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRequest {
    pub request_id: RequestId,
    pub issuer: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub request_id: RequestId,
    pub processor: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub request_id: RequestId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOverdue {
    pub request_id: RequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Transitions of an existing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LendingCommand {
    Approve(ApproveRequest),
    Reject(RejectRequest),
    Issue(IssueRequest),
    Return(ReturnRequest),
    Cancel(CancelRequest),
    MarkOverdue(MarkOverdue),
}

impl LendingCommand {
    pub fn request_id(&self) -> RequestId {
        match self {
            LendingCommand::Approve(c) => c.request_id,
            LendingCommand::Reject(c) => c.request_id,
            LendingCommand::Issue(c) => c.request_id,
            LendingCommand::Return(c) => c.request_id,
            LendingCommand::Cancel(c) => c.request_id,
            LendingCommand::MarkOverdue(c) => c.request_id,
        }
    }
}

/// Event: RequestSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub request_id: RequestId,
    pub requester: UserId,
    pub equipment_id: EquipmentId,
    pub quantity: u32,
    pub purpose: String,
    pub window: BorrowWindow,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub approver: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub approver: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestIssued {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub issuer: UserId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestReturned {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub processor: UserId,
    pub quantity: u32,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCancelled {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestMarkedOverdue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMarkedOverdue {
    pub request_id: RequestId,
    pub equipment_id: EquipmentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LendingEvent {
    RequestSubmitted(RequestSubmitted),
    RequestApproved(RequestApproved),
    RequestRejected(RequestRejected),
    RequestIssued(RequestIssued),
    RequestReturned(RequestReturned),
    RequestCancelled(RequestCancelled),
    RequestMarkedOverdue(RequestMarkedOverdue),
}

impl LendingEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            LendingEvent::RequestSubmitted(e) => e.request_id,
            LendingEvent::RequestApproved(e) => e.request_id,
            LendingEvent::RequestRejected(e) => e.request_id,
            LendingEvent::RequestIssued(e) => e.request_id,
            LendingEvent::RequestReturned(e) => e.request_id,
            LendingEvent::RequestCancelled(e) => e.request_id,
            LendingEvent::RequestMarkedOverdue(e) => e.request_id,
        }
    }

    /// The status a request is in right after this event.
    pub fn resulting_status(&self) -> RequestStatus {
        match self {
            LendingEvent::RequestSubmitted(_) => RequestStatus::Pending,
            LendingEvent::RequestApproved(_) => RequestStatus::Approved,
            LendingEvent::RequestRejected(_) => RequestStatus::Rejected,
            LendingEvent::RequestIssued(_) => RequestStatus::Issued,
            LendingEvent::RequestReturned(_) => RequestStatus::Returned,
            LendingEvent::RequestCancelled(_) => RequestStatus::Cancelled,
            LendingEvent::RequestMarkedOverdue(_) => RequestStatus::Overdue,
        }
    }
}

impl Event for LendingEvent {
    const STREAM_TYPE: &'static str = "lending.borrow_request";

    fn event_type(&self) -> &'static str {
        match self {
            LendingEvent::RequestSubmitted(_) => "lending.request.submitted",
            LendingEvent::RequestApproved(_) => "lending.request.approved",
            LendingEvent::RequestRejected(_) => "lending.request.rejected",
            LendingEvent::RequestIssued(_) => "lending.request.issued",
            LendingEvent::RequestReturned(_) => "lending.request.returned",
            LendingEvent::RequestCancelled(_) => "lending.request.cancelled",
            LendingEvent::RequestMarkedOverdue(_) => "lending.request.marked_overdue",
        }
    }

    fn stream_id(&self) -> Uuid {
        *self.request_id().as_uuid()
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LendingEvent::RequestSubmitted(e) => e.occurred_at,
            LendingEvent::RequestApproved(e) => e.occurred_at,
            LendingEvent::RequestRejected(e) => e.occurred_at,
            LendingEvent::RequestIssued(e) => e.occurred_at,
            LendingEvent::RequestReturned(e) => e.occurred_at,
            LendingEvent::RequestCancelled(e) => e.occurred_at,
            LendingEvent::RequestMarkedOverdue(e) => e.occurred_at,
        }
    }
}

impl Aggregate for BorrowRequest {
    type Command = LendingCommand;
    type Event = LendingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LendingEvent::RequestSubmitted(e) => {
                let version = self.version;
                *self = Self::from_submitted(e);
                self.version = version;
            }
            LendingEvent::RequestApproved(e) => {
                self.approved_by = Some(e.approver);
                self.approved_at = Some(e.occurred_at);
            }
            LendingEvent::RequestRejected(e) => {
                self.approved_by = Some(e.approver);
                self.approved_at = Some(e.occurred_at);
                self.rejection_reason = Some(e.reason.clone());
            }
            LendingEvent::RequestIssued(e) => {
                self.issued_at = Some(e.occurred_at);
            }
            LendingEvent::RequestReturned(e) => {
                self.returned_at = Some(e.occurred_at);
                if let Some(notes) = &e.notes {
                    self.notes = Some(notes.clone());
                }
            }
            LendingEvent::RequestCancelled(_) | LendingEvent::RequestMarkedOverdue(_) => {}
        }
        self.status = event.resulting_status();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        self.ensure_request_id(command.request_id())?;

        match command {
            LendingCommand::Approve(cmd) => self.handle_approve(cmd),
            LendingCommand::Reject(cmd) => self.handle_reject(cmd),
            LendingCommand::Issue(cmd) => self.handle_issue(cmd),
            LendingCommand::Return(cmd) => self.handle_return(cmd),
            LendingCommand::Cancel(cmd) => self.handle_cancel(cmd),
            LendingCommand::MarkOverdue(cmd) => self.handle_mark_overdue(cmd),
        }
    }
}

impl BorrowRequest {
    fn ensure_request_id(&self, request_id: RequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::validation("request_id mismatch"));
        }
        Ok(())
    }

    fn ensure_transition(&self, next: RequestStatus, action: &str) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::state_conflict(format!(
                "cannot {action} a request that is {}",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_approve(&self, cmd: &ApproveRequest) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Approved, "approve")?;

        Ok(vec![LendingEvent::RequestApproved(RequestApproved {
            request_id: self.id,
            equipment_id: self.equipment_id,
            approver: cmd.approver,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectRequest) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Rejected, "reject")?;

        Ok(vec![LendingEvent::RequestRejected(RequestRejected {
            request_id: self.id,
            equipment_id: self.equipment_id,
            approver: cmd.approver,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue(&self, cmd: &IssueRequest) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Issued, "issue")?;

        Ok(vec![LendingEvent::RequestIssued(RequestIssued {
            request_id: self.id,
            equipment_id: self.equipment_id,
            issuer: cmd.issuer,
            quantity: self.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnRequest) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Returned, "return")?;

        let notes = cmd
            .notes
            .as_ref()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(vec![LendingEvent::RequestReturned(RequestReturned {
            request_id: self.id,
            equipment_id: self.equipment_id,
            processor: cmd.processor,
            quantity: self.quantity,
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelRequest) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Cancelled, "cancel")?;

        Ok(vec![LendingEvent::RequestCancelled(RequestCancelled {
            request_id: self.id,
            equipment_id: self.equipment_id,
            cancelled_by: cmd.cancelled_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_overdue(&self, cmd: &MarkOverdue) -> Result<Vec<LendingEvent>, DomainError> {
        self.ensure_transition(RequestStatus::Overdue, "mark overdue")?;

        if !self.window.ended_before(cmd.occurred_at) {
            return Err(DomainError::state_conflict(format!(
                "request is not past due (borrow_until: {})",
                self.window.until().to_rfc3339()
            )));
        }

        Ok(vec![LendingEvent::RequestMarkedOverdue(RequestMarkedOverdue {
            request_id: self.id,
            equipment_id: self.equipment_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
