//! Lending service: the request lifecycle pipeline.
//!
//! Every mutating operation follows the same shape:
//!
//! ```text
//! lock equipment → load → decide (aggregate) → cross-record checks → apply → commit → publish
//! ```
//!
//! The per-equipment lock closes the check-then-commit window for capacity
//! and counter updates within this process. Across processes the repository
//! re-evaluates the commit's [`LineEffect`] while holding the equipment line,
//! and the request version check catches a transition that lost the race.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use equiplend_auth::Caller;
use equiplend_core::{
    Aggregate, AggregateRoot, CategoryId, Clock, DomainError, EquipmentId, ExpectedVersion,
    RequestId,
};
use equiplend_events::{EventBus, EventEnvelope};
use equiplend_inventory::{
    CategoryUpdate, Equipment, EquipmentCategory, EquipmentUpdate, NewCategory, NewEquipment,
};
use equiplend_lending::{
    ApproveRequest, AvailabilityReport, BorrowRequest, BorrowWindow, CancelRequest, IssueRequest,
    LendingCommand, LendingEvent, MarkOverdue, RejectRequest, RequestStatus, ReturnRequest,
    SubmitRequest, availability_report, check_availability, compute_available_quantity,
};

use crate::locks::EquipmentLocks;
use crate::query;
use crate::repository::{LendingRepository, LineEffect, RepositoryError, RequestCriteria};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LendingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Stale version: another writer committed first.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Store(String),
}

impl From<DomainError> for LendingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LendingError::Validation(msg),
            DomainError::InvalidId(msg) => LendingError::Validation(msg),
            DomainError::Unavailable(msg) => LendingError::Unavailable(msg),
            DomainError::StateConflict(msg) => LendingError::StateConflict(msg),
        }
    }
}

impl From<RepositoryError> for LendingError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Concurrency(msg) => LendingError::Conflict(msg),
            RepositoryError::NotFound(what) => LendingError::NotFound(what),
            RepositoryError::Unavailable(msg) => LendingError::Unavailable(msg),
            RepositoryError::Referenced(msg) => LendingError::StateConflict(msg),
            RepositoryError::Backend(msg) => LendingError::Store(msg),
        }
    }
}

/// Input for opening a borrow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBorrowRequest {
    pub equipment_id: EquipmentId,
    pub quantity: u32,
    pub window: BorrowWindow,
    pub purpose: String,
}

pub struct LendingService<R, B> {
    repo: R,
    bus: B,
    clock: Arc<dyn Clock>,
    locks: EquipmentLocks,
}

impl<R, B> LendingService<R, B> {
    pub fn new(repo: R, bus: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            bus,
            clock,
            locks: EquipmentLocks::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl<R, B> LendingService<R, B>
where
    R: LendingRepository,
    B: EventBus<EventEnvelope<LendingEvent>>,
{
    // ─────────────────────────────────────────────────────────────────────
    // Categories
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, new), fields(user_id = %caller.user_id), err)]
    pub async fn create_category(
        &self,
        caller: &Caller,
        new: NewCategory,
    ) -> Result<EquipmentCategory, LendingError> {
        let category = EquipmentCategory::create(CategoryId::new(), new, self.now())?;
        self.ensure_category_name_unique(&category).await?;

        self.repo.save_category(&category).await?;
        info!(category_id = %category.id_typed(), name = category.name(), "category created");
        Ok(category)
    }

    #[instrument(skip(self, update), fields(user_id = %caller.user_id, category_id = %id), err)]
    pub async fn update_category(
        &self,
        caller: &Caller,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<EquipmentCategory, LendingError> {
        let mut category = self.get_category(id).await?;
        category.update(update)?;
        self.ensure_category_name_unique(&category).await?;

        self.repo.save_category(&category).await?;
        info!(category_id = %id, "category updated");
        Ok(category)
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<EquipmentCategory, LendingError> {
        self.repo
            .get_category(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("category {id}")))
    }

    /// Remove a category nothing is filed under.
    #[instrument(skip(self), fields(user_id = %caller.user_id, category_id = %id), err)]
    pub async fn delete_category(&self, caller: &Caller, id: CategoryId) -> Result<(), LendingError> {
        self.repo.delete_category(id).await?;
        info!(category_id = %id, "category deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inventory administration
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, new), fields(user_id = %caller.user_id), err)]
    pub async fn register_equipment(
        &self,
        caller: &Caller,
        new: NewEquipment,
    ) -> Result<Equipment, LendingError> {
        let equipment = Equipment::register(EquipmentId::new(), new, self.now())?;
        self.ensure_category_exists(&equipment).await?;
        self.ensure_serial_unique(&equipment).await?;

        self.repo.save_equipment(&equipment).await?;
        info!(
            equipment_id = %equipment.id_typed(),
            total_quantity = equipment.total_quantity(),
            "equipment registered"
        );
        Ok(equipment)
    }

    #[instrument(skip(self, update), fields(user_id = %caller.user_id, equipment_id = %id), err)]
    pub async fn update_equipment(
        &self,
        caller: &Caller,
        id: EquipmentId,
        update: EquipmentUpdate,
    ) -> Result<Equipment, LendingError> {
        let _guard = self.locks.acquire(id).await;

        let mut equipment = self.load_equipment(id).await?;
        equipment.update(update, self.now())?;
        self.ensure_category_exists(&equipment).await?;
        self.ensure_serial_unique(&equipment).await?;

        self.repo.save_equipment(&equipment).await?;
        info!(equipment_id = %id, "equipment updated");
        self.load_equipment(id).await
    }

    pub async fn get_equipment(&self, id: EquipmentId) -> Result<Equipment, LendingError> {
        self.load_equipment(id).await
    }

    /// Capacity left on `id` over `window`.
    pub async fn availability(
        &self,
        id: EquipmentId,
        window: BorrowWindow,
    ) -> Result<AvailabilityReport, LendingError> {
        let equipment = self.load_equipment(id).await?;
        let holding = self
            .repo
            .find_requests(&RequestCriteria::holding_capacity(id))
            .await?;
        Ok(availability_report(&equipment, &window, &holding))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Request lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Open a `pending` request for the caller.
    #[instrument(
        skip(self, input),
        fields(user_id = %caller.user_id, equipment_id = %input.equipment_id, quantity = input.quantity),
        err
    )]
    pub async fn create_request(
        &self,
        caller: &Caller,
        input: NewBorrowRequest,
    ) -> Result<BorrowRequest, LendingError> {
        let submitted = BorrowRequest::submit(&SubmitRequest {
            request_id: RequestId::new(),
            requester: caller.user_id,
            equipment_id: input.equipment_id,
            quantity: input.quantity,
            purpose: input.purpose,
            window: input.window,
            occurred_at: self.now(),
        })?;
        let LendingEvent::RequestSubmitted(created) = &submitted else {
            return Err(LendingError::Store(
                "submission produced an unexpected event".to_string(),
            ));
        };

        // Unknown ids never reach the lock table.
        self.load_equipment(input.equipment_id).await?;
        let _guard = self.locks.acquire(input.equipment_id).await;

        let equipment = self.load_equipment(input.equipment_id).await?;
        if input.quantity > equipment.total_quantity() {
            return Err(LendingError::Validation(format!(
                "quantity exceeds total stock (total: {}, requested: {})",
                equipment.total_quantity(),
                input.quantity
            )));
        }
        if !equipment.is_active() {
            return Err(LendingError::Unavailable(
                "equipment is not active".to_string(),
            ));
        }
        self.ensure_capacity(&equipment, &input.window, input.quantity, None)
            .await?;

        let request = BorrowRequest::from_submitted(created);
        self.repo
            .commit(&request, ExpectedVersion::New, LineEffect::Reserve)
            .await?;
        self.publish(&request, &[submitted]);

        info!(request_id = %request.id_typed(), "borrow request created");
        Ok(request)
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id), err)]
    pub async fn approve(
        &self,
        caller: &Caller,
        request_id: RequestId,
    ) -> Result<BorrowRequest, LendingError> {
        let command = LendingCommand::Approve(ApproveRequest {
            request_id,
            approver: caller.user_id,
            occurred_at: self.now(),
        });
        self.transition(request_id, command, LineEffect::Reserve).await
    }

    #[instrument(skip(self, reason), fields(user_id = %caller.user_id), err)]
    pub async fn reject(
        &self,
        caller: &Caller,
        request_id: RequestId,
        reason: String,
    ) -> Result<BorrowRequest, LendingError> {
        let command = LendingCommand::Reject(RejectRequest {
            request_id,
            approver: caller.user_id,
            reason,
            occurred_at: self.now(),
        });
        self.transition(request_id, command, LineEffect::None).await
    }

    #[instrument(skip(self), fields(user_id = %caller.user_id), err)]
    pub async fn issue(
        &self,
        caller: &Caller,
        request_id: RequestId,
    ) -> Result<BorrowRequest, LendingError> {
        let now = self.now();
        let command = LendingCommand::Issue(IssueRequest {
            request_id,
            issuer: caller.user_id,
            occurred_at: now,
        });
        self.transition(request_id, command, LineEffect::Checkout { at: now })
            .await
    }

    #[instrument(skip(self, notes), fields(user_id = %caller.user_id), err)]
    pub async fn return_equipment(
        &self,
        caller: &Caller,
        request_id: RequestId,
        notes: Option<String>,
    ) -> Result<BorrowRequest, LendingError> {
        let now = self.now();
        let command = LendingCommand::Return(ReturnRequest {
            request_id,
            processor: caller.user_id,
            notes,
            occurred_at: now,
        });
        self.transition(request_id, command, LineEffect::CheckIn { at: now })
            .await
    }

    /// Withdraw a request before anything is handed out.
    ///
    /// Students reach only their own requests; anyone else's is `NotFound`.
    #[instrument(skip(self), fields(user_id = %caller.user_id), err)]
    pub async fn cancel(
        &self,
        caller: &Caller,
        request_id: RequestId,
    ) -> Result<BorrowRequest, LendingError> {
        query::visible_request(&self.repo, caller, request_id).await?;

        let command = LendingCommand::Cancel(CancelRequest {
            request_id,
            cancelled_by: caller.user_id,
            occurred_at: self.now(),
        });
        self.transition(request_id, command, LineEffect::None).await
    }

    /// Materialise `issued → overdue` for every request past its window end.
    ///
    /// Idempotent: a request already moved (by a concurrent sweep or a return)
    /// is skipped.
    #[instrument(skip(self), err)]
    pub async fn sweep_overdue(&self) -> Result<Vec<RequestId>, LendingError> {
        let now = self.now();
        let due = self
            .repo
            .find_requests(&RequestCriteria {
                statuses: Some(vec![RequestStatus::Issued]),
                ended_before: Some(now),
                ..RequestCriteria::default()
            })
            .await?;

        let mut marked = Vec::new();
        for request in due {
            let request_id = request.id_typed();
            let command = LendingCommand::MarkOverdue(MarkOverdue {
                request_id,
                occurred_at: now,
            });
            match self.transition(request_id, command, LineEffect::None).await {
                Ok(_) => marked.push(request_id),
                Err(LendingError::StateConflict(reason)) | Err(LendingError::Conflict(reason)) => {
                    warn!(request_id = %request_id, %reason, "overdue sweep skipped request");
                }
                Err(e) => return Err(e),
            }
        }

        if !marked.is_empty() {
            info!(count = marked.len(), "requests marked overdue");
        }
        Ok(marked)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────

    async fn transition(
        &self,
        request_id: RequestId,
        command: LendingCommand,
        effect: LineEffect,
    ) -> Result<BorrowRequest, LendingError> {
        // 1) Find the equipment line to serialise on.
        let equipment_id = self.load_request(request_id).await?.equipment_id();
        let _guard = self.locks.acquire(equipment_id).await;

        // 2) Reload under the lock.
        let mut request = self.load_request(request_id).await?;
        let expected = ExpectedVersion::Exact(request.version());

        // 3) Decide (status rules).
        let events = request.handle(&command)?;
        if events.is_empty() {
            return Ok(request);
        }

        // 4) Cross-record rules, read ahead for a precise error. The commit
        //    evaluates the same effect again under the store's line lock.
        match effect {
            LineEffect::Reserve => {
                let equipment = self.load_equipment(equipment_id).await?;
                self.ensure_capacity(
                    &equipment,
                    &request.window(),
                    request.quantity(),
                    Some(request_id),
                )
                .await?;
            }
            LineEffect::Checkout { at } => {
                let mut equipment = self.load_equipment(equipment_id).await?;
                equipment.checkout(request.quantity(), at)?;
            }
            LineEffect::CheckIn { .. } | LineEffect::None => {}
        }

        // 5) Apply + commit atomically.
        request.apply_all(&events);
        self.repo.commit(&request, expected, effect).await?;

        // 6) Publish (after commit).
        self.publish(&request, &events);

        info!(
            request_id = %request_id,
            status = %request.status(),
            version = request.version(),
            "borrow request transitioned"
        );
        Ok(request)
    }

    async fn ensure_capacity(
        &self,
        equipment: &Equipment,
        window: &BorrowWindow,
        quantity: u32,
        exclude: Option<RequestId>,
    ) -> Result<(), LendingError> {
        let holding = self
            .repo
            .find_requests(&RequestCriteria::holding_capacity(equipment.id_typed()))
            .await?;

        if check_availability(equipment, window, quantity, &holding, exclude) {
            return Ok(());
        }

        let others: Vec<BorrowRequest> = holding
            .into_iter()
            .filter(|r| Some(r.id_typed()) != exclude)
            .collect();
        Err(LendingError::Unavailable(format!(
            "requested quantity not available for the selected period (available: {}, requested: {quantity})",
            compute_available_quantity(equipment, window, &others).max(0)
        )))
    }

    async fn ensure_category_exists(&self, equipment: &Equipment) -> Result<(), LendingError> {
        let Some(id) = equipment.category() else {
            return Ok(());
        };
        if self.repo.get_category(id).await?.is_none() {
            return Err(LendingError::Validation(format!("unknown category {id}")));
        }
        Ok(())
    }

    async fn ensure_category_name_unique(
        &self,
        category: &EquipmentCategory,
    ) -> Result<(), LendingError> {
        let taken = self
            .repo
            .list_categories()
            .await?
            .iter()
            .any(|c| c.id_typed() != category.id_typed() && c.name() == category.name());
        if taken {
            return Err(LendingError::Validation(format!(
                "category '{}' already exists",
                category.name()
            )));
        }
        Ok(())
    }

    async fn ensure_serial_unique(&self, equipment: &Equipment) -> Result<(), LendingError> {
        let Some(serial) = equipment.serial_number() else {
            return Ok(());
        };
        let taken = self
            .repo
            .list_equipment()
            .await?
            .iter()
            .any(|e| e.id_typed() != equipment.id_typed() && e.serial_number() == Some(serial));
        if taken {
            return Err(LendingError::Validation(format!(
                "serial_number '{serial}' is already registered"
            )));
        }
        Ok(())
    }

    async fn load_equipment(&self, id: EquipmentId) -> Result<Equipment, LendingError> {
        self.repo
            .get_equipment(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("equipment {id}")))
    }

    async fn load_request(&self, id: RequestId) -> Result<BorrowRequest, LendingError> {
        self.repo
            .get_request(id)
            .await?
            .ok_or_else(|| LendingError::NotFound(format!("request {id}")))
    }

    /// Publish committed events; the commit stands even if this fails.
    fn publish(&self, request: &BorrowRequest, events: &[LendingEvent]) {
        let first_seq = request.version() + 1 - events.len() as u64;
        for (offset, event) in events.iter().enumerate() {
            let envelope = EventEnvelope::seal(first_seq + offset as u64, event.clone());
            if let Err(err) = self.bus.publish(envelope) {
                warn!(
                    request_id = %request.id_typed(),
                    error = ?err,
                    "event publication failed after commit"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use equiplend_auth::Role;
    use equiplend_core::{FixedClock, UserId};
    use equiplend_inventory::EquipmentSnapshot;
    use equiplend_events::InMemoryEventBus;

    use crate::repository::InMemoryLendingRepository;

    type Service = LendingService<Arc<InMemoryLendingRepository>, Arc<InMemoryEventBus<EventEnvelope<LendingEvent>>>>;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        start() + Duration::days(n)
    }

    fn window(a: i64, b: i64) -> BorrowWindow {
        BorrowWindow::new(day(a), day(b)).unwrap()
    }

    fn setup() -> (Service, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(start()));
        let svc = LendingService::new(
            Arc::new(InMemoryLendingRepository::new()),
            Arc::new(InMemoryEventBus::new()),
            clock.clone(),
        );
        (svc, clock)
    }

    fn admin() -> Caller {
        Caller::new(UserId::new(), Role::Admin)
    }

    fn staff() -> Caller {
        Caller::new(UserId::new(), Role::Staff)
    }

    fn student() -> Caller {
        Caller::new(UserId::new(), Role::Student)
    }

    async fn projector(svc: &Service, total: u32) -> Equipment {
        svc.register_equipment(
            &admin(),
            NewEquipment {
                name: "Projector".to_string(),
                total_quantity: total,
                ..NewEquipment::default()
            },
        )
        .await
        .unwrap()
    }

    async fn request(
        svc: &Service,
        who: &Caller,
        eq: &Equipment,
        quantity: u32,
        w: BorrowWindow,
    ) -> Result<BorrowRequest, LendingError> {
        svc.create_request(
            who,
            NewBorrowRequest {
                equipment_id: eq.id_typed(),
                quantity,
                window: w,
                purpose: "Seminar".to_string(),
            },
        )
        .await
    }

    #[tokio::test]
    async fn overlapping_request_is_unavailable_after_approval() {
        let (svc, _) = setup();
        let eq = projector(&svc, 5).await;

        let r1 = request(&svc, &student(), &eq, 3, window(1, 3)).await.unwrap();
        svc.approve(&staff(), r1.id_typed()).await.unwrap();

        let err = request(&svc, &student(), &eq, 3, window(2, 4)).await.unwrap_err();
        assert!(matches!(err, LendingError::Unavailable(_)), "{err:?}");

        // Touching the end of R1 is fine.
        assert!(request(&svc, &student(), &eq, 3, window(3, 4)).await.is_ok());
    }

    #[tokio::test]
    async fn issue_then_return_restores_counter() {
        let (svc, _) = setup();
        let eq = projector(&svc, 5).await;
        let r = request(&svc, &student(), &eq, 2, window(1, 2)).await.unwrap();

        svc.approve(&staff(), r.id_typed()).await.unwrap();
        svc.issue(&staff(), r.id_typed()).await.unwrap();
        assert_eq!(svc.get_equipment(eq.id_typed()).await.unwrap().available_quantity(), 3);

        let returned = svc
            .return_equipment(&staff(), r.id_typed(), Some("all good".to_string()))
            .await
            .unwrap();
        assert_eq!(returned.status(), RequestStatus::Returned);
        assert_eq!(returned.notes(), Some("all good"));
        assert_eq!(svc.get_equipment(eq.id_typed()).await.unwrap().available_quantity(), 5);
    }

    #[tokio::test]
    async fn past_start_is_rejected() {
        let (svc, _) = setup();
        let eq = projector(&svc, 5).await;
        let w = BorrowWindow::new(start() - Duration::hours(2), day(1)).unwrap();

        let err = request(&svc, &student(), &eq, 1, w).await.unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
    }

    #[tokio::test]
    async fn quantity_above_total_is_validation_not_unavailable() {
        let (svc, _) = setup();
        let eq = projector(&svc, 5).await;

        let err = request(&svc, &student(), &eq, 6, window(1, 2)).await.unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn approve_rechecks_capacity() {
        let (svc, _) = setup();
        let eq = projector(&svc, 2).await;

        let a = request(&svc, &student(), &eq, 2, window(1, 3)).await.unwrap();
        let b = request(&svc, &student(), &eq, 2, window(2, 4)).await.unwrap();

        svc.approve(&staff(), a.id_typed()).await.unwrap();
        let err = svc.approve(&staff(), b.id_typed()).await.unwrap_err();
        assert!(matches!(err, LendingError::Unavailable(_)));

        let stored = query::visible_request(svc.repository(), &staff(), b.id_typed())
            .await
            .unwrap();
        assert_eq!(stored.status(), RequestStatus::Pending);
    }

    #[tokio::test]
    async fn issue_fails_when_shelf_is_empty() {
        let (svc, _) = setup();
        let eq = projector(&svc, 1).await;

        let a = request(&svc, &student(), &eq, 1, window(1, 2)).await.unwrap();
        svc.approve(&staff(), a.id_typed()).await.unwrap();
        svc.issue(&staff(), a.id_typed()).await.unwrap();

        // A later, non-overlapping booking is approved, but the unit never came back.
        let b = request(&svc, &student(), &eq, 1, window(3, 4)).await.unwrap();
        svc.approve(&staff(), b.id_typed()).await.unwrap();
        let err = svc.issue(&staff(), b.id_typed()).await.unwrap_err();
        assert!(matches!(err, LendingError::Unavailable(_)));

        let stored = svc.repository().get_request(b.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.status(), RequestStatus::Approved);
    }

    #[tokio::test]
    async fn student_cannot_cancel_someone_elses_request() {
        let (svc, _) = setup();
        let eq = projector(&svc, 1).await;
        let owner = student();

        let r = request(&svc, &owner, &eq, 1, window(1, 2)).await.unwrap();

        let err = svc.cancel(&student(), r.id_typed()).await.unwrap_err();
        assert!(matches!(err, LendingError::NotFound(_)));

        let cancelled = svc.cancel(&owner, r.id_typed()).await.unwrap();
        assert_eq!(cancelled.status(), RequestStatus::Cancelled);
    }

    #[tokio::test]
    async fn sweep_marks_only_late_issued_requests() {
        let (svc, clock) = setup();
        let eq = projector(&svc, 3).await;

        let late = request(&svc, &student(), &eq, 1, window(1, 2)).await.unwrap();
        let on_time = request(&svc, &student(), &eq, 1, window(1, 5)).await.unwrap();
        for r in [&late, &on_time] {
            svc.approve(&staff(), r.id_typed()).await.unwrap();
            svc.issue(&staff(), r.id_typed()).await.unwrap();
        }

        clock.set(day(3));
        let marked = svc.sweep_overdue().await.unwrap();
        assert_eq!(marked, vec![late.id_typed()]);

        // Idempotent.
        assert!(svc.sweep_overdue().await.unwrap().is_empty());

        // Overdue can still be returned.
        let back = svc.return_equipment(&staff(), late.id_typed(), None).await.unwrap();
        assert_eq!(back.status(), RequestStatus::Returned);
    }

    #[tokio::test]
    async fn transitions_are_published_with_sequence_numbers() {
        let (svc, _) = setup();
        let sub = svc.bus.subscribe();
        let eq = projector(&svc, 1).await;

        let r = request(&svc, &student(), &eq, 1, window(1, 2)).await.unwrap();
        svc.approve(&staff(), r.id_typed()).await.unwrap();

        let first = sub.try_recv().unwrap();
        let second = sub.try_recv().unwrap();
        assert_eq!(first.sequence_number(), 1);
        assert_eq!(second.sequence_number(), 2);
        assert!(matches!(second.payload(), LendingEvent::RequestApproved(_)));
        assert_eq!(second.stream_id(), *r.id_typed().as_uuid());
    }

    #[tokio::test]
    async fn unknown_equipment_does_not_grow_the_lock_table() {
        let (svc, _) = setup();
        let ghost = projector(&svc, 1).await;
        let ghost = Equipment::restore(EquipmentSnapshot {
            id: EquipmentId::new(),
            ..ghost.snapshot()
        });

        for _ in 0..50 {
            let err = request(&svc, &student(), &ghost, 1, window(1, 2)).await.unwrap_err();
            assert!(matches!(err, LendingError::NotFound(_)));
        }
        assert!(svc.locks.is_empty());
    }

    #[tokio::test]
    async fn categories_are_checked_and_protected() {
        let (svc, _) = setup();
        let optics = svc
            .create_category(
                &admin(),
                NewCategory {
                    name: "Optics".to_string(),
                    ..NewCategory::default()
                },
            )
            .await
            .unwrap();

        let dup = svc
            .create_category(
                &admin(),
                NewCategory {
                    name: " Optics ".to_string(),
                    ..NewCategory::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(dup, LendingError::Validation(_)));

        let stray = svc
            .register_equipment(
                &admin(),
                NewEquipment {
                    name: "Lens".to_string(),
                    total_quantity: 1,
                    category: Some(CategoryId::new()),
                    ..NewEquipment::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(stray, LendingError::Validation(_)));

        let lens = svc
            .register_equipment(
                &admin(),
                NewEquipment {
                    name: "Lens".to_string(),
                    total_quantity: 1,
                    category: Some(optics.id_typed()),
                    purchase_date: NaiveDate::from_ymd_opt(2029, 9, 1),
                    ..NewEquipment::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(lens.category(), Some(optics.id_typed()));
        assert_eq!(lens.purchase_date(), NaiveDate::from_ymd_opt(2029, 9, 1));

        let err = svc.delete_category(&admin(), optics.id_typed()).await.unwrap_err();
        assert!(matches!(err, LendingError::StateConflict(_)), "{err:?}");

        let renamed = svc
            .update_category(
                &admin(),
                optics.id_typed(),
                CategoryUpdate {
                    name: Some("Lenses".to_string()),
                    ..CategoryUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name(), "Lenses");

        let spare = svc
            .create_category(
                &admin(),
                NewCategory {
                    name: "Spare".to_string(),
                    ..NewCategory::default()
                },
            )
            .await
            .unwrap();
        svc.delete_category(&admin(), spare.id_typed()).await.unwrap();
        assert!(matches!(
            svc.get_category(spare.id_typed()).await,
            Err(LendingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_serial_numbers_are_rejected() {
        let (svc, _) = setup();
        let new = || NewEquipment {
            name: "Microscope".to_string(),
            total_quantity: 1,
            serial_number: Some("SN-1".to_string()),
            ..NewEquipment::default()
        };

        svc.register_equipment(&admin(), new()).await.unwrap();
        let err = svc.register_equipment(&admin(), new()).await.unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
    }
}
