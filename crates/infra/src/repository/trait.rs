use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use equiplend_core::{CategoryId, EquipmentId, ExpectedVersion, RequestId, UserId};
use equiplend_inventory::{Equipment, EquipmentCategory};
use equiplend_lending::{BorrowRequest, RequestStatus};

/// Storage-level selection of borrow requests.
///
/// Every field narrows the result; an empty criteria selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCriteria {
    pub requester: Option<UserId>,
    pub equipment_id: Option<EquipmentId>,
    pub statuses: Option<Vec<RequestStatus>>,
    /// Only requests whose window ended strictly before this instant.
    pub ended_before: Option<DateTime<Utc>>,
}

impl RequestCriteria {
    /// Requests that currently hold capacity on `equipment_id`.
    pub fn holding_capacity(equipment_id: EquipmentId) -> Self {
        Self {
            equipment_id: Some(equipment_id),
            statuses: Some(RequestStatus::CAPACITY_HOLDING.to_vec()),
            ..Self::default()
        }
    }

    pub fn matches(&self, request: &BorrowRequest) -> bool {
        if let Some(requester) = self.requester {
            if request.requester() != requester {
                return false;
            }
        }
        if let Some(equipment_id) = self.equipment_id {
            if request.equipment_id() != equipment_id {
                return false;
            }
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&request.status()) {
                return false;
            }
        }
        if let Some(instant) = self.ended_before {
            if !request.window().ended_before(instant) {
                return false;
            }
        }
        true
    }
}

/// What a commit requires of, or does to, the request's equipment line.
///
/// Evaluated while the repository holds the line exclusively, so the outcome
/// holds for every writer sharing the store, not just this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEffect {
    /// Status-only change.
    None,
    /// The request must still fit the line's capacity over its window.
    Reserve,
    /// Take the request's quantity off the shelf.
    Checkout { at: DateTime<Utc> },
    /// Put the request's quantity back, clamped to the total.
    CheckIn { at: DateTime<Utc> },
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("{0} not found")]
    NotFound(String),

    /// A [`LineEffect`] could not be honoured.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The record is still referenced and cannot be removed.
    #[error("still referenced: {0}")]
    Referenced(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Category, equipment and borrow request persistence.
///
/// Implementations must:
/// - return requests ordered newest `requested_at` first
/// - return equipment and categories ordered by name
/// - hold the request's equipment line exclusively for the whole of
///   [`LendingRepository::commit`], check `expected` against the stored request
///   version and evaluate the [`LineEffect`] before writing anything
/// - write the request and the moved counter all-or-nothing
/// - leave the shelf counter alone on [`LendingRepository::save_equipment`]
///   for an existing line, except to clamp it under a lowered total
#[async_trait]
pub trait LendingRepository: Send + Sync {
    async fn get_category(&self, id: CategoryId)
    -> Result<Option<EquipmentCategory>, RepositoryError>;

    async fn list_categories(&self) -> Result<Vec<EquipmentCategory>, RepositoryError>;

    async fn save_category(&self, category: &EquipmentCategory) -> Result<(), RepositoryError>;

    /// Remove a category; `Referenced` while any equipment line points at it.
    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError>;

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, RepositoryError>;

    async fn list_equipment(&self) -> Result<Vec<Equipment>, RepositoryError>;

    /// Insert or update an equipment row (administrative writes).
    async fn save_equipment(&self, equipment: &Equipment) -> Result<(), RepositoryError>;

    async fn get_request(&self, id: RequestId) -> Result<Option<BorrowRequest>, RepositoryError>;

    async fn find_requests(
        &self,
        criteria: &RequestCriteria,
    ) -> Result<Vec<BorrowRequest>, RepositoryError>;

    /// Persist a request transition, together with its effect on the line.
    async fn commit(
        &self,
        request: &BorrowRequest,
        expected: ExpectedVersion,
        effect: LineEffect,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<R> LendingRepository for Arc<R>
where
    R: LendingRepository + ?Sized,
{
    async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<Option<EquipmentCategory>, RepositoryError> {
        (**self).get_category(id).await
    }

    async fn list_categories(&self) -> Result<Vec<EquipmentCategory>, RepositoryError> {
        (**self).list_categories().await
    }

    async fn save_category(&self, category: &EquipmentCategory) -> Result<(), RepositoryError> {
        (**self).save_category(category).await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        (**self).delete_category(id).await
    }

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, RepositoryError> {
        (**self).get_equipment(id).await
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>, RepositoryError> {
        (**self).list_equipment().await
    }

    async fn save_equipment(&self, equipment: &Equipment) -> Result<(), RepositoryError> {
        (**self).save_equipment(equipment).await
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<BorrowRequest>, RepositoryError> {
        (**self).get_request(id).await
    }

    async fn find_requests(
        &self,
        criteria: &RequestCriteria,
    ) -> Result<Vec<BorrowRequest>, RepositoryError> {
        (**self).find_requests(criteria).await
    }

    async fn commit(
        &self,
        request: &BorrowRequest,
        expected: ExpectedVersion,
        effect: LineEffect,
    ) -> Result<(), RepositoryError> {
        (**self).commit(request, expected, effect).await
    }
}
