//! Read side: role-scoped request listings, equipment and category views.
//!
//! Pure projection over the repository. Nothing here enforces lending rules;
//! it only decides what a caller may see.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use equiplend_auth::Caller;
use equiplend_core::{CategoryId, EquipmentId, RequestId, UserId};
use equiplend_inventory::{Equipment, EquipmentCategory, EquipmentCondition, EquipmentSnapshot};
use equiplend_lending::{BorrowRequest, RequestSnapshot, RequestStatus};

use crate::repository::{LendingRepository, RequestCriteria};
use crate::service::LendingError;

/// A request as shown to callers, with the derived overdue flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: RequestSnapshot,
    pub is_overdue: bool,
}

impl RequestView {
    pub fn new(request: &BorrowRequest, now: DateTime<Utc>) -> Self {
        Self {
            request: request.snapshot(),
            is_overdue: request.is_overdue(now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub equipment: Option<EquipmentId>,
    pub user: Option<UserId>,
    /// `true`: only overdue requests; `false`: only requests that are not.
    pub overdue: Option<bool>,
}

impl RequestFilter {
    /// Shortcut: the caller's own requests.
    pub fn mine(caller: &Caller) -> Self {
        Self {
            user: Some(caller.user_id),
            ..Self::default()
        }
    }

    /// Shortcut: the approval queue.
    pub fn pending() -> Self {
        Self {
            status: Some(RequestStatus::Pending),
            ..Self::default()
        }
    }

    fn criteria(&self, caller: &Caller) -> RequestCriteria {
        // Students are pinned to their own rows whatever `user` says.
        let requester = if caller.is_staff() {
            self.user
        } else {
            Some(caller.user_id)
        };

        RequestCriteria {
            requester,
            equipment_id: self.equipment,
            statuses: self.status.map(|s| vec![s]),
            ended_before: None,
        }
    }
}

/// Equipment as shown to callers, with its category resolved to a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentView {
    #[serde(flatten)]
    pub equipment: EquipmentSnapshot,
    pub category_name: Option<String>,
}

/// A category with the number of equipment lines filed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: EquipmentCategory,
    pub equipment_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CategoryFilter {
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EquipmentFilter {
    pub available: Option<bool>,
    pub condition: Option<EquipmentCondition>,
    pub category: Option<CategoryId>,
    pub active: Option<bool>,
    /// Case-insensitive match on name, description or serial number.
    pub search: Option<String>,
}

impl EquipmentFilter {
    pub fn matches(&self, equipment: &Equipment) -> bool {
        if let Some(available) = self.available {
            if equipment.is_available() != available {
                return false;
            }
        }
        if let Some(condition) = self.condition {
            if equipment.condition() != condition {
                return false;
            }
        }
        if let Some(category) = self.category {
            if equipment.category() != Some(category) {
                return false;
            }
        }
        if let Some(active) = self.active {
            if equipment.is_active() != active {
                return false;
            }
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = equipment.name().to_lowercase().contains(&term)
                || equipment.description().to_lowercase().contains(&term)
                || equipment
                    .serial_number()
                    .is_some_and(|s| s.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Requests visible to `caller`, newest first.
pub async fn list_requests<R>(
    repo: &R,
    caller: &Caller,
    filter: &RequestFilter,
    now: DateTime<Utc>,
) -> Result<Vec<RequestView>, LendingError>
where
    R: LendingRepository + ?Sized,
{
    let found = repo.find_requests(&filter.criteria(caller)).await?;

    Ok(found
        .iter()
        .filter(|r| filter.overdue.is_none_or(|want| r.is_overdue(now) == want))
        .map(|r| RequestView::new(r, now))
        .collect())
}

/// Load a request if `caller` may see it; otherwise it does not exist for them.
pub async fn visible_request<R>(
    repo: &R,
    caller: &Caller,
    id: RequestId,
) -> Result<BorrowRequest, LendingError>
where
    R: LendingRepository + ?Sized,
{
    match repo.get_request(id).await? {
        Some(r) if caller.is_staff() || r.requester() == caller.user_id => Ok(r),
        _ => Err(LendingError::NotFound(format!("request {id}"))),
    }
}

/// Equipment matching `filter`, ordered by name.
pub async fn list_equipment<R>(
    repo: &R,
    filter: &EquipmentFilter,
) -> Result<Vec<Equipment>, LendingError>
where
    R: LendingRepository + ?Sized,
{
    Ok(repo
        .list_equipment()
        .await?
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect())
}

/// Attach category names to `equipment`, loading the categories once.
pub async fn equipment_views<R>(
    repo: &R,
    equipment: &[Equipment],
) -> Result<Vec<EquipmentView>, LendingError>
where
    R: LendingRepository + ?Sized,
{
    let names: HashMap<CategoryId, String> = repo
        .list_categories()
        .await?
        .into_iter()
        .map(|c| (c.id_typed(), c.name().to_string()))
        .collect();

    Ok(equipment
        .iter()
        .map(|e| EquipmentView {
            equipment: e.snapshot(),
            category_name: e.category().and_then(|id| names.get(&id).cloned()),
        })
        .collect())
}

/// Categories matching `filter`, ordered by name, with equipment counts.
pub async fn list_categories<R>(
    repo: &R,
    filter: &CategoryFilter,
) -> Result<Vec<CategoryView>, LendingError>
where
    R: LendingRepository + ?Sized,
{
    let counts = equipment_counts(repo).await?;
    Ok(repo
        .list_categories()
        .await?
        .into_iter()
        .filter(|c| filter.search.as_deref().is_none_or(|t| c.matches_search(t)))
        .map(|c| {
            let equipment_count = counts.get(&c.id_typed()).copied().unwrap_or(0);
            CategoryView {
                category: c,
                equipment_count,
            }
        })
        .collect())
}

pub async fn category_view<R>(
    repo: &R,
    category: EquipmentCategory,
) -> Result<CategoryView, LendingError>
where
    R: LendingRepository + ?Sized,
{
    let equipment_count = equipment_counts(repo)
        .await?
        .get(&category.id_typed())
        .copied()
        .unwrap_or(0);
    Ok(CategoryView {
        category,
        equipment_count,
    })
}

async fn equipment_counts<R>(repo: &R) -> Result<HashMap<CategoryId, usize>, LendingError>
where
    R: LendingRepository + ?Sized,
{
    let mut counts = HashMap::new();
    for equipment in repo.list_equipment().await? {
        if let Some(id) = equipment.category() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    Ok(counts)
}
