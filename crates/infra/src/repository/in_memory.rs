use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use equiplend_core::{AggregateRoot, CategoryId, EquipmentId, ExpectedVersion, RequestId};
use equiplend_inventory::{Equipment, EquipmentCategory, EquipmentSnapshot};
use equiplend_lending::{BorrowRequest, RequestSnapshot, check_availability};

use super::r#trait::{LendingRepository, LineEffect, RepositoryError, RequestCriteria};

#[derive(Debug, Default)]
struct Tables {
    categories: HashMap<CategoryId, EquipmentCategory>,
    equipment: HashMap<EquipmentId, EquipmentSnapshot>,
    requests: HashMap<RequestId, RequestSnapshot>,
}

/// In-memory repository.
///
/// Intended for tests/dev. All tables sit behind one lock, so a commit holds
/// every equipment line exclusively and is atomic with respect to every reader.
#[derive(Debug, Default)]
pub struct InMemoryLendingRepository {
    tables: RwLock<Tables>,
}

impl InMemoryLendingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Backend("lock poisoned".to_string())
}

#[async_trait]
impl LendingRepository for InMemoryLendingRepository {
    async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<Option<EquipmentCategory>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<EquipmentCategory>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut all: Vec<EquipmentCategory> = tables.categories.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(all)
    }

    async fn save_category(&self, category: &EquipmentCategory) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let clash = tables
            .categories
            .values()
            .any(|c| c.id_typed() != category.id_typed() && c.name() == category.name());
        if clash {
            return Err(RepositoryError::Concurrency(format!(
                "category name '{}' already taken",
                category.name()
            )));
        }
        tables
            .categories
            .insert(category.id_typed(), category.clone());
        Ok(())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if !tables.categories.contains_key(&id) {
            return Err(RepositoryError::NotFound(format!("category {id}")));
        }
        let in_use = tables
            .equipment
            .values()
            .filter(|e| e.category == Some(id))
            .count();
        if in_use > 0 {
            return Err(RepositoryError::Referenced(format!(
                "category {id} is used by {in_use} equipment line(s)"
            )));
        }
        tables.categories.remove(&id);
        Ok(())
    }

    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.equipment.get(&id).cloned().map(Equipment::restore))
    }

    async fn list_equipment(&self) -> Result<Vec<Equipment>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut all: Vec<Equipment> = tables
            .equipment
            .values()
            .cloned()
            .map(Equipment::restore)
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(all)
    }

    async fn save_equipment(&self, equipment: &Equipment) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if let Some(category) = equipment.category() {
            if !tables.categories.contains_key(&category) {
                return Err(RepositoryError::NotFound(format!("category {category}")));
            }
        }

        let mut snapshot = equipment.snapshot();
        if let Some(stored) = tables.equipment.get(&snapshot.id) {
            snapshot.available_quantity = stored.available_quantity.min(snapshot.total_quantity);
        }
        let row = Equipment::restore(snapshot).snapshot();
        tables.equipment.insert(row.id, row);
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<Option<BorrowRequest>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.requests.get(&id).cloned().map(BorrowRequest::restore))
    }

    async fn find_requests(
        &self,
        criteria: &RequestCriteria,
    ) -> Result<Vec<BorrowRequest>, RepositoryError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut found: Vec<BorrowRequest> = tables
            .requests
            .values()
            .cloned()
            .map(BorrowRequest::restore)
            .filter(|r| criteria.matches(r))
            .collect();
        found.sort_by(|a, b| {
            b.requested_at()
                .cmp(&a.requested_at())
                .then(b.id_typed().cmp(&a.id_typed()))
        });
        Ok(found)
    }

    async fn commit(
        &self,
        request: &BorrowRequest,
        expected: ExpectedVersion,
        effect: LineEffect,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;

        let current = tables
            .requests
            .get(&request.id_typed())
            .map(|s| s.version)
            .unwrap_or(0);
        if !expected.matches(current) {
            return Err(RepositoryError::Concurrency(format!(
                "request {}: expected {expected:?}, found {current}",
                request.id()
            )));
        }

        let equipment_id = request.equipment_id();
        let mut line = tables
            .equipment
            .get(&equipment_id)
            .cloned()
            .map(Equipment::restore)
            .ok_or_else(|| RepositoryError::NotFound(format!("equipment {equipment_id}")))?;

        match effect {
            LineEffect::None => {}
            LineEffect::Reserve => {
                let others: Vec<BorrowRequest> = tables
                    .requests
                    .values()
                    .filter(|s| s.equipment_id == equipment_id)
                    .cloned()
                    .map(BorrowRequest::restore)
                    .collect();
                let fits = check_availability(
                    &line,
                    &request.window(),
                    request.quantity(),
                    &others,
                    Some(request.id_typed()),
                );
                if !fits {
                    return Err(RepositoryError::Unavailable(format!(
                        "equipment {equipment_id} cannot hold {} more over the requested period",
                        request.quantity()
                    )));
                }
            }
            LineEffect::Checkout { at } => {
                line.checkout(request.quantity(), at)
                    .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
                tables.equipment.insert(equipment_id, line.snapshot());
            }
            LineEffect::CheckIn { at } => {
                line.check_in(request.quantity(), at);
                tables.equipment.insert(equipment_id, line.snapshot());
            }
        }

        tables
            .requests
            .insert(request.id_typed(), request.snapshot());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use equiplend_core::{Aggregate, UserId};
    use equiplend_inventory::{EquipmentUpdate, NewCategory, NewEquipment};
    use equiplend_lending::{
        ApproveRequest, BorrowWindow, LendingCommand, LendingEvent, RequestStatus, SubmitRequest,
    };

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap()
    }

    fn tripod() -> Equipment {
        Equipment::register(
            EquipmentId::new(),
            NewEquipment {
                name: "Tripod".to_string(),
                total_quantity: 2,
                ..NewEquipment::default()
            },
            now(),
        )
        .unwrap()
    }

    fn submitted(equipment: &Equipment, offset_minutes: i64) -> BorrowRequest {
        let event = BorrowRequest::submit(&SubmitRequest {
            request_id: RequestId::new(),
            requester: UserId::new(),
            equipment_id: equipment.id_typed(),
            quantity: 1,
            purpose: "Interview".to_string(),
            window: BorrowWindow::new(now() + Duration::days(1), now() + Duration::days(2))
                .unwrap(),
            occurred_at: now() + Duration::minutes(offset_minutes),
        })
        .unwrap();
        let LendingEvent::RequestSubmitted(e) = event else {
            panic!("Expected RequestSubmitted");
        };
        BorrowRequest::from_submitted(&e)
    }

    /// Approve in memory; returns the version the store should still hold.
    fn approve(req: &mut BorrowRequest) -> ExpectedVersion {
        let events = req
            .handle(&LendingCommand::Approve(ApproveRequest {
                request_id: req.id_typed(),
                approver: UserId::new(),
                occurred_at: now(),
            }))
            .unwrap();
        let expected = ExpectedVersion::Exact(req.version());
        req.apply_all(&events);
        expected
    }

    async fn stored(repo: &InMemoryLendingRepository, eq: &Equipment) -> Equipment {
        repo.get_equipment(eq.id_typed()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn commit_checks_expected_version() {
        let repo = InMemoryLendingRepository::new();
        let eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let mut req = submitted(&eq, 0);
        repo.commit(&req, ExpectedVersion::New, LineEffect::None)
            .await
            .unwrap();

        // Same insert again: the stored version is now 1.
        let err = repo
            .commit(&req, ExpectedVersion::New, LineEffect::None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Concurrency(_)));

        let expected = approve(&mut req);
        repo.commit(&req, expected, LineEffect::Reserve).await.unwrap();

        let stored = repo.get_request(req.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.status(), RequestStatus::Approved);
        assert_eq!(stored.version(), 2);
    }

    #[tokio::test]
    async fn failed_commit_leaves_equipment_untouched() {
        let repo = InMemoryLendingRepository::new();
        let eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let req = submitted(&eq, 0);
        let err = repo
            .commit(&req, ExpectedVersion::Exact(7), LineEffect::Checkout { at: now() })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Concurrency(_)));
        assert_eq!(stored(&repo, &eq).await.available_quantity(), 2);
    }

    #[tokio::test]
    async fn checkout_is_refused_once_the_shelf_is_empty() {
        let repo = InMemoryLendingRepository::new();
        let eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let mut outcomes = Vec::new();
        for offset in 0..3 {
            let req = submitted(&eq, offset);
            repo.commit(&req, ExpectedVersion::New, LineEffect::None)
                .await
                .unwrap();
            outcomes.push(
                repo.commit(&req, ExpectedVersion::Exact(1), LineEffect::Checkout { at: now() })
                    .await,
            );
        }

        assert!(outcomes[0].is_ok() && outcomes[1].is_ok());
        assert!(matches!(outcomes[2], Err(RepositoryError::Unavailable(_))));
        assert_eq!(stored(&repo, &eq).await.available_quantity(), 0);

        let back = submitted(&eq, 9);
        repo.commit(&back, ExpectedVersion::New, LineEffect::CheckIn { at: now() })
            .await
            .unwrap();
        assert_eq!(stored(&repo, &eq).await.available_quantity(), 1);
    }

    #[tokio::test]
    async fn reserve_rechecks_overlapping_holds() {
        let repo = InMemoryLendingRepository::new();
        let eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let mut results = Vec::new();
        for offset in 0..3 {
            let mut req = submitted(&eq, offset);
            repo.commit(&req, ExpectedVersion::New, LineEffect::None)
                .await
                .unwrap();
            let expected = approve(&mut req);
            results.push((req.id_typed(), repo.commit(&req, expected, LineEffect::Reserve).await));
        }

        assert!(results[0].1.is_ok() && results[1].1.is_ok());
        assert!(matches!(results[2].1, Err(RepositoryError::Unavailable(_))));
        let third = repo.get_request(results[2].0).await.unwrap().unwrap();
        assert_eq!(third.status(), RequestStatus::Pending);
    }

    #[tokio::test]
    async fn admin_save_keeps_the_shelf_counter() {
        let repo = InMemoryLendingRepository::new();
        let mut eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let req = submitted(&eq, 0);
        repo.commit(&req, ExpectedVersion::New, LineEffect::Checkout { at: now() })
            .await
            .unwrap();

        // `eq` still believes both units are on the shelf.
        eq.update(
            EquipmentUpdate {
                name: Some("Carbon tripod".to_string()),
                ..EquipmentUpdate::default()
            },
            now(),
        )
        .unwrap();
        repo.save_equipment(&eq).await.unwrap();

        let after = stored(&repo, &eq).await;
        assert_eq!(after.name(), "Carbon tripod");
        assert_eq!(after.available_quantity(), 1);
    }

    #[tokio::test]
    async fn categories_in_use_cannot_be_deleted() {
        let repo = InMemoryLendingRepository::new();
        let optics = EquipmentCategory::create(
            CategoryId::new(),
            NewCategory {
                name: "Optics".to_string(),
                ..NewCategory::default()
            },
            now(),
        )
        .unwrap();
        repo.save_category(&optics).await.unwrap();

        let twin = EquipmentCategory::create(
            CategoryId::new(),
            NewCategory {
                name: "Optics".to_string(),
                ..NewCategory::default()
            },
            now(),
        )
        .unwrap();
        assert!(matches!(
            repo.save_category(&twin).await,
            Err(RepositoryError::Concurrency(_))
        ));

        let mut eq = tripod();
        eq.update(
            EquipmentUpdate {
                category: Some(optics.id_typed()),
                ..EquipmentUpdate::default()
            },
            now(),
        )
        .unwrap();
        repo.save_equipment(&eq).await.unwrap();

        let err = repo.delete_category(optics.id_typed()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Referenced(_)));

        let err = repo.delete_category(CategoryId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn requests_come_back_newest_first() {
        let repo = InMemoryLendingRepository::new();
        let eq = tripod();
        repo.save_equipment(&eq).await.unwrap();

        let older = submitted(&eq, 0);
        let newer = submitted(&eq, 5);
        for r in [&older, &newer] {
            repo.commit(r, ExpectedVersion::New, LineEffect::None)
                .await
                .unwrap();
        }

        let all = repo
            .find_requests(&RequestCriteria {
                equipment_id: Some(eq.id_typed()),
                ..RequestCriteria::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id_typed(), newer.id_typed());

        let none = repo
            .find_requests(&RequestCriteria::holding_capacity(eq.id_typed()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
