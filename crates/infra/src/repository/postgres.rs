//! Postgres-backed lending repository.
//!
//! Schema lives in `migrations/0001_lending.sql`; [`PostgresLendingRepository::migrate`]
//! applies it idempotently at startup.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RepositoryError |
//! |------------|----------------------|-----------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (foreign key violation) | `23503` | `NotFound` (`Referenced` on category delete) |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use equiplend_core::{CategoryId, EquipmentId, ExpectedVersion, RequestId, UserId};
use equiplend_inventory::{Equipment, EquipmentCategory, EquipmentSnapshot};
use equiplend_lending::{BorrowRequest, BorrowWindow, RequestSnapshot, RequestStatus};

use super::r#trait::{LendingRepository, LineEffect, RepositoryError, RequestCriteria};

const SCHEMA: &str = include_str!("../../migrations/0001_lending.sql");

const CATEGORY_COLUMNS: &str = "id, name, description, created_at";

const EQUIPMENT_COLUMNS: &str = "id, name, category_id, description, condition, total_quantity, \
     available_quantity, serial_number, location, purchase_date, is_active, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, requester, equipment_id, quantity, purpose, borrow_from, \
     borrow_until, status, requested_at, approved_by, approved_at, issued_at, returned_at, \
     rejection_reason, notes, version";

/// Postgres-backed repository.
///
/// `commit` runs in one transaction. The equipment row is locked first with
/// `FOR UPDATE`, which serialises every commit on that line across all
/// processes sharing the database; then the request row is locked and its
/// version compared. Capacity is re-summed and the counter moved by a delta
/// under those locks, never written from a value read outside them.
#[derive(Debug, Clone)]
pub struct PostgresLendingRepository {
    pool: Arc<PgPool>,
}

impl PostgresLendingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and return a repository (no schema changes).
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema (idempotent).
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LendingRepository for PostgresLendingRepository {
    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn get_category(
        &self,
        id: CategoryId,
    ) -> Result<Option<EquipmentCategory>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM equipment_categories WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_category", e))?;

        row.map(|r| decode_category(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_categories(&self) -> Result<Vec<EquipmentCategory>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM equipment_categories ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter().map(decode_category).collect()
    }

    #[instrument(skip(self, category), fields(category_id = %category.id_typed()), err)]
    async fn save_category(&self, category: &EquipmentCategory) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO equipment_categories (id, name, description, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description
            "#,
        )
        .bind(category.id_typed().as_uuid())
        .bind(category.name())
        .bind(category.description())
        .bind(category.created_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_category", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM equipment_categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                    RepositoryError::Referenced(format!("category {id} is used by equipment"))
                }
                other => map_sqlx_error("delete_category", other),
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("category {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(equipment_id = %id), err)]
    async fn get_equipment(&self, id: EquipmentId) -> Result<Option<Equipment>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_equipment", e))?;

        row.map(|r| decode_equipment(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_equipment(&self) -> Result<Vec<Equipment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_equipment", e))?;

        rows.iter().map(decode_equipment).collect()
    }

    #[instrument(skip(self, equipment), fields(equipment_id = %equipment.id_typed()), err)]
    async fn save_equipment(&self, equipment: &Equipment) -> Result<(), RepositoryError> {
        let s = equipment.snapshot();
        sqlx::query(
            r#"
            INSERT INTO equipment (
                id, name, category_id, description, condition, total_quantity,
                available_quantity, serial_number, location, purchase_date, is_active,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                category_id = EXCLUDED.category_id,
                description = EXCLUDED.description,
                condition = EXCLUDED.condition,
                total_quantity = EXCLUDED.total_quantity,
                available_quantity = LEAST(EXCLUDED.total_quantity, equipment.available_quantity),
                serial_number = EXCLUDED.serial_number,
                location = EXCLUDED.location,
                purchase_date = EXCLUDED.purchase_date,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(s.id.as_uuid())
        .bind(&s.name)
        .bind(s.category.map(uuid::Uuid::from))
        .bind(&s.description)
        .bind(s.condition.as_str())
        .bind(s.total_quantity as i32)
        .bind(s.available_quantity as i32)
        .bind(&s.serial_number)
        .bind(&s.location)
        .bind(s.purchase_date)
        .bind(s.is_active)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_equipment", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn get_request(&self, id: RequestId) -> Result<Option<BorrowRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM borrow_requests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_request", e))?;

        row.map(|r| decode_request(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_requests(
        &self,
        criteria: &RequestCriteria,
    ) -> Result<Vec<BorrowRequest>, RepositoryError> {
        let statuses: Option<Vec<String>> = criteria
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|st| st.as_str().to_string()).collect());

        let rows = sqlx::query(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM borrow_requests
            WHERE ($1::uuid IS NULL OR requester = $1)
              AND ($2::uuid IS NULL OR equipment_id = $2)
              AND ($3::text[] IS NULL OR status = ANY($3))
              AND ($4::timestamptz IS NULL OR borrow_until < $4)
            ORDER BY requested_at DESC, id DESC
            "#
        ))
        .bind(criteria.requester.map(uuid::Uuid::from))
        .bind(criteria.equipment_id.map(uuid::Uuid::from))
        .bind(statuses)
        .bind(criteria.ended_before)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_requests", e))?;

        rows.iter().map(decode_request).collect()
    }

    #[instrument(
        skip(self, request),
        fields(request_id = %request.id_typed(), expected = ?expected, effect = ?effect),
        err
    )]
    async fn commit(
        &self,
        request: &BorrowRequest,
        expected: ExpectedVersion,
        effect: LineEffect,
    ) -> Result<(), RepositoryError> {
        let equipment_id = request.equipment_id();

        // Dropping `tx` on an early return rolls it back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // 1) Hold the equipment line.
        let total: i32 = sqlx::query(
            "SELECT total_quantity FROM equipment WHERE id = $1 FOR UPDATE",
        )
        .bind(equipment_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_equipment", e))?
        .ok_or_else(|| RepositoryError::NotFound(format!("equipment {equipment_id}")))?
        .try_get("total_quantity")
        .map_err(|e| map_sqlx_error("lock_equipment", e))?;

        // 2) Optimistic check on the request itself.
        let current: Option<i64> =
            sqlx::query("SELECT version FROM borrow_requests WHERE id = $1 FOR UPDATE")
                .bind(request.id_typed().as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_request", e))?
                .map(|row| row.try_get::<i64, _>("version"))
                .transpose()
                .map_err(|e| map_sqlx_error("lock_request", e))?;
        let current = current.unwrap_or(0) as u64;

        if !expected.matches(current) {
            return Err(RepositoryError::Concurrency(format!(
                "request {}: expected {expected:?}, found {current}",
                request.id_typed()
            )));
        }

        // 3) Line effect, evaluated under the lock.
        let quantity = request.quantity() as i32;
        match effect {
            LineEffect::None => {}
            LineEffect::Reserve => {
                let holding: Vec<String> = RequestStatus::CAPACITY_HOLDING
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect();
                let reserved: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(SUM(quantity), 0)::BIGINT
                    FROM borrow_requests
                    WHERE equipment_id = $1
                      AND id <> $2
                      AND status = ANY($3)
                      AND borrow_from < $5
                      AND borrow_until > $4
                    "#,
                )
                .bind(equipment_id.as_uuid())
                .bind(request.id_typed().as_uuid())
                .bind(holding)
                .bind(request.window().from())
                .bind(request.window().until())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("sum_reserved", e))?;

                if reserved + i64::from(quantity) > i64::from(total) {
                    return Err(RepositoryError::Unavailable(format!(
                        "equipment {equipment_id} cannot hold {quantity} more over the requested period \
                         (total: {total}, reserved: {reserved})"
                    )));
                }
            }
            LineEffect::Checkout { at } => {
                let moved = sqlx::query(
                    r#"
                    UPDATE equipment
                    SET available_quantity = available_quantity - $2, updated_at = $3
                    WHERE id = $1 AND available_quantity >= $2
                    "#,
                )
                .bind(equipment_id.as_uuid())
                .bind(quantity)
                .bind(at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("checkout", e))?;

                if moved.rows_affected() != 1 {
                    return Err(RepositoryError::Unavailable(format!(
                        "insufficient stock on hand for equipment {equipment_id} (requested: {quantity})"
                    )));
                }
            }
            LineEffect::CheckIn { at } => {
                sqlx::query(
                    r#"
                    UPDATE equipment
                    SET available_quantity = LEAST(total_quantity, available_quantity + $2),
                        updated_at = $3
                    WHERE id = $1
                    "#,
                )
                .bind(equipment_id.as_uuid())
                .bind(quantity)
                .bind(at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_in", e))?;
            }
        }

        // 4) The request itself.
        write_request(&mut tx, &request.snapshot()).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

async fn write_request(
    tx: &mut Transaction<'_, Postgres>,
    s: &RequestSnapshot,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO borrow_requests (
            id, requester, equipment_id, quantity, purpose, borrow_from, borrow_until,
            status, requested_at, approved_by, approved_at, issued_at, returned_at,
            rejection_reason, notes, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            approved_by = EXCLUDED.approved_by,
            approved_at = EXCLUDED.approved_at,
            issued_at = EXCLUDED.issued_at,
            returned_at = EXCLUDED.returned_at,
            rejection_reason = EXCLUDED.rejection_reason,
            notes = EXCLUDED.notes,
            version = EXCLUDED.version
        "#,
    )
    .bind(s.id.as_uuid())
    .bind(s.requester.as_uuid())
    .bind(s.equipment_id.as_uuid())
    .bind(s.quantity as i32)
    .bind(&s.purpose)
    .bind(s.window.from())
    .bind(s.window.until())
    .bind(s.status.as_str())
    .bind(s.requested_at)
    .bind(s.approved_by.map(uuid::Uuid::from))
    .bind(s.approved_at)
    .bind(s.issued_at)
    .bind(s.returned_at)
    .bind(&s.rejection_reason)
    .bind(&s.notes)
    .bind(s.version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_request", e))?;

    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => RepositoryError::Concurrency(msg),
                Some("23503") => RepositoryError::NotFound(msg),
                _ => RepositoryError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            RepositoryError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => RepositoryError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn decode_error(what: &str, err: impl core::fmt::Display) -> RepositoryError {
    RepositoryError::Backend(format!("failed to decode {what} row: {err}"))
}

// SQLx row types

fn decode_category(row: &sqlx::postgres::PgRow) -> Result<EquipmentCategory, RepositoryError> {
    let decode = |e: sqlx::Error| decode_error("category", e);
    Ok(EquipmentCategory::restore(
        CategoryId::from_uuid(row.try_get("id").map_err(decode)?),
        row.try_get("name").map_err(decode)?,
        row.try_get("description").map_err(decode)?,
        row.try_get("created_at").map_err(decode)?,
    ))
}

#[derive(Debug)]
struct EquipmentRow {
    id: uuid::Uuid,
    name: String,
    category_id: Option<uuid::Uuid>,
    description: String,
    condition: String,
    total_quantity: i32,
    available_quantity: i32,
    serial_number: Option<String>,
    location: String,
    purchase_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for EquipmentRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(EquipmentRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            description: row.try_get("description")?,
            condition: row.try_get("condition")?,
            total_quantity: row.try_get("total_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
            serial_number: row.try_get("serial_number")?,
            location: row.try_get("location")?,
            purchase_date: row.try_get("purchase_date")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn decode_equipment(row: &sqlx::postgres::PgRow) -> Result<Equipment, RepositoryError> {
    let r = EquipmentRow::from_row(row).map_err(|e| decode_error("equipment", e))?;
    let condition = r.condition.parse().map_err(|e| decode_error("equipment", e))?;
    let total = r.total_quantity.max(0) as u32;
    let available = r.available_quantity.max(0) as u32;

    Ok(Equipment::restore(EquipmentSnapshot {
        id: EquipmentId::from_uuid(r.id),
        name: r.name,
        category: r.category_id.map(CategoryId::from_uuid),
        description: r.description,
        condition,
        total_quantity: total,
        available_quantity: available,
        serial_number: r.serial_number,
        location: r.location,
        purchase_date: r.purchase_date,
        is_active: r.is_active,
        is_available: available > 0 && r.is_active,
        created_at: r.created_at,
        updated_at: r.updated_at,
    }))
}

#[derive(Debug)]
struct RequestRow {
    id: uuid::Uuid,
    requester: uuid::Uuid,
    equipment_id: uuid::Uuid,
    quantity: i32,
    purpose: String,
    borrow_from: DateTime<Utc>,
    borrow_until: DateTime<Utc>,
    status: String,
    requested_at: DateTime<Utc>,
    approved_by: Option<uuid::Uuid>,
    approved_at: Option<DateTime<Utc>>,
    issued_at: Option<DateTime<Utc>>,
    returned_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    notes: Option<String>,
    version: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RequestRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(RequestRow {
            id: row.try_get("id")?,
            requester: row.try_get("requester")?,
            equipment_id: row.try_get("equipment_id")?,
            quantity: row.try_get("quantity")?,
            purpose: row.try_get("purpose")?,
            borrow_from: row.try_get("borrow_from")?,
            borrow_until: row.try_get("borrow_until")?,
            status: row.try_get("status")?,
            requested_at: row.try_get("requested_at")?,
            approved_by: row.try_get("approved_by")?,
            approved_at: row.try_get("approved_at")?,
            issued_at: row.try_get("issued_at")?,
            returned_at: row.try_get("returned_at")?,
            rejection_reason: row.try_get("rejection_reason")?,
            notes: row.try_get("notes")?,
            version: row.try_get("version")?,
        })
    }
}

fn decode_request(row: &sqlx::postgres::PgRow) -> Result<BorrowRequest, RepositoryError> {
    let r = RequestRow::from_row(row).map_err(|e| decode_error("borrow request", e))?;
    let status = r.status.parse().map_err(|e| decode_error("borrow request", e))?;
    let window = BorrowWindow::new(r.borrow_from, r.borrow_until)
        .map_err(|e| decode_error("borrow request", e))?;

    Ok(BorrowRequest::restore(RequestSnapshot {
        id: RequestId::from_uuid(r.id),
        requester: UserId::from_uuid(r.requester),
        equipment_id: EquipmentId::from_uuid(r.equipment_id),
        quantity: r.quantity.max(0) as u32,
        purpose: r.purpose,
        window,
        status,
        requested_at: r.requested_at,
        approved_by: r.approved_by.map(UserId::from_uuid),
        approved_at: r.approved_at,
        issued_at: r.issued_at,
        returned_at: r.returned_at,
        rejection_reason: r.rejection_reason,
        notes: r.notes,
        version: r.version.max(0) as u64,
    }))
}
