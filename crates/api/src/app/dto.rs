use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use equiplend_core::CategoryId;
use equiplend_inventory::{
    CategoryUpdate, EquipmentCondition, EquipmentUpdate, NewCategory, NewEquipment,
};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl From<CreateCategoryRequest> for NewCategory {
    fn from(body: CreateCategoryRequest) -> Self {
        NewCategory {
            name: body.name,
            description: body.description,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl From<UpdateCategoryRequest> for CategoryUpdate {
    fn from(body: UpdateCategoryRequest) -> Self {
        CategoryUpdate {
            name: body.name,
            description: body.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEquipmentRequest {
    pub name: String,
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub condition: EquipmentCondition,
    pub total_quantity: u32,
    pub serial_number: Option<String>,
    #[serde(default)]
    pub location: String,
    /// `YYYY-MM-DD`.
    pub purchase_date: Option<NaiveDate>,
}

impl From<CreateEquipmentRequest> for NewEquipment {
    fn from(body: CreateEquipmentRequest) -> Self {
        NewEquipment {
            name: body.name,
            category: body.category,
            description: body.description,
            condition: body.condition,
            total_quantity: body.total_quantity,
            serial_number: body.serial_number,
            location: body.location,
            purchase_date: body.purchase_date,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateEquipmentRequest {
    pub name: Option<String>,
    pub category: Option<CategoryId>,
    pub description: Option<String>,
    pub condition: Option<EquipmentCondition>,
    pub total_quantity: Option<u32>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

impl From<UpdateEquipmentRequest> for EquipmentUpdate {
    fn from(body: UpdateEquipmentRequest) -> Self {
        EquipmentUpdate {
            name: body.name,
            category: body.category,
            description: body.description,
            condition: body.condition,
            total_quantity: body.total_quantity,
            serial_number: body.serial_number,
            location: body.location,
            purchase_date: body.purchase_date,
            is_active: body.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBorrowRequest {
    pub equipment_id: String,
    pub quantity: u32,
    pub borrow_from: DateTime<Utc>,
    pub borrow_until: DateTime<Utc>,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequestBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequestBody {
    pub notes: Option<String>,
}

/// `?start=&end=` as RFC 3339 timestamps; both required.
#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl AvailabilityQuery {
    pub fn bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), axum::response::Response> {
        let (Some(start), Some(end)) = (self.start.as_deref(), self.end.as_deref()) else {
            return Err(errors::json_error(
                axum::http::StatusCode::BAD_REQUEST,
                "validation_error",
                "start and end parameters required",
            ));
        };

        let parse = |raw: &str| {
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| {
                    errors::json_error(
                        axum::http::StatusCode::BAD_REQUEST,
                        "validation_error",
                        "invalid date format",
                    )
                })
        };

        Ok((parse(start)?, parse(end)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn availability_bounds_require_both_ends() {
        let q = AvailabilityQuery {
            start: Some("2030-01-01T00:00:00Z".to_string()),
            end: None,
        };
        assert_eq!(q.bounds().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn availability_bounds_parse_offsets_to_utc() {
        let q = AvailabilityQuery {
            start: Some("2030-01-01T02:00:00+02:00".to_string()),
            end: Some("2030-01-02T00:00:00Z".to_string()),
        };
        let (start, end) = q.bounds().unwrap();
        assert_eq!(start.to_rfc3339(), "2030-01-01T00:00:00+00:00");
        assert!(start < end);

        let bad = AvailabilityQuery {
            start: Some("yesterday".to_string()),
            end: Some("2030-01-02T00:00:00Z".to_string()),
        };
        assert_eq!(bad.bounds().unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn create_equipment_defaults() {
        let body: CreateEquipmentRequest =
            serde_json::from_str(r#"{"name":"Tripod","total_quantity":2}"#).unwrap();
        let new: NewEquipment = body.into();
        assert_eq!(new.condition, EquipmentCondition::Good);
        assert_eq!(new.total_quantity, 2);
        assert!(new.serial_number.is_none());
        assert!(new.purchase_date.is_none());
    }

    #[test]
    fn purchase_date_is_a_plain_date() {
        let body: CreateEquipmentRequest = serde_json::from_str(
            r#"{"name":"Tripod","total_quantity":2,"purchase_date":"2029-03-14"}"#,
        )
        .unwrap();
        assert_eq!(body.purchase_date, NaiveDate::from_ymd_opt(2029, 3, 14));

        let bad = serde_json::from_str::<CreateEquipmentRequest>(
            r#"{"name":"Tripod","total_quantity":2,"purchase_date":"14/03/2029"}"#,
        );
        assert!(bad.is_err());
    }
}
