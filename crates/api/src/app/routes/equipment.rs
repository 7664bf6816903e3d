use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use equiplend_auth::Operation;
use equiplend_core::EquipmentId;
use equiplend_infra::{query, EquipmentFilter, LendingError};
use equiplend_inventory::Equipment;
use equiplend_lending::BorrowWindow;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_equipment).post(create_equipment))
        .route("/:id", get(get_equipment).patch(update_equipment))
        .route("/:id/availability", get(get_availability))
}

fn parse_id(raw: &str) -> Result<EquipmentId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("equipment"))
}

/// Render one equipment line with its category name.
async fn respond(
    services: &AppServices,
    status: StatusCode,
    result: Result<Equipment, LendingError>,
) -> axum::response::Response {
    let equipment = match result {
        Ok(e) => e,
        Err(e) => return errors::lending_error_to_response(e),
    };
    match query::equipment_views(services.lending().repository(), &[equipment]).await {
        Ok(mut views) => match views.pop() {
            Some(view) => (status, Json(view)).into_response(),
            None => errors::lending_error_to_response(LendingError::Store(
                "equipment view went missing".to_string(),
            )),
        },
        Err(e) => errors::lending_error_to_response(e),
    }
}

pub async fn list_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(filter): Query<EquipmentFilter>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewEquipment) {
        return resp;
    }

    let repo = services.lending().repository();
    let found = match query::list_equipment(repo, &filter).await {
        Ok(found) => found,
        Err(e) => return errors::lending_error_to_response(e),
    };
    match query::equipment_views(repo, &found).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}

pub async fn create_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<dto::CreateEquipmentRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ManageEquipment) {
        return resp;
    }
    let body = match errors::json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let result = services
        .lending()
        .register_equipment(ctx.caller(), body.into())
        .await;
    respond(&services, StatusCode::CREATED, result).await
}

pub async fn get_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services.lending().get_equipment(id).await;
    respond(&services, StatusCode::OK, result).await
}

pub async fn update_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateEquipmentRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ManageEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match errors::json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let result = services
        .lending()
        .update_equipment(ctx.caller(), id, body.into())
        .await;
    respond(&services, StatusCode::OK, result).await
}

pub async fn get_availability(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(q): Query<dto::AvailabilityQuery>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (start, end) = match q.bounds() {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let window = match BorrowWindow::new(start, end) {
        Ok(w) => w,
        Err(e) => return errors::lending_error_to_response(e.into()),
    };

    match services.lending().availability(id, window).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}
