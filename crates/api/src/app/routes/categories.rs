use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use equiplend_auth::Operation;
use equiplend_core::CategoryId;
use equiplend_infra::{query, CategoryFilter, LendingError};
use equiplend_inventory::EquipmentCategory;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route(
            "/:id",
            get(get_category)
                .patch(update_category)
                .delete(delete_category),
        )
}

fn parse_id(raw: &str) -> Result<CategoryId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("category"))
}

async fn respond(
    services: &AppServices,
    status: StatusCode,
    result: Result<EquipmentCategory, LendingError>,
) -> axum::response::Response {
    let category = match result {
        Ok(c) => c,
        Err(e) => return errors::lending_error_to_response(e),
    };
    match query::category_view(services.lending().repository(), category).await {
        Ok(view) => (status, Json(view)).into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(filter): Query<CategoryFilter>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewEquipment) {
        return resp;
    }

    match query::list_categories(services.lending().repository(), &filter).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<dto::CreateCategoryRequest>, JsonRejection>,
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
        .create_category(ctx.caller(), body.into())
        .await;
    respond(&services, StatusCode::CREATED, result).await
}

pub async fn get_category(
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

    let result = services.lending().get_category(id).await;
    respond(&services, StatusCode::OK, result).await
}

pub async fn update_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateCategoryRequest>, JsonRejection>,
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
        .update_category(ctx.caller(), id, body.into())
        .await;
    respond(&services, StatusCode::OK, result).await
}

/// Refused with 409 while equipment is still filed under the category.
pub async fn delete_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ManageEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.lending().delete_category(ctx.caller(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}
