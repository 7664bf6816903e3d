use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use equiplend_auth::Operation;
use equiplend_core::{EquipmentId, RequestId};
use equiplend_infra::{query, LendingError, NewBorrowRequest, RequestFilter, RequestView};
use equiplend_lending::{BorrowRequest, BorrowWindow};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/mine", get(my_requests))
        .route("/pending", get(pending_requests))
        .route("/overdue/sweep", post(sweep_overdue))
        .route("/:id", get(get_request))
        .route("/:id/history", get(request_history))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/issue", post(issue_request))
        .route("/:id/return", post(return_request))
        .route("/:id/cancel", post(cancel_request))
}

fn parse_id(raw: &str) -> Result<RequestId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("request"))
}

/// Render a service outcome as a request view, stamped with the current time.
fn respond(
    services: &AppServices,
    status: StatusCode,
    result: Result<BorrowRequest, LendingError>,
) -> axum::response::Response {
    match result {
        Ok(request) => {
            let view = RequestView::new(&request, services.lending().now());
            (status, Json(view)).into_response()
        }
        Err(e) => errors::lending_error_to_response(e),
    }
}

async fn list_with(
    services: &AppServices,
    ctx: &CallerContext,
    filter: RequestFilter,
) -> axum::response::Response {
    let lending = services.lending();
    match query::list_requests(lending.repository(), ctx.caller(), &filter, lending.now()).await {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Query(filter): Query<RequestFilter>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewRequests) {
        return resp;
    }
    list_with(&services, &ctx, filter).await
}

pub async fn my_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewRequests) {
        return resp;
    }
    list_with(&services, &ctx, RequestFilter::mine(ctx.caller())).await
}

pub async fn pending_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewPending) {
        return resp;
    }
    list_with(&services, &ctx, RequestFilter::pending()).await
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    body: Result<Json<dto::CreateBorrowRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::CreateRequest) {
        return resp;
    }
    let body = match errors::json_body(body) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    let equipment_id: EquipmentId = match body.equipment_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("equipment"),
    };
    let window = match BorrowWindow::new(body.borrow_from, body.borrow_until) {
        Ok(w) => w,
        Err(e) => return errors::lending_error_to_response(e.into()),
    };

    let result = services
        .lending()
        .create_request(
            ctx.caller(),
            NewBorrowRequest {
                equipment_id,
                quantity: body.quantity,
                window,
                purpose: body.purpose,
            },
        )
        .await;

    respond(&services, StatusCode::CREATED, result)
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewRequests) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = query::visible_request(services.lending().repository(), ctx.caller(), id).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn request_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ViewHistory) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(e) = query::visible_request(services.lending().repository(), ctx.caller(), id).await {
        return errors::lending_error_to_response(e);
    }

    let entries = services.audit().history(id);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "request_id": id.to_string(),
            "count": entries.len(),
            "entries": entries,
        })),
    )
        .into_response()
}

pub async fn approve_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ApproveRequest) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services.lending().approve(ctx.caller(), id).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn reject_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::RejectRequestBody>>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::RejectRequest) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();

    let result = services.lending().reject(ctx.caller(), id, reason).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn issue_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::IssueEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services.lending().issue(ctx.caller(), id).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn return_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::ReturnRequestBody>>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::ReturnEquipment) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let notes = body.and_then(|Json(b)| b.notes);

    let result = services.lending().return_equipment(ctx.caller(), id, notes).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn cancel_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::CancelRequest) {
        return resp;
    }
    let id = match parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let result = services.lending().cancel(ctx.caller(), id).await;
    respond(&services, StatusCode::OK, result)
}

pub async fn sweep_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<CallerContext>,
) -> axum::response::Response {
    if let Err(resp) = authz::require(&ctx, Operation::SweepOverdue) {
        return resp;
    }

    match services.lending().sweep_overdue().await {
        Ok(marked) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "marked": marked.len(),
                "request_ids": marked.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            })),
        )
            .into_response(),
        Err(e) => errors::lending_error_to_response(e),
    }
}
