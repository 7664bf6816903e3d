use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::CallerContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<CallerContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": ctx.user_id().to_string(),
        "role": ctx.role().as_str(),
    }))
}
