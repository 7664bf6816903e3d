use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use equiplend_infra::LendingError;

pub fn lending_error_to_response(err: LendingError) -> axum::response::Response {
    match err {
        LendingError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        LendingError::Unavailable(msg) => json_error(StatusCode::CONFLICT, "unavailable", msg),
        LendingError::StateConflict(msg) => json_error(StatusCode::CONFLICT, "state_conflict", msg),
        LendingError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        LendingError::NotFound(what) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
        }
        LendingError::Store(msg) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage failure")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Unwrap a JSON body; a body that does not parse or does not fit the DTO
/// (wrong type, negative quantity, malformed date) is a validation error.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(value)| value).map_err(|rejection| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            rejection.body_text(),
        )
    })
}

pub fn invalid_id(what: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lending_errors_map_to_statuses() {
        let cases = [
            (LendingError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (LendingError::Unavailable("x".into()), StatusCode::CONFLICT),
            (LendingError::StateConflict("x".into()), StatusCode::CONFLICT),
            (LendingError::Conflict("x".into()), StatusCode::CONFLICT),
            (LendingError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LendingError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(lending_error_to_response(err).status(), status);
        }
    }
}
