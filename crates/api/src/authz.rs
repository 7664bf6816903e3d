//! API-side authorization guard.
//!
//! Evaluated by handlers **before** calling the lending service, which stays
//! role-agnostic apart from visibility scoping.

use axum::http::StatusCode;
use axum::response::Response;

use equiplend_auth::{Operation, authorize};

use crate::app::errors;
use crate::context::CallerContext;

/// Check the caller's role against `operation`; a denial becomes a 403 body.
pub fn require(ctx: &CallerContext, operation: Operation) -> Result<(), Response> {
    authorize(ctx.caller(), operation)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
