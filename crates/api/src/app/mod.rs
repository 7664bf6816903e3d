//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: repository, event bus, lending service and audit worker
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs and their mapping onto domain inputs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router over in-memory storage and the wall clock.
pub fn build_app(jwt_secret: String) -> std::io::Result<Router> {
    let services = Arc::new(AppServices::in_memory()?);
    Ok(build_app_with(services, jwt_secret))
}

/// Build the router over already-wired services (used by `main.rs`).
pub fn build_app_with(services: Arc<AppServices>, jwt_secret: String) -> Router {
    let jwt = Arc::new(equiplend_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
