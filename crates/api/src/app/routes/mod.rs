use axum::{routing::get, Router};

pub mod categories;
pub mod equipment;
pub mod requests;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/categories", categories::router())
        .nest("/equipment", equipment::router())
        .nest("/requests", requests::router())
}
