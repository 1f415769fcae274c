//! Router assembly.
//!
//! Kept separate from `main` so the test suite can build the exact
//! production router around an in-memory store.

use crate::handlers;
use crate::middleware::identity::identity_middleware;
use crate::state::AppState;
use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    // API routes carry the owner identity extension.
    let api_routes = Router::new()
        .route("/api/v1/records", post(handlers::records::create_record))
        .route(
            "/api/v1/records/manage",
            post(handlers::records::manage_records),
        )
        .route(
            "/api/v1/records/{id}/image",
            get(handlers::records::image_reference),
        )
        .route_layer(axum_middleware::from_fn(identity_middleware));

    Router::new()
        // Public routes: liveness, the tracking redirect, signed image serving
        .route("/health", get(handlers::health::health_check))
        .route("/r/{id}", get(handlers::track::resolve))
        .route("/i/{*key}", get(handlers::track::serve_image))
        .merge(api_routes)
        // Request tracing for observability
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
