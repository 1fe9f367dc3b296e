//! Axum router construction for the read surface.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the router for every read endpoint, with CORS open to any origin
/// and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/object-apis/event-t", get(handlers::event_t))
        .route("/object-apis/wait-t", get(handlers::wait_t))
        .route("/object-apis/revisions", get(handlers::revisions))
        .route("/object-apis/events", get(handlers::events))
        .route("/object-apis/objects/{type}/{id}", get(handlers::object))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
