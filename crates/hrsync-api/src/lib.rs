//! HR Sync API: library root.
//!
//! Exposes the route modules, state and configuration so integration tests
//! can build the same router as the binary.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.webhook.max_body_bytes;
    Router::new()
        .merge(routes::health::router())
        .merge(routes::webhook::router(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
