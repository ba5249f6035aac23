//! API route modules.

pub mod files;
pub mod health;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health::router())
        .nest("/api/files", files::router())
        .nest("/api/stats", files::stats_router())
        .with_state(state)
}
