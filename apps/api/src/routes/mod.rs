pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::lifecycle::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Stateless helpers
        .route("/api/v1/analysis/normalize", post(handlers::handle_normalize))
        .route("/api/v1/errors/reduce", post(handlers::handle_reduce))
        // Lifecycle API
        .route(
            "/api/v1/subjects/:kind/:id",
            get(handlers::handle_get_snapshot),
        )
        .route("/api/v1/subjects/:kind/:id/load", post(handlers::handle_load))
        .route(
            "/api/v1/subjects/:kind/:id/analyze",
            post(handlers::handle_analyze),
        )
        .route(
            "/api/v1/subjects/:kind/:id/reanalyze",
            post(handlers::handle_reanalyze),
        )
        .route(
            "/api/v1/subjects/:kind/:id/persist",
            post(handlers::handle_persist),
        )
        .route("/api/v1/subjects/:kind/:id/reset", post(handlers::handle_reset))
        .route(
            "/api/v1/subjects/:kind/:id/related/:link",
            get(handlers::handle_related),
        )
        .with_state(state)
}
