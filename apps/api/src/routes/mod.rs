pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::errors::not_found;
use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Queue control plane
        .route(
            "/start-workflow/:items",
            post(handlers::handle_start_workflow),
        )
        .route(
            "/performance-status",
            get(handlers::handle_performance_status),
        )
        .route("/queue-status", get(handlers::handle_queue_status))
        .route(
            "/reset-performance",
            post(handlers::handle_reset_performance),
        )
        .route(
            "/wait-for-completion",
            get(handlers::handle_wait_for_completion),
        )
        // Cover letter API
        .route(
            "/api/v1/cover-letters",
            post(handlers::handle_submit_cover_letter),
        )
        .fallback(not_found)
        .with_state(state)
}
