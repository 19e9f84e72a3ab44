//! Axum router: every URL path and the middleware stack.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::system::health;
use crate::handlers::tasks::{create_doi_task, create_search_task, get_task};
use crate::sse::{all_tasks_sse, task_sse};
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/health", get(health))

        // Task API
        .route("/api/tasks/search",      post(create_search_task))
        .route("/api/tasks/doi",         post(create_doi_task))
        .route("/api/tasks/{id}",        get(get_task))
        .route("/api/tasks/{id}/events", get(task_sse))

        // SSE streaming
        .route("/api/events", get(all_tasks_sse))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
