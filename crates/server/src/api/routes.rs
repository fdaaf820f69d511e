use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, sessions};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Input helpers
        .route("/estimate", post(handlers::estimate))
        .route("/resume/candidate", post(handlers::resume_candidate))
        .route("/resume/decline", post(handlers::resume_decline))
        // Sessions
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/{id}/input", put(sessions::edit_input))
        .route("/sessions/{id}/goal", put(sessions::update_goal))
        .route("/sessions/{id}/events", get(sessions::list_events))
        // Runs
        .route("/sessions/{id}/generate", post(sessions::generate))
        .route("/sessions/{id}/continue", post(sessions::continue_all))
        .route("/sessions/{id}/retry-failed", post(sessions::retry_failed))
        .route(
            "/sessions/{id}/chunks/{chunk_id}/run",
            post(sessions::run_chunk),
        )
        .route("/sessions/{id}/resynthesize", post(sessions::resynthesize))
        .route("/sessions/{id}/resume", post(sessions::resume))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
