use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use chunkwise_core::{session::SessionSummary, SanitizedConfig, SessionFilter};

use super::error::ApiError;
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

/// Request body carrying the text currently being edited.
#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub chunks: usize,
}

/// Estimate how many chunks `text` would be split into.
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TextBody>,
) -> Json<EstimateResponse> {
    let chunks = state.estimator().estimate(&body.text);
    Json(EstimateResponse { chunks })
}

#[derive(Debug, Serialize)]
pub struct ResumeCandidateResponse {
    pub candidate: Option<SessionSummary>,
}

/// Most recently updated unfinished session planned from exactly `text`.
pub async fn resume_candidate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TextBody>,
) -> Result<Json<ResumeCandidateResponse>, ApiError> {
    let sessions = state
        .coordinator()
        .list_sessions(&SessionFilter::new().with_limit(i64::MAX))?;

    let candidate = state
        .resume_controller()
        .find_candidate(&body.text, &sessions)
        .map(SessionSummary::from);

    Ok(Json(ResumeCandidateResponse { candidate }))
}

/// Stop offering resume candidates for `text` until it changes.
pub async fn resume_decline(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TextBody>,
) -> StatusCode {
    let mut controller = state.resume_controller();
    let digest = controller.observe_edit(&body.text);
    controller.decline(digest);
    StatusCode::NO_CONTENT
}
