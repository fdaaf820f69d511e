//! Session API handlers.
//!
//! Run operations are validated up front and then executed on a background
//! task; the handler answers `202 Accepted` once the task is spawned. Clients
//! poll the session to follow progress.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use chunkwise_core::{
    session::SessionSummary, CreateSessionRequest, EventFilter, EventRecord, PipelineOperation,
    PipelinePhase, SessionFilter, SessionRecord, StudySettings,
};

use super::error::ApiError;
use crate::metrics::RUNS_REJECTED_TOTAL;
use crate::runs::RunGuard;
use crate::state::AppState;

/// Maximum allowed limit for list queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for list queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a session
#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub input_text: String,
    #[serde(default)]
    pub settings: StudySettings,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    /// Filter by last persisted phase
    pub phase: Option<PipelinePhase>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct EditInputBody {
    pub input_text: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGoalBody {
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Answer to an accepted run request.
#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub session_id: String,
    pub operation: String,
    /// Phase the session was in when the run was accepted.
    pub phase: PipelinePhase,
}

#[derive(Debug, Deserialize)]
pub struct EventParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventRecord>,
    pub total: i64,
}

// ============================================================================
// Session management
// ============================================================================

/// Create a new session
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<SessionRecord>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }

    let record = state.coordinator().create_session(CreateSessionRequest {
        title: body.title,
        tags: body.tags,
        input_text: body.input_text,
        settings: body.settings,
    })?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// List sessions, most recently updated first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = SessionFilter::new().with_limit(limit).with_offset(offset);
    if let Some(phase) = params.phase {
        filter = filter.with_phase(phase);
    }

    let sessions = state.coordinator().list_sessions(&filter)?;

    Ok(Json(ListSessionsResponse {
        sessions: sessions.iter().map(SessionSummary::from).collect(),
        limit,
        offset,
    }))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    Ok(Json(state.coordinator().get_session(&id)?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _slot = claim_idle(&state, &id)?;
    state.coordinator().delete_session(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the session's input text
pub async fn edit_input(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<EditInputBody>,
) -> Result<Json<SessionRecord>, ApiError> {
    let _slot = claim_idle(&state, &id)?;
    Ok(Json(state.coordinator().edit_input(&id, body.input_text)?))
}

/// Replace the session's study goal
pub async fn update_goal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateGoalBody>,
) -> Result<Json<SessionRecord>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    let _slot = claim_idle(&state, &id)?;
    Ok(Json(
        state.coordinator().update_goal(&id, body.title, body.tags)?,
    ))
}

/// Operational events recorded for a session, newest first
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<EventParams>,
) -> Result<Json<EventListResponse>, ApiError> {
    state.coordinator().get_session(&id)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);
    let filter = EventFilter::new()
        .with_session_id(&id)
        .with_limit(limit)
        .with_offset(offset);

    let events = state
        .event_store()
        .query(&filter)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let count_filter = EventFilter {
        limit: i64::MAX,
        offset: 0,
        ..filter
    };
    let total = state
        .event_store()
        .count(&count_filter)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(EventListResponse { events, total }))
}

// ============================================================================
// Run operations
// ============================================================================

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::Generate)
}

pub async fn continue_all(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::Continue)
}

pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::RetryFailed)
}

pub async fn run_chunk(
    State(state): State<Arc<AppState>>,
    Path((id, chunk_id)): Path<(String, usize)>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::RunSingle(chunk_id))
}

pub async fn resynthesize(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::Resynthesize)
}

pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    start_run(&state, id, PipelineOperation::Resume)
}

/// Claim the session's run slot, validate the operation and spawn it.
fn start_run(
    state: &Arc<AppState>,
    session_id: String,
    operation: PipelineOperation,
) -> Result<(StatusCode, Json<RunAccepted>), ApiError> {
    let Some(guard) = state.runs().try_begin(&session_id) else {
        RUNS_REJECTED_TOTAL.inc();
        return Err(run_in_progress(&session_id));
    };

    // The guard is dropped on any early return here, releasing the slot.
    let record = state.coordinator().preflight(&session_id, operation)?;

    let coordinator = Arc::clone(state.coordinator());
    tokio::spawn(async move {
        let session_id = guard.session_id().to_string();
        match coordinator.run(&session_id, operation).await {
            Ok(final_state) => info!(
                session_id = %session_id,
                operation = operation.as_str(),
                phase = %final_state.phase,
                "Run finished"
            ),
            Err(e) => warn!(
                session_id = %session_id,
                operation = operation.as_str(),
                error = %e,
                "Run rejected"
            ),
        }
        drop(guard);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            session_id,
            operation: operation.as_str().to_string(),
            phase: record.pipeline_state.phase,
        }),
    ))
}

/// Take the session's run slot for the length of a mutation, so no run can
/// start until the returned guard is dropped.
fn claim_idle(state: &AppState, session_id: &str) -> Result<RunGuard, ApiError> {
    state
        .runs()
        .try_begin(session_id)
        .ok_or_else(|| run_in_progress(session_id))
}

fn run_in_progress(session_id: &str) -> ApiError {
    ApiError::conflict(format!(
        "a run is already in progress for session {}",
        session_id
    ))
}
