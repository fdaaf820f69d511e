//! Session API tests.
//!
//! These drive the router in-process with the mock generation backend:
//! - Session CRUD, input and goal edits
//! - Background runs answering 202 and completing
//! - 409 for in-flight runs and edited input, 422 for missing state, 404s
//! - Estimate, resume candidate/decline, events, config, metrics

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{fixtures, TestFixture};

fn session_path(id: &str) -> String {
    format!("/api/v1/sessions/{}", id)
}

fn run_path(id: &str, operation: &str) -> String {
    format!("/api/v1/sessions/{}/{}", id, operation)
}

// ============================================================================
// Session management
// ============================================================================

#[tokio::test]
async fn test_create_get_list_delete() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/sessions",
            json!({
                "title": "Shock",
                "tags": ["icu", "cardio"],
                "input_text": fixtures::study_text(350),
                "settings": { "output_length": "deep" }
            }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    let id = response.body["id"].as_str().unwrap().to_string();
    assert_json_path!(response.body, "title", json!("Shock"));
    assert_json_path!(response.body, "last_phase", json!("idle"));
    assert_eq!(response.body["settings"]["output_length"], "deep");

    let response = fixture.get(&session_path(&id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["input_text"], json!(fixtures::study_text(350)));

    let response = fixture.get("/api/v1/sessions").await;
    assert_status!(response, StatusCode::OK);
    let sessions = response.body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], json!(id));
    assert_eq!(sessions[0]["phase"], "idle");
    assert_eq!(sessions[0]["input_length"], 350);
    assert!(sessions[0].get("input_text").is_none());

    let response = fixture.get("/api/v1/sessions?phase=complete").await;
    assert_eq!(response.body["sessions"].as_array().unwrap().len(), 0);

    let response = fixture.delete(&session_path(&id)).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = fixture.get(&session_path(&id)).await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("session not found"));
}

#[tokio::test]
async fn test_create_requires_title() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/sessions",
            json!({ "title": "  ", "input_text": "text" }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_pagination() {
    let fixture = TestFixture::new().await;
    for _ in 0..3 {
        fixture.create_session(50).await;
    }

    let response = fixture.get("/api/v1/sessions?limit=2").await;
    assert_eq!(response.body["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["limit"], 2);

    let response = fixture.get("/api/v1/sessions?limit=2&offset=2").await;
    assert_eq!(response.body["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_goal_update_marks_completed_run_stale() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_session(350).await;

    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["is_goal_stale"], false);

    let response = fixture
        .put(
            &format!("/api/v1/sessions/{}/goal", id),
            json!({ "title": "Septic shock", "tags": ["icu"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["title"], "Septic shock");
    assert_eq!(response.body["pipeline_state"]["is_goal_stale"], true);
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_generate_runs_in_background_to_completion() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_session(350).await;

    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_json_path!(response.body, "operation", json!("generate"));
    assert_json_path!(response.body, "phase", json!("idle"));

    let session = fixture.wait_for_run(&id).await;
    let state = &session["pipeline_state"];
    assert_eq!(state["phase"], "complete");
    assert_eq!(state["total_chunks"], 4);
    assert_eq!(state["processed_chunks"], 4);
    assert_eq!(session["last_phase"], "complete");
    assert!(session["document"]["markdown"]
        .as_str()
        .unwrap()
        .contains("## Chunk 3"));
    assert!(session["mastery_status"]["score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_second_run_conflicts_while_first_in_flight() {
    let fixture = TestFixture::new().await;
    fixture.service.set_extraction_delay_ms(100).await;
    let id = fixture.create_session(350).await;

    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);

    // The run slot is claimed before the handler answers.
    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("already in progress"));

    let response = fixture
        .put(
            &format!("/api/v1/sessions/{}/input", id),
            json!({ "input_text": "other" }),
        )
        .await;
    assert_status!(response, StatusCode::CONFLICT);

    let response = fixture.delete(&session_path(&id)).await;
    assert_status!(response, StatusCode::CONFLICT);

    // Other sessions are not blocked.
    let other = fixture.create_session(50).await;
    let response = fixture.post_empty(&run_path(&other, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);

    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["phase"], "complete");
    fixture.wait_for_run(&other).await;

    let response = fixture.post_empty(&run_path(&id, "resynthesize")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    fixture.wait_for_run(&id).await;
}

#[tokio::test]
async fn test_mutations_hold_the_run_slot() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_session(150).await;

    let slot = fixture.state.runs().try_begin(&id).unwrap();
    let response = fixture
        .put(
            &format!("/api/v1/sessions/{}/goal", id),
            json!({ "title": "Sepsis", "tags": [] }),
        )
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    drop(slot);

    let response = fixture
        .put(
            &format!("/api/v1/sessions/{}/input", id),
            json!({ "input_text": "revised notes" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert!(!fixture.state.runs().is_running(&id));

    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["phase"], "complete");
}

#[tokio::test]
async fn test_failed_chunk_then_retry_failed() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(1, "rate limited").await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    let session = fixture.wait_for_run(&id).await;
    let state = &session["pipeline_state"];
    assert_eq!(state["phase"], "error");
    assert_eq!(state["chunk_states"]["1"]["status"], "error");
    assert_eq!(state["chunk_states"]["2"]["status"], "pending");
    assert!(session["last_error_message"]
        .as_str()
        .unwrap()
        .contains("rate limited"));

    let summary = fixture.get("/api/v1/sessions?phase=error").await;
    assert_eq!(summary.body["sessions"].as_array().unwrap().len(), 1);

    fixture.service.clear_failures().await;
    let response = fixture.post_empty(&run_path(&id, "retry-failed")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_json_path!(response.body, "operation", json!("retry_failed"));
    assert_json_path!(response.body, "phase", json!("error"));

    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["phase"], "complete");
    assert_eq!(session["pipeline_state"]["processed_chunks"], 4);
    assert_eq!(session["last_error_message"], Value::Null);
}

#[tokio::test]
async fn test_run_single_chunk() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(0, "timeout").await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    fixture.service.clear_failures().await;
    fixture.service.clear_calls().await;
    let response = fixture
        .post_empty(&format!("/api/v1/sessions/{}/chunks/0/run", id))
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_json_path!(response.body, "operation", json!("run_single"));

    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["chunk_states"]["0"]["status"], "complete");
    assert_eq!(session["pipeline_state"]["chunk_states"]["0"]["attempts"], 2);

    let calls = fixture.service.extraction_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].chunk_index, 0);
    // A single chunk run never synthesizes.
    assert!(fixture.service.synthesis_calls().await.is_empty());

    let response = fixture
        .post_empty(&format!("/api/v1/sessions/{}/chunks/99/run", id))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_continue_after_input_edit_conflicts() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(2, "overloaded").await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    let response = fixture
        .put(
            &format!("/api/v1/sessions/{}/input", id),
            json!({ "input_text": fixtures::study_text(420) }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    for operation in ["continue", "retry-failed", "resynthesize"] {
        let response = fixture.post_empty(&run_path(&id, operation)).await;
        assert_status!(response, StatusCode::CONFLICT);
    }

    // Rejected requests release the run slot.
    assert!(!fixture.state.runs().is_running(&id));

    // A full generate starts over from the new text.
    fixture.service.clear_failures().await;
    let response = fixture.post_empty(&run_path(&id, "generate")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["phase"], "complete");
    assert_eq!(session["pipeline_state"]["total_chunks"], 5);
}

#[tokio::test]
async fn test_missing_prerequisites() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_session(350).await;

    for operation in ["continue", "retry-failed", "resynthesize"] {
        let response = fixture.post_empty(&run_path(&id, operation)).await;
        assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.body["error"]
            .as_str()
            .unwrap()
            .contains("missing prerequisite"));
    }

    let response = fixture
        .post_empty(&format!("/api/v1/sessions/{}/chunks/0/run", id))
        .await;
    assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_resynthesize_without_chunk_results() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(0, "boom").await;
    fixture.service.fail_chunk(1, "boom").await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    let response = fixture.post_empty(&run_path(&id, "resynthesize")).await;
    assert_status!(response, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("no chunk results"));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let fixture = TestFixture::new().await;
    let missing = "550e8400-e29b-41d4-a716-446655440000";

    for operation in ["generate", "continue", "retry-failed", "resynthesize", "resume"] {
        let response = fixture.post_empty(&run_path(missing, operation)).await;
        assert_status!(response, StatusCode::NOT_FOUND);
    }

    let response = fixture.delete(&session_path(missing)).await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let response = fixture
        .get(&format!("/api/v1/sessions/{}/events", missing))
        .await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resume_continues_where_it_stopped() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(3, "connection reset").await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    fixture.service.clear_failures().await;
    fixture.service.clear_calls().await;
    let response = fixture.post_empty(&run_path(&id, "resume")).await;
    assert_status!(response, StatusCode::ACCEPTED);

    let session = fixture.wait_for_run(&id).await;
    assert_eq!(session["pipeline_state"]["phase"], "complete");
    assert_eq!(fixture.service.outline_calls().await, 0);
    let rerun: Vec<usize> = fixture
        .service
        .extraction_calls()
        .await
        .iter()
        .map(|c| c.chunk_index)
        .collect();
    assert_eq!(rerun, vec![3]);

    // Resuming a complete session is a no-op.
    let response = fixture.post_empty(&run_path(&id, "resume")).await;
    assert_status!(response, StatusCode::ACCEPTED);
    fixture.wait_for_run(&id).await;
    assert_eq!(fixture.service.synthesis_calls().await.len(), 1);
}

// ============================================================================
// Input helpers
// ============================================================================

#[tokio::test]
async fn test_estimate() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/estimate", json!({ "text": fixtures::study_text(350) }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "chunks", json!(4));

    let response = fixture.post("/api/v1/estimate", json!({ "text": "  " })).await;
    assert_json_path!(response.body, "chunks", json!(0));
}

#[tokio::test]
async fn test_resume_candidate_and_decline() {
    let fixture = TestFixture::new().await;
    fixture.service.fail_chunk(1, "quota").await;
    let text = fixtures::study_text(350);
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    let response = fixture
        .post("/api/v1/resume/candidate", json!({ "text": text }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["candidate"]["id"], json!(id));
    assert_eq!(response.body["candidate"]["phase"], "error");

    let response = fixture
        .post("/api/v1/resume/candidate", json!({ "text": "something else" }))
        .await;
    assert_eq!(response.body["candidate"], Value::Null);

    let response = fixture
        .post("/api/v1/resume/decline", json!({ "text": text }))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = fixture
        .post("/api/v1/resume/candidate", json!({ "text": text }))
        .await;
    assert_eq!(response.body["candidate"], Value::Null);

    // Editing the text clears the decline.
    fixture
        .post("/api/v1/resume/candidate", json!({ "text": "edited" }))
        .await;
    let response = fixture
        .post("/api/v1/resume/candidate", json!({ "text": text }))
        .await;
    assert_eq!(response.body["candidate"]["id"], json!(id));
}

// ============================================================================
// Events, config, health, metrics
// ============================================================================

#[tokio::test]
async fn test_events_recorded_for_run() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_session(350).await;

    fixture.post_empty(&run_path(&id, "generate")).await;
    fixture.wait_for_run(&id).await;

    // The event writer persists asynchronously.
    let mut events = Vec::new();
    for _ in 0..100 {
        let response = fixture
            .get(&format!("/api/v1/sessions/{}/events", id))
            .await;
        assert_status!(response, StatusCode::OK);
        events = response.body["events"].as_array().unwrap().clone();
        if events.len() >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let kinds: Vec<&str> = events.iter().map(|e| e["kind"].as_str().unwrap()).collect();
    // Newest first.
    assert_eq!(kinds, vec!["complete", "start"]);
    assert_eq!(events[0]["data"]["total_chunks"], 4);
    assert_eq!(events[0]["data"]["tag_count"], 1);
}

#[tokio::test]
async fn test_health_and_config() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["pipeline"]["chunk_size_chars"], 100);
    assert_eq!(response.body["llm"], Value::Null);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.create_session(50).await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("chunkwise_http_requests_total"));
    assert!(body.contains("chunkwise_sessions_by_phase"));
    assert!(body.contains("chunkwise_runs_in_flight"));
}
