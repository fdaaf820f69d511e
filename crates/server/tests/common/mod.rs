//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with a mock generation backend and SQLite stores in a temp directory,
//! so the HTTP surface can be exercised without an LLM.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use chunkwise_core::{
    config::DatabaseConfig, create_event_system, testing::MockGenerationService, Config, EventStore,
    PipelineConfig, PipelineCoordinator, RetryConfig, SqliteEventStore, SqliteSessionStore,
};
use chunkwise_server::{api, state::AppState};

/// Re-export fixtures for test convenience
pub use chunkwise_core::testing::fixtures;

/// Test fixture for API testing with a mock generation backend.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_session_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/sessions", json!({
///         "title": "Shock",
///         "input_text": "..."
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state, for waiting on background runs
    pub state: Arc<AppState>,
    /// Mock generation backend - script outlines, failures and delays
    pub service: Arc<MockGenerationService>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

impl TestFixture {
    /// Create a fixture with small chunks and no batch delay.
    pub async fn new() -> Self {
        Self::with_pipeline(TestConfig::small_chunks()).await
    }

    pub async fn with_pipeline(pipeline: PipelineConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            pipeline: pipeline.clone(),
            ..Default::default()
        };

        let session_store =
            Arc::new(SqliteSessionStore::new(&db_path).expect("Failed to create session store"));
        let event_store: Arc<dyn EventStore> =
            Arc::new(SqliteEventStore::new(&db_path).expect("Failed to create event store"));

        let (event_handle, event_writer) = create_event_system(Arc::clone(&event_store), 100);
        tokio::spawn(event_writer.run());

        let service = Arc::new(MockGenerationService::new());
        let coordinator = Arc::new(
            PipelineCoordinator::new(session_store, service.clone(), pipeline)
                .with_events(event_handle),
        );

        let state = Arc::new(AppState::new(config, coordinator, event_store));
        let router = api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            service,
            temp_dir,
        }
    }

    // ========================================================================
    // HTTP request helpers
    // ========================================================================

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// GET a non-JSON endpoint and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    // ========================================================================
    // Session helpers
    // ========================================================================

    /// Create a session over `chars` characters of study text and return its id.
    pub async fn create_session(&self, chars: usize) -> String {
        let response = self
            .post(
                "/api/v1/sessions",
                serde_json::json!({
                    "title": "Shock",
                    "tags": ["icu"],
                    "input_text": fixtures::study_text(chars),
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Wait until no run holds the session, then return the session body.
    pub async fn wait_for_run(&self, session_id: &str) -> Value {
        for _ in 0..200 {
            if !self.state.runs().is_running(session_id) {
                return self.get(&format!("/api/v1/sessions/{}", session_id)).await.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Run for session {} did not finish in time", session_id);
    }
}

/// Response from a test request
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Pipeline configurations used by the API tests
pub struct TestConfig;

impl TestConfig {
    /// 100-char chunks with 10 chars of overlap, two per batch, no retries.
    pub fn small_chunks() -> PipelineConfig {
        PipelineConfig {
            chunk_size_chars: 100,
            overlap_chars: 10,
            concurrency: 2,
            batch_delay_ms: 0,
            retry: RetryConfig::disabled(),
            ..Default::default()
        }
    }
}

/// Helper to assert response status with better error messages.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
