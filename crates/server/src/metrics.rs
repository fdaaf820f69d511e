//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the chunkwise server:
//! - HTTP request metrics (latency, counts)
//! - Background pipeline runs (in flight, rejected)
//! - Sessions by phase (collected dynamically)
//!
//! Pipeline internals (extractions, batches, retries) live in
//! `chunkwise_core::metrics` and are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use tracing::warn;

use chunkwise_core::{PipelinePhase, SessionFilter};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "chunkwise_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkwise_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "chunkwise_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Run Metrics
// =============================================================================

/// Background pipeline runs currently executing.
pub static RUNS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "chunkwise_runs_in_flight",
        "Number of pipeline runs currently executing",
    )
    .unwrap()
});

/// Runs refused because the session already had one in flight.
pub static RUNS_REJECTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "chunkwise_runs_rejected_total",
        "Run requests rejected while another run held the session",
    )
    .unwrap()
});

// =============================================================================
// Session Metrics
// =============================================================================

/// Current session count by phase.
pub static SESSIONS_BY_PHASE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("chunkwise_sessions_by_phase", "Current session count by phase"),
        &["phase"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Runs
    registry.register(Box::new(RUNS_IN_FLIGHT.clone())).unwrap();
    registry
        .register(Box::new(RUNS_REJECTED_TOTAL.clone()))
        .unwrap();

    // Sessions
    registry
        .register(Box::new(SESSIONS_BY_PHASE.clone()))
        .unwrap();

    // Core metrics (extraction, pipeline runs, generation backend)
    for metric in chunkwise_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

const PHASES: [PipelinePhase; 6] = [
    PipelinePhase::Idle,
    PipelinePhase::Outlining,
    PipelinePhase::Chunking,
    PipelinePhase::Stitching,
    PipelinePhase::Complete,
    PipelinePhase::Error,
];

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    RUNS_IN_FLIGHT.set(state.runs().active_count() as i64);

    for phase in PHASES {
        let filter = SessionFilter::new().with_phase(phase).with_limit(i64::MAX);
        if let Ok(sessions) = state.coordinator().list_sessions(&filter) {
            SESSIONS_BY_PHASE
                .with_label_values(&[phase.as_str()])
                .set(sessions.len() as i64);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
