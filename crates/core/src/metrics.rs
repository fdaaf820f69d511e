//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Chunk extraction (attempts, durations, batches)
//! - Pipeline runs and synthesis
//! - The generation backend (retries, LLM token usage)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

// =============================================================================
// Extraction Metrics
// =============================================================================

/// Chunk extraction calls by result.
pub static CHUNK_EXTRACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chunkwise_chunk_extractions_total",
            "Total chunk extraction calls",
        ),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Duration of a single chunk extraction call in seconds.
pub static CHUNK_EXTRACTION_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chunkwise_chunk_extraction_duration_seconds",
            "Time spent extracting a single chunk",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .unwrap()
});

/// Extraction batches by result.
pub static BATCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkwise_batches_total", "Total extraction batches"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Pipeline operations by operation and result.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkwise_pipeline_runs_total", "Total pipeline operations"),
        &["operation", "result"],
    )
    .unwrap()
});

/// Synthesis duration in seconds.
pub static SYNTHESIS_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chunkwise_synthesis_duration_seconds",
            "Time spent synthesizing the final document",
        )
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .unwrap()
});

// =============================================================================
// Generation Backend Metrics
// =============================================================================

/// Retries of transient generation failures by operation.
pub static GENERATION_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chunkwise_generation_retries_total",
            "Total retries of failed generation calls",
        ),
        &["operation"], // "outline", "extract", "synthesize"
    )
    .unwrap()
});

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("chunkwise_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Extraction
        Box::new(CHUNK_EXTRACTIONS.clone()),
        Box::new(CHUNK_EXTRACTION_DURATION.clone()),
        Box::new(BATCHES.clone()),
        // Pipeline
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(SYNTHESIS_DURATION.clone()),
        // Generation backend
        Box::new(GENERATION_RETRIES.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
