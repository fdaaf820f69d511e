//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::generation::RetryConfig;
use crate::planner::{DEFAULT_CHUNK_SIZE_CHARS, DEFAULT_OVERLAP_CHARS};

/// Configuration for chunking, batching and synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: usize,

    /// Characters shared by consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap_chars: usize,

    /// Extraction calls dispatched together in one batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause before every batch after the first (milliseconds).
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,

    /// Leading characters of the input handed to synthesis.
    #[serde(default = "default_synthesis_sample")]
    pub synthesis_sample_chars: usize,

    /// Cap on error text carried by operational events.
    #[serde(default = "default_event_message_limit")]
    pub event_message_limit: usize,

    /// Retry policy for generation calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE_CHARS
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP_CHARS
}

fn default_concurrency() -> usize {
    2
}

fn default_batch_delay() -> u64 {
    500 // 0.5 seconds
}

fn default_synthesis_sample() -> usize {
    5000
}

fn default_event_message_limit() -> usize {
    200
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size_chars: default_chunk_size(),
            overlap_chars: default_overlap(),
            concurrency: default_concurrency(),
            batch_delay_ms: default_batch_delay(),
            synthesis_sample_chars: default_synthesis_sample(),
            event_message_limit: default_event_message_limit(),
            retry: RetryConfig::default(),
        }
    }
}
