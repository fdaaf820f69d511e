use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{PipelinePhase, PipelineState};

/// Kinds of operational pipeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    Start,
    Resume,
    Complete,
    Error,
}

impl PipelineEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineEventKind::Start => "start",
            PipelineEventKind::Resume => "resume",
            PipelineEventKind::Complete => "complete",
            PipelineEventKind::Error => "error",
        }
    }
}

/// Operational event handed to the observability sink.
///
/// Carries counts and ids only. Error text is capped at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub kind: PipelineEventKind,
    pub session_id: String,
    pub phase: PipelinePhase,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub tag_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PipelineEvent {
    /// Snapshot `state` as an event of `kind`.
    pub fn from_state(
        kind: PipelineEventKind,
        session_id: impl Into<String>,
        state: &PipelineState,
        tag_count: usize,
    ) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            phase: state.phase,
            total_chunks: state.total_chunks,
            processed_chunks: state.processed_chunks,
            tag_count,
            error_message: None,
        }
    }

    /// Attach an error message, cut to at most `limit` characters.
    pub fn with_error(mut self, message: &str, limit: usize) -> Self {
        self.error_message = Some(truncate_message(message, limit));
        self
    }
}

/// First `limit` characters of `message`.
pub fn truncate_message(message: &str, limit: usize) -> String {
    message.chars().take(limit).collect()
}

/// Envelope wrapping an event with its emission time.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: PipelineEvent,
}

/// Stored event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub session_id: String,
    pub data: PipelineEvent,
}
