use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{EventRecord, PipelineEventKind};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying stored events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub kind: Option<PipelineEventKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_kind(mut self, kind: PipelineEventKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for pipeline event storage.
pub trait EventStore: Send + Sync {
    /// Insert a record, returns the assigned id.
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError>;

    /// Newest first.
    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError>;

    fn count(&self, filter: &EventFilter) -> Result<i64, EventError>;
}
