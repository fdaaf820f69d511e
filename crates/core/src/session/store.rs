//! Session storage trait.

use thiserror::Error;

use super::SessionRecord;
use crate::pipeline::PipelinePhase;

/// Error type for session storage.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Only sessions whose last persisted phase matches.
    pub phase: Option<PipelinePhase>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self {
            phase: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_phase(mut self, phase: PipelinePhase) -> Self {
        self.phase = Some(phase);
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

/// Key-value repository of session records.
///
/// Records are always read and written whole.
pub trait SessionStore: Send + Sync {
    /// Load a record by id.
    fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Insert or replace a record.
    fn save(&self, record: &SessionRecord) -> Result<(), SessionError>;

    /// List records, most recently updated first.
    fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>, SessionError>;

    /// Delete a record. Returns false if it did not exist.
    fn delete(&self, id: &str) -> Result<bool, SessionError>;
}
