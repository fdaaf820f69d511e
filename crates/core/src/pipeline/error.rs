//! Pipeline contract errors.
//!
//! Collaborator failures are not errors here: they become state
//! transitions on the persisted `PipelineState`.

use thiserror::Error;

use super::chunk_state::ChunkTransitionError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The live input no longer matches the digest the run was planned from.
    #[error("input text has changed since the outline was generated")]
    DigestMismatch,

    /// An operation ran without the state it depends on.
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("chunk {chunk_id} not found in plan of session {session_id}")]
    ChunkNotFound { session_id: String, chunk_id: usize },

    /// Fast resynthesize needs at least one completed chunk.
    #[error("no chunk results to synthesize from")]
    NoChunkResults,

    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] ChunkTransitionError),

    #[error("session store error: {0}")]
    Store(#[from] SessionError),
}

impl PipelineError {
    /// True for errors caused by the caller's view of the session being out
    /// of date rather than by a bug or an outage.
    pub fn is_conflict(&self) -> bool {
        matches!(self, PipelineError::DigestMismatch)
    }
}
