//! Per-chunk execution state machine.
//!
//! ```text
//! pending ──► running ──► complete
//!               ▲   └───► error
//!               └──────────┘  (retry / explicit re-run)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::generation::ExtractedChunkData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Running => "running",
            ChunkStatus::Complete => "complete",
            ChunkStatus::Error => "error",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chunk {chunk_id}: cannot go from {from} to {to}")]
pub struct ChunkTransitionError {
    pub chunk_id: usize,
    pub from: ChunkStatus,
    pub to: ChunkStatus,
}

/// Run state of one planned chunk.
///
/// `result` is present iff `status == Complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRunState {
    pub chunk_id: usize,
    pub status: ChunkStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractedChunkData>,
}

impl ChunkRunState {
    pub fn pending(chunk_id: usize) -> Self {
        Self {
            chunk_id,
            status: ChunkStatus::Pending,
            attempts: 0,
            last_error: None,
            result: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == ChunkStatus::Complete
    }

    /// Dispatch: any state may (re)enter `running`.
    ///
    /// A re-run of a completed chunk discards the old result; it is only
    /// replaced on the next success.
    pub fn begin_attempt(&mut self) {
        self.status = ChunkStatus::Running;
        self.attempts += 1;
        self.last_error = None;
        self.result = None;
    }

    pub fn complete(&mut self, result: ExtractedChunkData) -> Result<(), ChunkTransitionError> {
        self.require_running(ChunkStatus::Complete)?;
        self.status = ChunkStatus::Complete;
        self.last_error = None;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ChunkTransitionError> {
        self.require_running(ChunkStatus::Error)?;
        self.status = ChunkStatus::Error;
        self.last_error = Some(message.into());
        Ok(())
    }

    fn require_running(&self, to: ChunkStatus) -> Result<(), ChunkTransitionError> {
        if self.status == ChunkStatus::Running {
            Ok(())
        } else {
            Err(ChunkTransitionError {
                chunk_id: self.chunk_id,
                from: self.status,
                to,
            })
        }
    }
}
