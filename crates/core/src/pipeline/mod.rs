//! The study pipeline: chunk state machine, batched executor and the
//! coordinator that drives a session through its phases.

mod chunk_state;
mod config;
mod coordinator;
mod error;
mod executor;
mod types;

pub use chunk_state::{ChunkRunState, ChunkStatus, ChunkTransitionError};
pub use config::PipelineConfig;
pub use coordinator::{CreateSessionRequest, PipelineCoordinator, PipelineOperation};
pub use error::PipelineError;
pub use executor::{ChunkExecutor, ExecutionOutcome, StateSink};
pub use types::{derive_chunk_results, normalize_tags, PipelinePhase, PipelineState, StudyGoal};
