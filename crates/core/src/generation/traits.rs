//! The generation collaborator seam.

use async_trait::async_trait;
use thiserror::Error;

use super::llm::LlmError;
use super::types::{
    ChunkExtractionRequest, ExtractedChunkPartial, OutlineRequest, SynthesisOutput,
    SynthesisRequest,
};
use crate::planner::OutlineSection;

/// Errors raised by a generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    /// Whether resubmitting the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Llm(e) => e.is_transient(),
            GenerationError::InvalidResponse(_) | GenerationError::Failed(_) => false,
        }
    }
}

/// External text-generation service driving the three pipeline phases.
///
/// Every operation either returns a complete result or fails; there are no
/// partial results.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Name of this backend for logging.
    fn name(&self) -> &str;

    /// Discover the outline sections of the whole input.
    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<OutlineSection>, GenerationError>;

    /// Extract study material from one chunk.
    async fn extract_chunk(
        &self,
        request: &ChunkExtractionRequest,
    ) -> Result<ExtractedChunkPartial, GenerationError>;

    /// Merge all chunk results into the final document.
    async fn synthesize(&self, request: &SynthesisRequest)
        -> Result<SynthesisOutput, GenerationError>;
}
