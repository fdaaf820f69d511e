//! Generation backend: collaborator contracts, retry policy and the LLM
//! implementation.

mod llm;
mod llm_service;
mod retry;
mod traits;
mod types;

pub use llm::{
    extract_json_object, AnthropicClient, CompletionRequest, CompletionResponse, LlmClient,
    LlmError, LlmUsage, OllamaClient, DEFAULT_TIMEOUT,
};
pub use llm_service::{LlmGenerationService, LlmServiceConfig};
pub use retry::{with_retry, RetryConfig, RetryingGenerationService};
pub use traits::{GenerationError, GenerationService};
pub use types::{
    ChunkExtractionRequest, ExtractedChunkData, ExtractedChunkPartial, GlossaryEntry,
    HighlightDensity, OutlineRequest, OutputLength, RecallQuestion, StudySettings,
    SynthesisOutput, SynthesisRequest,
};
