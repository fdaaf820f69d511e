pub mod config;
pub mod digest;
pub mod events;
pub mod generation;
pub mod metrics;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod resume;
pub mod session;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LlmConfig,
    LlmProvider, SanitizedConfig,
};
pub use digest::{digests_match, InputDigest};
pub use events::{
    create_event_system, EventFilter, EventHandle, EventRecord, EventStore, EventWriter,
    PipelineEvent, PipelineEventKind, SqliteEventStore,
};
pub use generation::{
    AnthropicClient, GenerationError, GenerationService, LlmGenerationService, OllamaClient,
    RetryConfig, RetryingGenerationService, StudySettings,
};
pub use pipeline::{
    ChunkStatus, CreateSessionRequest, PipelineConfig, PipelineCoordinator, PipelineError,
    PipelineOperation, PipelinePhase, PipelineState, StudyGoal,
};
pub use planner::{
    build_plan, split_text, ChunkEstimator, ChunkPlanEntry, OutlineResult, OutlineSection,
    Priority,
};
pub use progress::{compute_coverage, compute_mastery, CoverageReport, MasteryStatus};
pub use resume::{can_fast_resynthesize, is_resume_candidate, ResumeController};
pub use session::{SessionError, SessionFilter, SessionRecord, SessionStore, SqliteSessionStore};
