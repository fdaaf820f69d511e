//! Chunk planning: splitting the input and assigning outline sections.

mod estimator;
mod plan;
mod split;
mod types;

pub use estimator::{ChunkEstimator, Clock, SystemClock, REUSE_WINDOW, SMALL_EDIT_RATIO};
pub use plan::{build_plan, highest_priority};
pub use split::{
    split_source, split_text, SourceText, BOUNDARY_RATIO, DEFAULT_CHUNK_SIZE_CHARS,
    DEFAULT_OVERLAP_CHARS,
};
pub use types::{ChunkPlanEntry, OutlineResult, OutlineSection, Priority, SectionId, TextSegment};
