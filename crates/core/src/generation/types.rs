//! Request and response types exchanged with the generation backend.

use serde::{Deserialize, Serialize};

use crate::planner::{ChunkPlanEntry, OutlineSection, SectionId};

/// Target length of the final study document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLength {
    Light,
    #[default]
    Standard,
    Deep,
}

/// How liberally the synthesis step emphasises key terms and numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightDensity {
    Low,
    #[default]
    Medium,
    High,
}

/// Per-session study settings, passed verbatim to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudySettings {
    pub output_length: OutputLength,
    /// Allow material that is not in the source text.
    pub include_extra: bool,
    /// Add English glosses after key terms.
    pub include_translation: bool,
    pub highlight_density: HighlightDensity,
    /// Append the glossary to the final document.
    pub auto_include_glossary: bool,
}

impl Default for StudySettings {
    fn default() -> Self {
        Self {
            output_length: OutputLength::Standard,
            include_extra: false,
            include_translation: false,
            highlight_density: HighlightDensity::Medium,
            auto_include_glossary: true,
        }
    }
}

/// A question/answer pair for active recall practice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallQuestion {
    pub question: String,
    pub answer: String,
}

/// Extraction output as returned by the backend, before the plan-derived
/// fields are attached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedChunkPartial {
    pub tldr_points: Vec<String>,
    pub algorithm_steps: Vec<String>,
    pub numbers: Vec<String>,
    pub diagnostic_patterns: Vec<String>,
    pub pitfalls: Vec<String>,
    pub memory_aids: Vec<String>,
    pub active_recall_questions: Vec<RecallQuestion>,
    pub glossary_terms: Vec<String>,
    pub extra_content: Vec<String>,
    pub chunk_markdown: String,
}

impl ExtractedChunkPartial {
    /// Attach source offsets and covered sections from the plan entry.
    ///
    /// Coverage is copied from the plan, never inferred from the content.
    pub fn into_result(self, entry: &ChunkPlanEntry) -> ExtractedChunkData {
        ExtractedChunkData {
            chunk_id: entry.chunk_id,
            source_start: entry.start,
            source_end: entry.end,
            covers_outline_ids: entry.outline_ids.clone(),
            extracted: self,
        }
    }
}

/// Durable output of one successful chunk execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedChunkData {
    pub chunk_id: usize,
    pub source_start: usize,
    pub source_end: usize,
    pub covers_outline_ids: Vec<SectionId>,
    #[serde(flatten)]
    pub extracted: ExtractedChunkPartial,
}

impl ExtractedChunkData {
    pub fn recall_count(&self) -> usize {
        self.extracted.active_recall_questions.len()
    }

    pub fn covers(&self, section_id: &str) -> bool {
        self.covers_outline_ids.iter().any(|id| id == section_id)
    }
}

/// One glossary line of the final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub english_term: Option<String>,
}

/// Result of the synthesis phase.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisOutput {
    /// Final study document as markdown.
    pub final_document: String,
    #[serde(default)]
    pub glossary_entries: Vec<GlossaryEntry>,
}

/// Input for outline generation.
#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub raw_text: String,
    pub title: String,
    pub tags: Vec<String>,
}

/// Input for one chunk extraction.
#[derive(Debug, Clone)]
pub struct ChunkExtractionRequest {
    pub chunk_text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub settings: StudySettings,
    pub focus_sections: Vec<OutlineSection>,
}

/// Input for the synthesis phase.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub outline: Vec<OutlineSection>,
    pub chunk_results: Vec<ExtractedChunkData>,
    pub settings: StudySettings,
    /// Leading slice of the raw input, for tone and terminology.
    pub text_sample: String,
    pub title: String,
    pub tags: Vec<String>,
}
