//! Outline and chunk plan types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of an outline section, as assigned by the outline collaborator.
pub type SectionId = String;

/// How important an outline section is for the study goal.
///
/// Deserialization is lenient: values are matched case-insensitively and
/// anything unrecognised becomes `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Ranking used to pick the highest priority of a chunk (high=3, medium=2, low=1).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Priority::from(value.as_str())
    }
}

impl From<&str> for Priority {
    fn from(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// A unit of subject-matter coverage discovered from the whole input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub id: SectionId,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,
    #[serde(default)]
    pub priority: Priority,
}

impl OutlineSection {
    pub fn new(id: impl Into<String>, title: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            char_start: None,
            char_end: None,
            priority,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

/// A `[start, end)` range of character offsets into the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub start: usize,
    pub end: usize,
}

impl TextSegment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One unit of extraction work.
///
/// `chunk_id` is the entry's position in the plan and is the identity of
/// the chunk everywhere else (run state, results, coverage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlanEntry {
    pub chunk_id: usize,
    pub title: String,
    pub start: usize,
    pub end: usize,
    pub outline_ids: Vec<SectionId>,
    #[serde(default)]
    pub outline_priorities: BTreeMap<SectionId, Priority>,
    #[serde(default)]
    pub highest_priority: Priority,
}

impl ChunkPlanEntry {
    pub fn segment(&self) -> TextSegment {
        TextSegment {
            start: self.start,
            end: self.end,
        }
    }

    /// Returns true if this entry is responsible for covering `section_id`.
    pub fn covers(&self, section_id: &str) -> bool {
        self.outline_ids.iter().any(|id| id == section_id)
    }
}

/// Outline plus the chunk plan derived from it.
///
/// Immutable once produced for a given input; regenerating the outline
/// invalidates all chunk state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutlineResult {
    pub outline: Vec<OutlineSection>,
    pub chunk_plan: Vec<ChunkPlanEntry>,
    #[serde(default)]
    pub chunk_plan_map: BTreeMap<usize, ChunkPlanEntry>,
}

impl OutlineResult {
    pub fn new(outline: Vec<OutlineSection>, chunk_plan: Vec<ChunkPlanEntry>) -> Self {
        let chunk_plan_map = chunk_plan
            .iter()
            .map(|entry| (entry.chunk_id, entry.clone()))
            .collect();
        Self {
            outline,
            chunk_plan,
            chunk_plan_map,
        }
    }

    /// Look up a plan entry by chunk id.
    pub fn entry(&self, chunk_id: usize) -> Option<&ChunkPlanEntry> {
        self.chunk_plan_map
            .get(&chunk_id)
            .or_else(|| self.chunk_plan.iter().find(|e| e.chunk_id == chunk_id))
    }

    /// Outline sections a plan entry is asked to focus on, in outline order.
    pub fn focus_sections(&self, entry: &ChunkPlanEntry) -> Vec<OutlineSection> {
        self.outline
            .iter()
            .filter(|section| entry.covers(&section.id))
            .cloned()
            .collect()
    }

    /// Number of plan entries assigned to `section_id`.
    pub fn expected_chunks(&self, section_id: &str) -> usize {
        self.chunk_plan
            .iter()
            .filter(|entry| entry.covers(section_id))
            .count()
    }
}
