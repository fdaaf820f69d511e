//! Pipeline state shared by the executor and the coordinator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::chunk_state::{ChunkRunState, ChunkStatus};
use crate::digest::InputDigest;
use crate::generation::ExtractedChunkData;
use crate::planner::{ChunkPlanEntry, OutlineResult, OutlineSection};
use crate::progress::{compute_coverage, compute_mastery, CoverageReport, MasteryStatus};

/// Top-level phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    #[default]
    Idle,
    Outlining,
    Chunking,
    Stitching,
    Complete,
    Error,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Outlining => "outlining",
            PipelinePhase::Chunking => "chunking",
            PipelinePhase::Stitching => "stitching",
            PipelinePhase::Complete => "complete",
            PipelinePhase::Error => "error",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study goal a run was framed with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StudyGoal {
    pub title: String,
    pub tags: Vec<String>,
}

impl StudyGoal {
    pub fn new(title: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            title: title.into(),
            tags,
        }
    }

    /// Titles compare exactly, tags compare as normalised sets.
    pub fn same_as(&self, title: &str, tags: &[String]) -> bool {
        self.title == title && normalize_tags(&self.tags) == normalize_tags(tags)
    }
}

/// Trimmed, non-empty, lower-cased and sorted tags.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    normalized.sort();
    normalized
}

/// Whole-run state, persisted on the session record after every phase
/// transition and every executor batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineState {
    pub phase: PipelinePhase,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub outline: Vec<OutlineSection>,
    pub outline_result: Option<OutlineResult>,
    /// Digest of the text the outline was generated from; set once per outline.
    pub raw_input_digest: Option<InputDigest>,
    pub chunk_states: BTreeMap<usize, ChunkRunState>,
    /// Derived from `chunk_states`; never written directly.
    pub chunk_results: Vec<ExtractedChunkData>,
    pub coverage_report: CoverageReport,
    pub mastery_status: Option<MasteryStatus>,
    pub current_error: Option<String>,
    pub final_document: Option<String>,
    pub last_goal_title: String,
    pub last_goal_tags: Vec<String>,
    pub is_goal_stale: bool,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over from a freshly generated outline and plan.
    ///
    /// Every previous chunk state and derived view is dropped.
    pub fn reset_for_outline(&mut self, digest: InputDigest, outline_result: OutlineResult) {
        self.chunk_states = outline_result
            .chunk_plan
            .iter()
            .map(|entry| (entry.chunk_id, ChunkRunState::pending(entry.chunk_id)))
            .collect();
        self.outline = outline_result.outline.clone();
        self.outline_result = Some(outline_result);
        self.raw_input_digest = Some(digest);
        self.current_error = None;
        self.final_document = None;
        self.refresh_derived();
    }

    /// Recompute every view derived from `chunk_states`.
    pub fn refresh_derived(&mut self) {
        self.chunk_results = derive_chunk_results(&self.chunk_states);
        self.processed_chunks = self
            .chunk_states
            .values()
            .filter(|s| s.status == ChunkStatus::Complete)
            .count();
        self.total_chunks = self
            .outline_result
            .as_ref()
            .map(|r| r.chunk_plan.len())
            .unwrap_or(0);
        self.coverage_report = compute_coverage(&self.outline, &self.chunk_results);
        self.mastery_status = Some(compute_mastery(
            &self.outline,
            &self.coverage_report,
            &self.chunk_results,
            self.outline_result.as_ref(),
        ));
    }

    /// Plan entries without a completed state, in plan order.
    pub fn pending_entries(&self) -> Vec<ChunkPlanEntry> {
        let Some(result) = &self.outline_result else {
            return Vec::new();
        };
        result
            .chunk_plan
            .iter()
            .filter(|entry| {
                self.chunk_states
                    .get(&entry.chunk_id)
                    .map(|s| !s.is_complete() || s.result.is_none())
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// True when a plan exists and every entry in it has completed.
    pub fn are_all_complete(&self) -> bool {
        self.outline_result
            .as_ref()
            .is_some_and(|r| !r.chunk_plan.is_empty())
            && self.pending_entries().is_empty()
    }

    pub fn has_chunk_results(&self) -> bool {
        !self.chunk_results.is_empty()
    }

    pub fn failed_chunk_ids(&self) -> Vec<usize> {
        self.chunk_states
            .values()
            .filter(|s| s.status == ChunkStatus::Error)
            .map(|s| s.chunk_id)
            .collect()
    }

    /// Record `goal` as the framing of the current results.
    pub fn stamp_goal(&mut self, goal: &StudyGoal) {
        self.last_goal_title = goal.title.clone();
        self.last_goal_tags = goal.tags.clone();
        self.is_goal_stale = false;
    }

    /// Re-evaluate staleness against the current goal.
    ///
    /// Without chunk results there is nothing to be stale, so the flag is
    /// left as it is.
    pub fn update_goal_staleness(&mut self, goal: &StudyGoal) {
        if !self.has_chunk_results() {
            return;
        }
        let stamped = StudyGoal::new(self.last_goal_title.clone(), self.last_goal_tags.clone());
        self.is_goal_stale = !stamped.same_as(&goal.title, &goal.tags);
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.phase = PipelinePhase::Error;
        self.current_error = Some(message.into());
    }
}

/// Completed chunk results in ascending chunk id order.
pub fn derive_chunk_results(states: &BTreeMap<usize, ChunkRunState>) -> Vec<ExtractedChunkData> {
    states
        .values()
        .filter(|s| s.is_complete())
        .filter_map(|s| s.result.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ExtractedChunkPartial;
    use crate::planner::{build_plan, Priority, TextSegment};

    fn outline_result(chunks: usize) -> OutlineResult {
        let outline = vec![
            OutlineSection::new("a", "A", Priority::High),
            OutlineSection::new("b", "B", Priority::Low),
        ];
        let segments: Vec<TextSegment> = (0..chunks)
            .map(|i| TextSegment {
                start: i * 10,
                end: i * 10 + 10,
            })
            .collect();
        let plan = build_plan(&segments, &outline);
        OutlineResult::new(outline, plan)
    }

    fn complete(state: &mut PipelineState, chunk_id: usize) {
        let entry = state
            .outline_result
            .as_ref()
            .unwrap()
            .entry(chunk_id)
            .unwrap()
            .clone();
        let run = state.chunk_states.get_mut(&chunk_id).unwrap();
        run.begin_attempt();
        run.complete(ExtractedChunkPartial::default().into_result(&entry))
            .unwrap();
    }

    #[test]
    fn test_new_state_is_idle() {
        let state = PipelineState::new();
        assert_eq!(state.phase, PipelinePhase::Idle);
        assert!(!state.are_all_complete());
        assert!(state.pending_entries().is_empty());
    }

    #[test]
    fn test_reset_for_outline_initialises_pending_states() {
        let mut state = PipelineState::new();
        state.current_error = Some("old".to_string());
        state.reset_for_outline(InputDigest::compute("text"), outline_result(2));

        assert_eq!(state.total_chunks, 2);
        assert_eq!(state.processed_chunks, 0);
        assert_eq!(state.chunk_states.len(), 2);
        assert!(state.current_error.is_none());
        assert_eq!(state.pending_entries().len(), 2);
        assert_eq!(state.coverage_report.len(), 2);
    }

    #[test]
    fn test_derived_results_sorted_by_chunk_id() {
        let mut state = PipelineState::new();
        state.reset_for_outline(InputDigest::compute("text"), outline_result(3));
        complete(&mut state, 2);
        complete(&mut state, 0);
        state.refresh_derived();

        let ids: Vec<usize> = state.chunk_results.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(state.processed_chunks, 2);
        assert_eq!(state.pending_entries().len(), 1);
        assert!(!state.are_all_complete());

        complete(&mut state, 1);
        state.refresh_derived();
        assert!(state.are_all_complete());
    }

    #[test]
    fn test_goal_staleness_requires_results() {
        let mut state = PipelineState::new();
        state.reset_for_outline(InputDigest::compute("text"), outline_result(1));
        state.stamp_goal(&StudyGoal::new("Shock", vec!["ICU".to_string()]));

        let other = StudyGoal::new("Sepsis", vec![]);
        state.update_goal_staleness(&other);
        assert!(!state.is_goal_stale);

        complete(&mut state, 0);
        state.refresh_derived();
        state.update_goal_staleness(&other);
        assert!(state.is_goal_stale);

        let same = StudyGoal::new("Shock", vec![" icu ".to_string(), "".to_string()]);
        state.update_goal_staleness(&same);
        assert!(!state.is_goal_stale);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " Cardio".to_string(),
            "".to_string(),
            "ICU".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["cardio", "icu"]);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut state = PipelineState::new();
        state.reset_for_outline(InputDigest::compute("text"), outline_result(2));
        complete(&mut state, 1);
        state.refresh_derived();

        let json = serde_json::to_string(&state).unwrap();
        let parsed: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
