//! Coverage and mastery metrics derived from chunk results.
//!
//! Everything here is a pure function of the outline, the plan and the
//! completed chunk results. The pipeline recomputes these views once per
//! state mutation instead of patching them incrementally.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::generation::ExtractedChunkData;
use crate::planner::{OutlineResult, OutlineSection, SectionId};

/// Recall questions needed for a full recall score.
pub const RECALL_TARGET: f64 = 5.0;
/// Weight of completion in the mastery score; recall gets the rest.
pub const COMPLETION_WEIGHT: f64 = 0.6;
/// Score at which a section counts as mastered.
pub const MASTERED_THRESHOLD: f64 = 0.85;

/// Which completed chunks cover one outline section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub covered: bool,
    pub chunk_ids: Vec<usize>,
}

pub type CoverageReport = BTreeMap<SectionId, CoverageEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionMasteryStatus {
    #[default]
    Unstarted,
    Learning,
    Mastered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionMastery {
    pub section_id: SectionId,
    pub title: String,
    /// Covered chunks over expected chunks, capped at 1.
    pub completion: f64,
    pub mastery_score: f64,
    pub active_recall_count: usize,
    pub covered_chunks: usize,
    pub expected_chunks: usize,
    pub status: SectionMasteryStatus,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MasteryStatus {
    /// Mean mastery score over all sections.
    pub score: f64,
    pub completed_sections: usize,
    pub total_sections: usize,
    pub section_progress: BTreeMap<SectionId, SectionMastery>,
}

/// Map every outline section to the completed chunks that claim it.
pub fn compute_coverage(
    outline: &[OutlineSection],
    chunk_results: &[ExtractedChunkData],
) -> CoverageReport {
    outline
        .iter()
        .map(|section| {
            let chunk_ids: BTreeSet<usize> = chunk_results
                .iter()
                .filter(|chunk| chunk.covers(&section.id))
                .map(|chunk| chunk.chunk_id)
                .collect();
            let entry = CoverageEntry {
                covered: !chunk_ids.is_empty(),
                chunk_ids: chunk_ids.into_iter().collect(),
            };
            (section.id.clone(), entry)
        })
        .collect()
}

/// Per-section and overall mastery.
///
/// `outline_result` supplies the expected chunk count per section; without
/// a plan (or when the plan assigns the section nowhere) the covered count,
/// at least one, is used instead.
pub fn compute_mastery(
    outline: &[OutlineSection],
    coverage: &CoverageReport,
    chunk_results: &[ExtractedChunkData],
    outline_result: Option<&OutlineResult>,
) -> MasteryStatus {
    let section_progress: BTreeMap<SectionId, SectionMastery> = outline
        .iter()
        .map(|section| {
            let mastery = section_mastery(section, coverage, chunk_results, outline_result);
            (section.id.clone(), mastery)
        })
        .collect();

    let denominator = outline.len().max(1) as f64;
    let score = section_progress
        .values()
        .map(|s| s.mastery_score)
        .sum::<f64>()
        / denominator;
    let completed_sections = section_progress
        .values()
        .filter(|s| s.status == SectionMasteryStatus::Mastered)
        .count();

    MasteryStatus {
        score,
        completed_sections,
        total_sections: outline.len(),
        section_progress,
    }
}

fn section_mastery(
    section: &OutlineSection,
    coverage: &CoverageReport,
    chunk_results: &[ExtractedChunkData],
    outline_result: Option<&OutlineResult>,
) -> SectionMastery {
    let covered_chunks = coverage
        .get(&section.id)
        .map(|c| c.chunk_ids.len())
        .unwrap_or(0);

    let planned = outline_result
        .map(|r| r.expected_chunks(&section.id))
        .unwrap_or(0);
    let expected_chunks = if planned > 0 {
        planned
    } else {
        covered_chunks.max(1)
    };

    let completion = (covered_chunks as f64 / expected_chunks as f64).min(1.0);
    let active_recall_count: usize = chunk_results
        .iter()
        .filter(|chunk| chunk.covers(&section.id))
        .map(ExtractedChunkData::recall_count)
        .sum();
    let recall_score = (active_recall_count as f64 / RECALL_TARGET).min(1.0);
    let mastery_score =
        (completion * COMPLETION_WEIGHT + recall_score * (1.0 - COMPLETION_WEIGHT)).min(1.0);

    SectionMastery {
        section_id: section.id.clone(),
        title: section.title.clone(),
        completion,
        mastery_score,
        active_recall_count,
        covered_chunks,
        expected_chunks,
        status: section_status(mastery_score, completion),
    }
}

fn section_status(score: f64, completion: f64) -> SectionMasteryStatus {
    if score >= MASTERED_THRESHOLD {
        SectionMasteryStatus::Mastered
    } else if completion > 0.0 || score > 0.0 {
        SectionMasteryStatus::Learning
    } else {
        SectionMasteryStatus::Unstarted
    }
}
