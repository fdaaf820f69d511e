//! Assigning outline sections to text segments.

use std::collections::BTreeMap;

use super::types::{ChunkPlanEntry, OutlineSection, Priority, SectionId, TextSegment};

/// Build a chunk plan from text segments and the outline.
///
/// Section ids are dealt out in outline order, `ceil(sections / segments)`
/// per chunk. A chunk that comes after every id has been dealt out is
/// responsible for the whole outline, so trailing segments still carry
/// focus sections. The result is deterministic for a given input pair.
pub fn build_plan(segments: &[TextSegment], outline: &[OutlineSection]) -> Vec<ChunkPlanEntry> {
    if segments.is_empty() {
        return Vec::new();
    }

    let all_ids: Vec<SectionId> = outline.iter().map(|s| s.id.clone()).collect();
    let priorities: BTreeMap<&str, Priority> = outline
        .iter()
        .map(|s| (s.id.as_str(), s.priority))
        .collect();

    let per_chunk = if all_ids.is_empty() {
        0
    } else {
        all_ids.len().div_ceil(segments.len())
    };

    let mut cursor = 0;
    segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let remaining = all_ids.len() - cursor;
            let take = if per_chunk > 0 {
                per_chunk.min(remaining)
            } else {
                all_ids.len()
            };

            let outline_ids: Vec<SectionId> = if take > 0 {
                all_ids[cursor..cursor + take].to_vec()
            } else {
                all_ids.clone()
            };
            cursor += take;

            let outline_priorities: BTreeMap<SectionId, Priority> = outline_ids
                .iter()
                .map(|id| {
                    let priority = priorities.get(id.as_str()).copied().unwrap_or_default();
                    (id.clone(), priority)
                })
                .collect();

            ChunkPlanEntry {
                chunk_id: idx,
                title: format!("Chunk {}", idx + 1),
                start: segment.start,
                end: segment.end,
                highest_priority: highest_priority(outline_priorities.values().copied()),
                outline_ids,
                outline_priorities,
            }
        })
        .collect()
}

/// Highest-ranked priority in `priorities`, `Medium` when empty.
pub fn highest_priority(priorities: impl IntoIterator<Item = Priority>) -> Priority {
    priorities
        .into_iter()
        .max_by_key(Priority::rank)
        .unwrap_or_default()
}
