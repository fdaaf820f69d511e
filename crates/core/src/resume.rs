//! Deciding when a stored session should be offered for resumption.

use std::collections::HashSet;

use crate::digest::InputDigest;
use crate::pipeline::{PipelinePhase, PipelineState};
use crate::session::SessionRecord;

/// A session can be resumed for `current` when it was run on exactly that
/// text, has not completed, and the user has not declined it for that text.
pub fn is_resume_candidate(
    session_digest: Option<&InputDigest>,
    session_phase: PipelinePhase,
    current: &InputDigest,
    declined: &HashSet<InputDigest>,
) -> bool {
    let Some(session_digest) = session_digest else {
        return false;
    };
    session_phase != PipelinePhase::Complete
        && session_digest.matches(current)
        && !declined.contains(current)
}

/// True when synthesis can be re-run from `state` without re-extracting,
/// given the text currently being edited.
pub fn can_fast_resynthesize(state: &PipelineState, current_text: &str) -> bool {
    !state.outline.is_empty()
        && state.has_chunk_results()
        && state
            .raw_input_digest
            .as_ref()
            .is_some_and(|d| d.matches_text(current_text))
}

/// Per-editing-session resume bookkeeping.
///
/// Declines are remembered per digest until the text changes.
#[derive(Debug, Default)]
pub struct ResumeController {
    declined: HashSet<InputDigest>,
    last_seen: Option<InputDigest>,
}

impl ResumeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the text currently being edited. Any change clears declines.
    pub fn observe_edit(&mut self, text: &str) -> InputDigest {
        let digest = InputDigest::compute(text);
        if self.last_seen.as_ref() != Some(&digest) {
            if !self.declined.is_empty() {
                tracing::debug!(
                    digest = %digest.short_key(),
                    "Input changed, clearing resume declines"
                );
            }
            self.declined.clear();
            self.last_seen = Some(digest.clone());
        }
        digest
    }

    /// Remember that the user does not want to resume runs on `digest`.
    pub fn decline(&mut self, digest: InputDigest) {
        self.declined.insert(digest);
    }

    pub fn is_declined(&self, digest: &InputDigest) -> bool {
        self.declined.contains(digest)
    }

    /// The most recently updated resumable session for `text`, if any.
    ///
    /// The session's stored input must also match `text`: a session whose
    /// input was edited after its run cannot continue that run.
    pub fn find_candidate<'a>(
        &mut self,
        text: &str,
        sessions: &'a [SessionRecord],
    ) -> Option<&'a SessionRecord> {
        let current = self.observe_edit(text);
        sessions
            .iter()
            .filter(|record| {
                record.input_digest.matches(&current)
                    && is_resume_candidate(
                        Some(record.run_digest()),
                        record.pipeline_state.phase,
                        &current,
                        &self.declined,
                    )
            })
            .max_by_key(|record| record.updated_at)
    }
}
