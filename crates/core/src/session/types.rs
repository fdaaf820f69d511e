//! Persisted session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::InputDigest;
use crate::generation::{GlossaryEntry, StudySettings};
use crate::pipeline::{PipelinePhase, PipelineState, StudyGoal};
use crate::progress::MasteryStatus;

/// Final output of a completed run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StudyDocument {
    pub markdown: String,
    #[serde(default)]
    pub glossary_entries: Vec<GlossaryEntry>,
}

/// One study session: the input, the goal, the settings and the full
/// pipeline state. Always written back whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub input_text: String,
    pub settings: StudySettings,
    /// Digest of `input_text` as it currently is.
    pub input_digest: InputDigest,
    pub pipeline_state: PipelineState,
    pub mastery_status: Option<MasteryStatus>,
    pub last_phase: PipelinePhase,
    pub last_error_message: Option<String>,
    pub document: Option<StudyDocument>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new idle session with a fresh id.
    pub fn new(
        title: impl Into<String>,
        tags: Vec<String>,
        input_text: impl Into<String>,
        settings: StudySettings,
    ) -> Self {
        let input_text = input_text.into();
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            tags,
            input_digest: InputDigest::compute(&input_text),
            input_text,
            settings,
            pipeline_state: PipelineState::new(),
            mastery_status: None,
            last_phase: PipelinePhase::Idle,
            last_error_message: None,
            document: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn goal(&self) -> StudyGoal {
        StudyGoal::new(self.title.clone(), self.tags.clone())
    }

    /// Replace the input text and refresh its digest.
    ///
    /// The pipeline's own digest is left alone so continuation can detect
    /// the edit.
    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input_text = text.into();
        self.input_digest = InputDigest::compute(&self.input_text);
    }

    /// Digest identifying the run this session holds: the pipeline's digest
    /// once an outline exists, the input digest before that.
    pub fn run_digest(&self) -> &InputDigest {
        self.pipeline_state
            .raw_input_digest
            .as_ref()
            .unwrap_or(&self.input_digest)
    }

    /// Copy the summary fields from the pipeline state and bump `updated_at`.
    pub fn sync_from_state(&mut self) {
        self.mastery_status = self.pipeline_state.mastery_status.clone();
        self.last_phase = self.pipeline_state.phase;
        self.last_error_message = self.pipeline_state.current_error.clone();
        self.updated_at = Utc::now();
    }
}

/// List view of a session, without the input text and chunk results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub input_length: usize,
    pub phase: PipelinePhase,
    pub total_chunks: usize,
    pub processed_chunks: usize,
    pub mastery_score: Option<f64>,
    pub last_error_message: Option<String>,
    pub is_goal_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            tags: record.tags.clone(),
            input_length: record.input_digest.length,
            phase: record.last_phase,
            total_chunks: record.pipeline_state.total_chunks,
            processed_chunks: record.pipeline_state.processed_chunks,
            mastery_score: record.mastery_status.as_ref().map(|m| m.score),
            last_error_message: record.last_error_message.clone(),
            is_goal_stale: record.pipeline_state.is_goal_stale,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
