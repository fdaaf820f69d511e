//! Pipeline coordinator: drives outline, extraction and synthesis for one
//! session at a time and persists every transition.
//!
//! Generation failures never come back as `Err`. They are recorded on the
//! state (`phase = error`, `current_error`, chunk `last_error`), persisted
//! and returned like any other outcome. `Err` means the caller asked for
//! something the session cannot do, or the store failed.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::executor::{ChunkExecutor, StateSink};
use super::types::{PipelinePhase, PipelineState, StudyGoal};
use crate::digest::InputDigest;
use crate::events::{EventHandle, PipelineEvent, PipelineEventKind};
use crate::generation::{
    GenerationService, OutlineRequest, RetryingGenerationService, StudySettings, SynthesisRequest,
};
use crate::metrics;
use crate::planner::{build_plan, split_source, ChunkPlanEntry, OutlineResult, SourceText};
use crate::session::{SessionFilter, SessionRecord, SessionStore, StudyDocument};

/// A run operation on an existing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOperation {
    Generate,
    Continue,
    RetryFailed,
    RunSingle(usize),
    Resynthesize,
    Resume,
}

impl PipelineOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOperation::Generate => "generate",
            PipelineOperation::Continue => "continue",
            PipelineOperation::RetryFailed => "retry_failed",
            PipelineOperation::RunSingle(_) => "run_single",
            PipelineOperation::Resynthesize => "resynthesize",
            PipelineOperation::Resume => "resume",
        }
    }
}

/// Input for a new session.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub title: String,
    pub tags: Vec<String>,
    pub input_text: String,
    pub settings: StudySettings,
}

/// Writes the full session record every time the pipeline state changes.
struct SessionSink<'a> {
    store: &'a dyn SessionStore,
    record: Mutex<SessionRecord>,
}

impl<'a> SessionSink<'a> {
    fn new(store: &'a dyn SessionStore, record: SessionRecord) -> Self {
        Self {
            store,
            record: Mutex::new(record),
        }
    }

    fn set_document(&self, document: Option<StudyDocument>) {
        self.record.lock().unwrap().document = document;
    }
}

impl StateSink for SessionSink<'_> {
    fn persist(&self, state: &PipelineState) -> Result<(), PipelineError> {
        let mut record = self.record.lock().unwrap();
        record.pipeline_state = state.clone();
        record.sync_from_state();
        self.store.save(&record).map_err(|e| {
            error!(session_id = %record.id, error = %e, "Failed to persist session");
            PipelineError::from(e)
        })
    }
}

/// Everything one run needs, detached from the stored record.
struct Run<'a> {
    session_id: String,
    input: String,
    settings: StudySettings,
    goal: StudyGoal,
    state: PipelineState,
    sink: SessionSink<'a>,
}

impl Run<'_> {
    fn persist(&self) -> Result<(), PipelineError> {
        self.sink.persist(&self.state)
    }
}

/// Orchestrates runs against a session store and a generation service.
pub struct PipelineCoordinator {
    store: Arc<dyn SessionStore>,
    service: Arc<dyn GenerationService>,
    executor: ChunkExecutor,
    config: PipelineConfig,
    events: Option<EventHandle>,
}

impl PipelineCoordinator {
    /// Create a coordinator. `service` is wrapped in the configured retry
    /// policy here, once.
    pub fn new(
        store: Arc<dyn SessionStore>,
        service: Arc<dyn GenerationService>,
        config: PipelineConfig,
    ) -> Self {
        let service: Arc<dyn GenerationService> =
            Arc::new(RetryingGenerationService::new(service, config.retry.clone()));
        let executor = ChunkExecutor::new(
            Arc::clone(&service),
            config.concurrency,
            Duration::from_millis(config.batch_delay_ms),
        );
        Self {
            store,
            service,
            executor,
            config,
            events: None,
        }
    }

    /// Sets the handle operational events are emitted on.
    pub fn with_events(mut self, events: EventHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ========================================================================
    // Session management
    // ========================================================================

    pub fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionRecord, PipelineError> {
        let record = SessionRecord::new(
            request.title,
            request.tags,
            request.input_text,
            request.settings,
        );
        self.store.save(&record)?;
        info!(
            session_id = %record.id,
            digest = %record.input_digest.short_key(),
            "Session created"
        );
        Ok(record)
    }

    pub fn get_session(&self, session_id: &str) -> Result<SessionRecord, PipelineError> {
        self.store
            .load(session_id)?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))
    }

    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionRecord>, PipelineError> {
        Ok(self.store.list(filter)?)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), PipelineError> {
        if self.store.delete(session_id)? {
            info!(session_id, "Session deleted");
            Ok(())
        } else {
            Err(PipelineError::SessionNotFound(session_id.to_string()))
        }
    }

    /// Replace the input text. The pipeline's digest is kept, so a later
    /// continuation sees the mismatch.
    pub fn edit_input(
        &self,
        session_id: &str,
        input_text: impl Into<String>,
    ) -> Result<SessionRecord, PipelineError> {
        let mut record = self.get_session(session_id)?;
        record.set_input_text(input_text);
        record.sync_from_state();
        self.store.save(&record)?;
        debug!(
            session_id,
            digest = %record.input_digest.short_key(),
            "Session input edited"
        );
        Ok(record)
    }

    /// Store a new study goal and re-evaluate goal staleness.
    pub fn update_goal(
        &self,
        session_id: &str,
        title: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<SessionRecord, PipelineError> {
        let mut record = self.get_session(session_id)?;
        record.title = title.into();
        record.tags = tags;
        let goal = record.goal();
        record.pipeline_state.update_goal_staleness(&goal);
        record.sync_from_state();
        self.store.save(&record)?;
        debug!(
            session_id,
            stale = record.pipeline_state.is_goal_stale,
            "Session goal updated"
        );
        Ok(record)
    }

    /// True when the session's plan exists and every chunk has completed.
    pub fn are_all_complete(&self, session_id: &str) -> Result<bool, PipelineError> {
        Ok(self.get_session(session_id)?.pipeline_state.are_all_complete())
    }

    // ========================================================================
    // Run operations
    // ========================================================================

    /// Check that `operation` can start on the session right now, without
    /// calling the generation service.
    pub fn preflight(
        &self,
        session_id: &str,
        operation: PipelineOperation,
    ) -> Result<SessionRecord, PipelineError> {
        let record = self.get_session(session_id)?;
        match operation {
            PipelineOperation::Generate => {}
            PipelineOperation::Continue | PipelineOperation::RetryFailed => {
                check_continuation(&record)?;
            }
            PipelineOperation::RunSingle(chunk_id) => {
                check_continuation(&record)?;
                plan_entry(&record, chunk_id)?;
            }
            PipelineOperation::Resynthesize => check_resynthesis(&record)?,
            PipelineOperation::Resume => match resume_route(&record.pipeline_state) {
                ResumeRoute::Done | ResumeRoute::Generate => {}
                ResumeRoute::Continue => check_continuation(&record)?,
                ResumeRoute::Synthesize => check_resynthesis(&record)?,
            },
        }
        Ok(record)
    }

    /// Run `operation` to its end.
    pub async fn run(
        &self,
        session_id: &str,
        operation: PipelineOperation,
    ) -> Result<PipelineState, PipelineError> {
        match operation {
            PipelineOperation::Generate => self.generate(session_id).await,
            PipelineOperation::Continue => self.continue_all(session_id).await,
            PipelineOperation::RetryFailed => self.retry_failed(session_id).await,
            PipelineOperation::RunSingle(chunk_id) => self.run_single(session_id, chunk_id).await,
            PipelineOperation::Resynthesize => self.fast_resynthesize(session_id).await,
            PipelineOperation::Resume => self.resume(session_id).await,
        }
    }

    /// Full run: outline, plan, every chunk, synthesis.
    ///
    /// Discards any previous outline and chunk state.
    pub async fn generate(&self, session_id: &str) -> Result<PipelineState, PipelineError> {
        let record = self.get_session(session_id)?;
        let mut run = self.open(record, PipelineState::new());
        let operation = PipelineOperation::Generate;
        info!(session_id, chars = run.input.chars().count(), "Generating outline");

        run.state.phase = PipelinePhase::Outlining;
        run.state.stamp_goal(&run.goal);
        run.sink.set_document(None);
        run.persist()?;

        let request = OutlineRequest {
            raw_text: run.input.clone(),
            title: run.goal.title.clone(),
            tags: run.goal.tags.clone(),
        };
        let outline = match self.service.generate_outline(&request).await {
            Ok(outline) => outline,
            Err(e) => {
                warn!(session_id, error = %e, "Outline generation failed");
                return self.fail(run, operation, e.to_string()).await;
            }
        };

        let source = SourceText::new(&run.input);
        let segments = split_source(
            &source,
            self.config.chunk_size_chars,
            self.config.overlap_chars,
        );
        let plan = build_plan(&segments, &outline);
        info!(
            session_id,
            sections = outline.len(),
            chunks = plan.len(),
            "Outline ready, chunk plan built"
        );

        let digest = InputDigest::compute(&run.input);
        run.state.reset_for_outline(digest, OutlineResult::new(outline, plan));
        run.state.phase = PipelinePhase::Chunking;
        run.persist()?;
        self.emit(&run, PipelineEventKind::Start, None).await;

        self.extract_then_synthesize(run, operation).await
    }

    /// Run every chunk that has not completed, then synthesize.
    pub async fn continue_all(&self, session_id: &str) -> Result<PipelineState, PipelineError> {
        self.continue_with(session_id, PipelineOperation::Continue).await
    }

    /// Same as [`continue_all`](Self::continue_all): failed chunks are pending.
    pub async fn retry_failed(&self, session_id: &str) -> Result<PipelineState, PipelineError> {
        self.continue_with(session_id, PipelineOperation::RetryFailed).await
    }

    async fn continue_with(
        &self,
        session_id: &str,
        operation: PipelineOperation,
    ) -> Result<PipelineState, PipelineError> {
        let record = self.get_session(session_id)?;
        check_continuation(&record)?;
        let state = record.pipeline_state.clone();
        let mut run = self.open(record, state);
        info!(
            session_id,
            operation = operation.as_str(),
            pending = run.state.pending_entries().len(),
            failed = run.state.failed_chunk_ids().len(),
            "Continuing pipeline"
        );

        run.state.current_error = None;
        self.emit(&run, PipelineEventKind::Resume, None).await;
        self.extract_then_synthesize(run, operation).await
    }

    /// Re-run one chunk. Does not synthesize.
    pub async fn run_single(
        &self,
        session_id: &str,
        chunk_id: usize,
    ) -> Result<PipelineState, PipelineError> {
        let record = self.get_session(session_id)?;
        check_continuation(&record)?;
        let entry = plan_entry(&record, chunk_id)?;
        let state = record.pipeline_state.clone();
        let mut run = self.open(record, state);
        info!(session_id, chunk_id, "Running single chunk");

        run.state.current_error = None;
        let source = SourceText::new(&run.input);
        let outcome = self
            .executor
            .run_single(&mut run.state, &entry, &source, &run.settings, &run.sink)
            .await?;

        let result = if outcome.is_success() { "completed" } else { "failed" };
        metrics::PIPELINE_RUNS
            .with_label_values(&[PipelineOperation::RunSingle(chunk_id).as_str(), result])
            .inc();
        if let Some((_, message)) = &outcome.failure {
            self.emit(&run, PipelineEventKind::Error, Some(message)).await;
        }
        Ok(run.state)
    }

    /// Synthesize again from the cached chunk results, skipping extraction.
    pub async fn fast_resynthesize(&self, session_id: &str) -> Result<PipelineState, PipelineError> {
        let record = self.get_session(session_id)?;
        check_resynthesis(&record)?;
        let state = record.pipeline_state.clone();
        let mut run = self.open(record, state);
        info!(
            session_id,
            chunk_results = run.state.chunk_results.len(),
            "Fast resynthesize"
        );

        run.state.current_error = None;
        self.synthesize(run, PipelineOperation::Resynthesize).await
    }

    /// Continue a session from wherever its persisted phase left off.
    pub async fn resume(&self, session_id: &str) -> Result<PipelineState, PipelineError> {
        let record = self.get_session(session_id)?;
        let route = resume_route(&record.pipeline_state);
        info!(session_id, phase = %record.pipeline_state.phase, route = ?route, "Resuming session");

        match route {
            ResumeRoute::Done => Ok(record.pipeline_state),
            ResumeRoute::Generate => self.generate(session_id).await,
            ResumeRoute::Continue => self.continue_all(session_id).await,
            ResumeRoute::Synthesize => {
                check_resynthesis(&record)?;
                let state = record.pipeline_state.clone();
                let mut run = self.open(record, state);
                run.state.current_error = None;
                self.emit(&run, PipelineEventKind::Resume, None).await;
                self.synthesize(run, PipelineOperation::Resume).await
            }
        }
    }

    // ========================================================================
    // Phases
    // ========================================================================

    fn open(&self, record: SessionRecord, state: PipelineState) -> Run<'_> {
        Run {
            session_id: record.id.clone(),
            input: record.input_text.clone(),
            settings: record.settings.clone(),
            goal: record.goal(),
            state,
            sink: SessionSink::new(self.store.as_ref(), record),
        }
    }

    async fn extract_then_synthesize(
        &self,
        mut run: Run<'_>,
        operation: PipelineOperation,
    ) -> Result<PipelineState, PipelineError> {
        let source = SourceText::new(&run.input);
        let outcome = self
            .executor
            .run_pending(&mut run.state, &source, &run.settings, &run.sink)
            .await?;

        if let Some((chunk_id, message)) = outcome.failure {
            warn!(
                session_id = %run.session_id,
                chunk_id,
                "Extraction stopped after chunk failure"
            );
            metrics::PIPELINE_RUNS
                .with_label_values(&[operation.as_str(), "failed"])
                .inc();
            self.emit(&run, PipelineEventKind::Error, Some(&message)).await;
            return Ok(run.state);
        }

        // Results cached under an older goal keep the session stale.
        if !run.state.is_goal_stale || outcome.completed == run.state.total_chunks {
            run.state.stamp_goal(&run.goal);
        }
        self.synthesize(run, operation).await
    }

    async fn synthesize(
        &self,
        mut run: Run<'_>,
        operation: PipelineOperation,
    ) -> Result<PipelineState, PipelineError> {
        run.state.phase = PipelinePhase::Stitching;
        run.persist()?;

        let source = SourceText::new(&run.input);
        let request = SynthesisRequest {
            outline: run.state.outline.clone(),
            chunk_results: run.state.chunk_results.clone(),
            settings: run.settings.clone(),
            text_sample: source.prefix(self.config.synthesis_sample_chars).to_string(),
            title: run.goal.title.clone(),
            tags: run.goal.tags.clone(),
        };

        let started = Instant::now();
        let result = self.service.synthesize(&request).await;
        metrics::SYNTHESIS_DURATION.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(output) => {
                run.state.final_document = Some(output.final_document.clone());
                run.state.phase = PipelinePhase::Complete;
                run.state.current_error = None;
                run.sink.set_document(Some(StudyDocument {
                    markdown: output.final_document,
                    glossary_entries: output.glossary_entries,
                }));
                run.persist()?;

                info!(
                    session_id = %run.session_id,
                    chunks = run.state.total_chunks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Pipeline complete"
                );
                metrics::PIPELINE_RUNS
                    .with_label_values(&[operation.as_str(), "completed"])
                    .inc();
                self.emit(&run, PipelineEventKind::Complete, None).await;
                Ok(run.state)
            }
            Err(e) => {
                warn!(session_id = %run.session_id, error = %e, "Synthesis failed");
                self.fail(run, operation, e.to_string()).await
            }
        }
    }

    async fn fail(
        &self,
        mut run: Run<'_>,
        operation: PipelineOperation,
        message: String,
    ) -> Result<PipelineState, PipelineError> {
        run.state.set_error(message.clone());
        run.persist()?;
        metrics::PIPELINE_RUNS
            .with_label_values(&[operation.as_str(), "failed"])
            .inc();
        self.emit(&run, PipelineEventKind::Error, Some(&message)).await;
        Ok(run.state)
    }

    async fn emit(&self, run: &Run<'_>, kind: PipelineEventKind, error: Option<&str>) {
        let Some(events) = &self.events else {
            return;
        };
        let mut event = PipelineEvent::from_state(
            kind,
            run.session_id.clone(),
            &run.state,
            run.goal.tags.len(),
        );
        if let Some(message) = error {
            event = event.with_error(message, self.config.event_message_limit);
        }
        events.emit(event).await;
    }
}

/// Where `resume` picks a session up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeRoute {
    Done,
    Generate,
    Continue,
    Synthesize,
}

fn resume_route(state: &PipelineState) -> ResumeRoute {
    match state.phase {
        PipelinePhase::Complete => ResumeRoute::Done,
        _ if state.outline_result.is_none() => ResumeRoute::Generate,
        PipelinePhase::Idle | PipelinePhase::Outlining => ResumeRoute::Generate,
        PipelinePhase::Stitching => ResumeRoute::Synthesize,
        PipelinePhase::Chunking | PipelinePhase::Error => ResumeRoute::Continue,
    }
}

/// An outline and its digest must exist, and the digest must still match
/// the session's input.
fn check_continuation(record: &SessionRecord) -> Result<(), PipelineError> {
    let state = &record.pipeline_state;
    if state.outline_result.is_none() {
        return Err(PipelineError::MissingPrerequisite(
            "no outline has been generated".to_string(),
        ));
    }
    let digest = state.raw_input_digest.as_ref().ok_or_else(|| {
        PipelineError::MissingPrerequisite("no input digest recorded".to_string())
    })?;
    if !digest.matches_text(&record.input_text) {
        return Err(PipelineError::DigestMismatch);
    }
    Ok(())
}

fn check_resynthesis(record: &SessionRecord) -> Result<(), PipelineError> {
    if record.pipeline_state.outline.is_empty() {
        return Err(PipelineError::MissingPrerequisite(
            "no outline has been generated".to_string(),
        ));
    }
    check_continuation(record)?;
    if !record.pipeline_state.has_chunk_results() {
        return Err(PipelineError::NoChunkResults);
    }
    Ok(())
}

fn plan_entry(record: &SessionRecord, chunk_id: usize) -> Result<ChunkPlanEntry, PipelineError> {
    record
        .pipeline_state
        .outline_result
        .as_ref()
        .and_then(|r| r.entry(chunk_id))
        .cloned()
        .ok_or_else(|| PipelineError::ChunkNotFound {
            session_id: record.id.clone(),
            chunk_id,
        })
}
