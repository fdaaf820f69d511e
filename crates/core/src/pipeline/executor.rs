//! Batched, throttled chunk extraction.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::types::{PipelinePhase, PipelineState};
use crate::generation::{
    ChunkExtractionRequest, ExtractedChunkPartial, GenerationError, GenerationService,
    StudySettings,
};
use crate::metrics;
use crate::planner::{ChunkPlanEntry, OutlineResult, SourceText};

/// Receives the whole pipeline state every time it must be made durable.
pub trait StateSink: Send + Sync {
    fn persist(&self, state: &PipelineState) -> Result<(), PipelineError>;
}

/// Summary of one executor invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub batches: usize,
    pub dispatched: usize,
    pub completed: usize,
    /// Failed chunk that finished last in the stopping batch, and its message.
    /// Set iff execution stopped early or the single chunk failed.
    pub failure: Option<(usize, String)>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs plan entries against the generation service.
///
/// Entries are dispatched in batches of `concurrency`; every call in a batch
/// runs to completion, and the first batch containing a failure is the last
/// one started.
pub struct ChunkExecutor {
    service: Arc<dyn GenerationService>,
    concurrency: usize,
    batch_delay: Duration,
}

impl ChunkExecutor {
    pub fn new(
        service: Arc<dyn GenerationService>,
        concurrency: usize,
        batch_delay: Duration,
    ) -> Self {
        Self {
            service,
            concurrency: concurrency.max(1),
            batch_delay,
        }
    }

    /// Run every pending entry of the plan held by `state`.
    pub async fn run_pending(
        &self,
        state: &mut PipelineState,
        source: &SourceText<'_>,
        settings: &StudySettings,
        sink: &dyn StateSink,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let outline_result = state
            .outline_result
            .clone()
            .ok_or_else(|| PipelineError::MissingPrerequisite("outline result".to_string()))?;
        let pending = state.pending_entries();
        let mut outcome = ExecutionOutcome::default();

        info!(
            pending = pending.len(),
            total = outline_result.chunk_plan.len(),
            concurrency = self.concurrency,
            "Running pending chunks"
        );

        for (index, batch) in pending.chunks(self.concurrency).enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            for entry in batch {
                state
                    .chunk_states
                    .entry(entry.chunk_id)
                    .or_insert_with(|| super::ChunkRunState::pending(entry.chunk_id))
                    .begin_attempt();
            }
            state.phase = PipelinePhase::Chunking;
            state.refresh_derived();
            sink.persist(state)?;

            debug!(
                batch = index,
                chunks = ?batch.iter().map(|e| e.chunk_id).collect::<Vec<_>>(),
                "Dispatching batch"
            );

            let plan = &outline_result;
            let mut calls: FuturesUnordered<_> = batch
                .iter()
                .map(|entry| async move {
                    let result = self.extract(entry, plan, source, settings).await;
                    (entry, result)
                })
                .collect();
            let mut finished = Vec::with_capacity(batch.len());
            while let Some(done) = calls.next().await {
                finished.push(done);
            }

            outcome.batches += 1;
            outcome.dispatched += batch.len();

            // Completion order, so the reported failure is the last to finish.
            for (entry, result) in finished {
                let run = state.chunk_states.get_mut(&entry.chunk_id).ok_or_else(|| {
                    PipelineError::MissingPrerequisite(format!("state of chunk {}", entry.chunk_id))
                })?;
                match result {
                    Ok(partial) => {
                        run.complete(partial.into_result(entry))?;
                        outcome.completed += 1;
                    }
                    Err(e) => {
                        let message = failure_message(&e);
                        run.fail(message.clone())?;
                        outcome.failure = Some((entry.chunk_id, message));
                    }
                }
            }

            state.refresh_derived();
            match &outcome.failure {
                Some((chunk_id, message)) => {
                    warn!(chunk_id, batch = index, "Batch failed, stopping: {}", message);
                    state.set_error(message.clone());
                    metrics::BATCHES.with_label_values(&["failed"]).inc();
                }
                None => {
                    state.phase = PipelinePhase::Chunking;
                    metrics::BATCHES.with_label_values(&["completed"]).inc();
                }
            }
            sink.persist(state)?;

            if outcome.failure.is_some() {
                break;
            }
        }

        info!(
            batches = outcome.batches,
            completed = outcome.completed,
            processed = state.processed_chunks,
            total = state.total_chunks,
            "Chunk run finished"
        );

        Ok(outcome)
    }

    /// Run exactly one plan entry, outside the batch loop.
    pub async fn run_single(
        &self,
        state: &mut PipelineState,
        entry: &ChunkPlanEntry,
        source: &SourceText<'_>,
        settings: &StudySettings,
        sink: &dyn StateSink,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let outline_result = state
            .outline_result
            .clone()
            .ok_or_else(|| PipelineError::MissingPrerequisite("outline result".to_string()))?;

        state
            .chunk_states
            .entry(entry.chunk_id)
            .or_insert_with(|| super::ChunkRunState::pending(entry.chunk_id))
            .begin_attempt();
        state.phase = PipelinePhase::Chunking;
        state.refresh_derived();
        sink.persist(state)?;

        let result = self.extract(entry, &outline_result, source, settings).await;

        let mut outcome = ExecutionOutcome {
            batches: 0,
            dispatched: 1,
            ..Default::default()
        };
        let run = state.chunk_states.get_mut(&entry.chunk_id).ok_or_else(|| {
            PipelineError::MissingPrerequisite(format!("state of chunk {}", entry.chunk_id))
        })?;
        match result {
            Ok(partial) => {
                run.complete(partial.into_result(entry))?;
                outcome.completed = 1;
                state.phase = PipelinePhase::Chunking;
            }
            Err(e) => {
                let message = failure_message(&e);
                run.fail(message.clone())?;
                state.set_error(message.clone());
                outcome.failure = Some((entry.chunk_id, message));
            }
        }
        state.refresh_derived();
        sink.persist(state)?;

        Ok(outcome)
    }

    async fn extract(
        &self,
        entry: &ChunkPlanEntry,
        outline_result: &OutlineResult,
        source: &SourceText<'_>,
        settings: &StudySettings,
    ) -> Result<ExtractedChunkPartial, GenerationError> {
        let request = ChunkExtractionRequest {
            chunk_text: source.slice(entry.start, entry.end).to_string(),
            chunk_index: entry.chunk_id,
            total_chunks: outline_result.chunk_plan.len(),
            settings: settings.clone(),
            focus_sections: outline_result.focus_sections(entry),
        };

        let started = Instant::now();
        let result = self.service.extract_chunk(&request).await;
        metrics::CHUNK_EXTRACTION_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(_) => {
                debug!(
                    chunk_id = entry.chunk_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Chunk extracted"
                );
                metrics::CHUNK_EXTRACTIONS.with_label_values(&["success"]).inc();
            }
            Err(e) => {
                warn!(chunk_id = entry.chunk_id, error = %e, "Chunk extraction failed");
                metrics::CHUNK_EXTRACTIONS.with_label_values(&["failure"]).inc();
            }
        }
        result
    }
}

fn failure_message(error: &GenerationError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        "Chunk failed".to_string()
    } else {
        message
    }
}
