//! Mock generation service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::fixtures;
use crate::generation::{
    ChunkExtractionRequest, ExtractedChunkPartial, GenerationError, GenerationService,
    GlossaryEntry, OutlineRequest, RecallQuestion, StudySettings, SynthesisOutput,
    SynthesisRequest,
};
use crate::planner::OutlineSection;

/// A recorded extraction call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExtraction {
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_text: String,
    pub focus_section_ids: Vec<String>,
    pub settings: StudySettings,
}

/// A recorded synthesis call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSynthesis {
    pub title: String,
    pub tags: Vec<String>,
    pub chunk_ids: Vec<usize>,
    pub outline_ids: Vec<String>,
    pub text_sample: String,
}

/// Mock implementation of the [`GenerationService`] trait.
///
/// Provides controllable behavior for testing:
/// - Scripted outline (two sections by default)
/// - Per-chunk, outline and synthesis failures
/// - Artificial extraction delay, shared or per chunk
/// - Call recording
///
/// Failures stay in place until [`clear_failures`](Self::clear_failures).
///
/// # Example
///
/// ```rust,ignore
/// use chunkwise_core::testing::MockGenerationService;
///
/// let service = MockGenerationService::new();
/// service.fail_chunk(1, "quota exceeded").await;
///
/// // ... run the pipeline ...
///
/// let calls = service.extraction_calls().await;
/// assert!(calls.iter().any(|c| c.chunk_index == 1));
/// ```
#[derive(Debug, Clone)]
pub struct MockGenerationService {
    outline: Arc<RwLock<Vec<OutlineSection>>>,
    outline_failure: Arc<RwLock<Option<String>>>,
    chunk_failures: Arc<RwLock<HashMap<usize, String>>>,
    synthesis_failure: Arc<RwLock<Option<String>>>,
    extraction_delay: Arc<RwLock<Duration>>,
    chunk_delays: Arc<RwLock<HashMap<usize, Duration>>>,
    outline_requests: Arc<RwLock<Vec<OutlineRequest>>>,
    extractions: Arc<RwLock<Vec<RecordedExtraction>>>,
    syntheses: Arc<RwLock<Vec<RecordedSynthesis>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerationService {
    /// Create a new mock that succeeds with a two-section outline.
    pub fn new() -> Self {
        Self {
            outline: Arc::new(RwLock::new(fixtures::outline(2))),
            outline_failure: Arc::new(RwLock::new(None)),
            chunk_failures: Arc::new(RwLock::new(HashMap::new())),
            synthesis_failure: Arc::new(RwLock::new(None)),
            extraction_delay: Arc::new(RwLock::new(Duration::ZERO)),
            chunk_delays: Arc::new(RwLock::new(HashMap::new())),
            outline_requests: Arc::new(RwLock::new(Vec::new())),
            extractions: Arc::new(RwLock::new(Vec::new())),
            syntheses: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the outline returned by subsequent outline calls.
    pub async fn set_outline(&self, outline: Vec<OutlineSection>) {
        *self.outline.write().await = outline;
    }

    /// Make outline generation fail with `message`.
    pub async fn fail_outline(&self, message: impl Into<String>) {
        *self.outline_failure.write().await = Some(message.into());
    }

    /// Make extraction of chunk `chunk_index` fail with `message`.
    pub async fn fail_chunk(&self, chunk_index: usize, message: impl Into<String>) {
        self.chunk_failures
            .write()
            .await
            .insert(chunk_index, message.into());
    }

    /// Make synthesis fail with `message`.
    pub async fn fail_synthesis(&self, message: impl Into<String>) {
        *self.synthesis_failure.write().await = Some(message.into());
    }

    /// Remove every configured failure.
    pub async fn clear_failures(&self) {
        *self.outline_failure.write().await = None;
        self.chunk_failures.write().await.clear();
        *self.synthesis_failure.write().await = None;
    }

    /// Delay every extraction call by `millis`.
    pub async fn set_extraction_delay_ms(&self, millis: u64) {
        *self.extraction_delay.write().await = Duration::from_millis(millis);
    }

    /// Delay extraction of chunk `chunk_index` by `millis`, in place of the
    /// shared delay.
    pub async fn set_chunk_delay_ms(&self, chunk_index: usize, millis: u64) {
        self.chunk_delays
            .write()
            .await
            .insert(chunk_index, Duration::from_millis(millis));
    }

    /// Number of outline calls made.
    pub async fn outline_calls(&self) -> usize {
        self.outline_requests.read().await.len()
    }

    /// Recorded extraction calls, in dispatch order.
    pub async fn extraction_calls(&self) -> Vec<RecordedExtraction> {
        self.extractions.read().await.clone()
    }

    /// Recorded synthesis calls.
    pub async fn synthesis_calls(&self) -> Vec<RecordedSynthesis> {
        self.syntheses.read().await.clone()
    }

    /// Highest number of extraction calls observed running at once.
    pub fn max_concurrent_extractions(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Forget all recorded calls.
    pub async fn clear_calls(&self) {
        self.outline_requests.write().await.clear();
        self.extractions.write().await.clear();
        self.syntheses.write().await.clear();
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<OutlineSection>, GenerationError> {
        self.outline_requests.write().await.push(request.clone());

        if let Some(message) = self.outline_failure.read().await.clone() {
            return Err(GenerationError::Failed(message));
        }
        Ok(self.outline.read().await.clone())
    }

    async fn extract_chunk(
        &self,
        request: &ChunkExtractionRequest,
    ) -> Result<ExtractedChunkPartial, GenerationError> {
        self.extractions.write().await.push(RecordedExtraction {
            chunk_index: request.chunk_index,
            total_chunks: request.total_chunks,
            chunk_text: request.chunk_text.clone(),
            focus_section_ids: request.focus_sections.iter().map(|s| s.id.clone()).collect(),
            settings: request.settings.clone(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = match self.chunk_delays.read().await.get(&request.chunk_index) {
            Some(delay) => *delay,
            None => *self.extraction_delay.read().await,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(message) = self.chunk_failures.read().await.get(&request.chunk_index) {
            return Err(GenerationError::Failed(message.clone()));
        }

        let index = request.chunk_index;
        Ok(ExtractedChunkPartial {
            tldr_points: vec![format!("Key point from chunk {}", index)],
            numbers: vec![format!("MAP >= {}", 60 + index)],
            active_recall_questions: vec![RecallQuestion {
                question: format!("What does chunk {} cover?", index),
                answer: format!("Chunk {} material", index),
            }],
            glossary_terms: vec![format!("term-{}", index)],
            chunk_markdown: format!("## Chunk {}\n\n- Key point from chunk {}", index, index),
            ..Default::default()
        })
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisOutput, GenerationError> {
        self.syntheses.write().await.push(RecordedSynthesis {
            title: request.title.clone(),
            tags: request.tags.clone(),
            chunk_ids: request.chunk_results.iter().map(|r| r.chunk_id).collect(),
            outline_ids: request.outline.iter().map(|s| s.id.clone()).collect(),
            text_sample: request.text_sample.clone(),
        });

        if let Some(message) = self.synthesis_failure.read().await.clone() {
            return Err(GenerationError::Failed(message));
        }

        let mut markdown = format!("# {}\n", request.title);
        for result in &request.chunk_results {
            markdown.push('\n');
            markdown.push_str(&result.extracted.chunk_markdown);
            markdown.push('\n');
        }

        let glossary_entries = request
            .chunk_results
            .iter()
            .flat_map(|r| r.extracted.glossary_terms.iter())
            .map(|term| GlossaryEntry {
                term: term.clone(),
                definition: format!("Definition of {}", term),
                english_term: None,
            })
            .collect();

        Ok(SynthesisOutput {
            final_document: markdown,
            glossary_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{ChunkPlanEntry, Priority};
    use std::collections::BTreeMap;

    fn extraction(chunk_index: usize) -> ChunkExtractionRequest {
        ChunkExtractionRequest {
            chunk_text: "text".to_string(),
            chunk_index,
            total_chunks: 2,
            settings: StudySettings::default(),
            focus_sections: fixtures::outline(1),
        }
    }

    #[tokio::test]
    async fn test_default_outline_has_two_sections() {
        let service = MockGenerationService::new();
        let request = OutlineRequest {
            raw_text: "text".to_string(),
            title: "Shock".to_string(),
            tags: vec![],
        };
        let outline = service.generate_outline(&request).await.unwrap();
        assert_eq!(outline.len(), 2);
        assert_eq!(service.outline_calls().await, 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_until_cleared() {
        let service = MockGenerationService::new();
        service.fail_chunk(1, "boom").await;

        assert!(service.extract_chunk(&extraction(0)).await.is_ok());
        let err = service.extract_chunk(&extraction(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Generation failed: boom");
        assert!(service.extract_chunk(&extraction(1)).await.is_err());

        service.clear_failures().await;
        assert!(service.extract_chunk(&extraction(1)).await.is_ok());
        assert_eq!(service.extraction_calls().await.len(), 4);

        service.clear_calls().await;
        assert!(service.extraction_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_synthesis_joins_chunk_markdown() {
        let service = MockGenerationService::new();
        let entry = ChunkPlanEntry {
            chunk_id: 0,
            title: "Part 1".to_string(),
            start: 0,
            end: 4,
            outline_ids: vec!["section-1".to_string()],
            outline_priorities: BTreeMap::from([("section-1".to_string(), Priority::High)]),
            highest_priority: Priority::High,
        };
        let partial = service.extract_chunk(&extraction(0)).await.unwrap();
        let request = SynthesisRequest {
            outline: fixtures::outline(1),
            chunk_results: vec![partial.into_result(&entry)],
            settings: StudySettings::default(),
            text_sample: "text".to_string(),
            title: "Shock".to_string(),
            tags: vec![],
        };

        let output = service.synthesize(&request).await.unwrap();
        assert!(output.final_document.starts_with("# Shock"));
        assert!(output.final_document.contains("## Chunk 0"));
        assert_eq!(output.glossary_entries.len(), 1);
        assert_eq!(service.synthesis_calls().await[0].chunk_ids, vec![0]);
    }
}
