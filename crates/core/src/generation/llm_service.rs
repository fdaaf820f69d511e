//! LLM-backed implementation of the generation service.
//!
//! Each phase is a single JSON-returning completion. The prompts describe
//! the expected JSON shape; the reply is parsed leniently (missing arrays
//! become empty) because models routinely omit empty fields.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::llm::{CompletionRequest, LlmClient, LlmUsage};
use super::traits::{GenerationError, GenerationService};
use super::types::{
    ChunkExtractionRequest, ExtractedChunkData, ExtractedChunkPartial, GlossaryEntry,
    HighlightDensity, OutlineRequest, OutputLength, StudySettings, SynthesisOutput,
    SynthesisRequest,
};
use crate::metrics;
use crate::planner::{OutlineSection, SourceText};

/// Tuning knobs for the LLM service.
#[derive(Debug, Clone)]
pub struct LlmServiceConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Characters of the raw input shown to the outline prompt.
    pub outline_input_chars: usize,
    /// Items per list kept when aggregating chunk results for synthesis.
    pub synthesis_items_per_field: usize,
}

impl Default for LlmServiceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
            outline_input_chars: 40_000,
            synthesis_items_per_field: 10,
        }
    }
}

/// Generation service issuing completions through an [`LlmClient`].
///
/// Generic over the client type to support different providers.
pub struct LlmGenerationService<C: LlmClient> {
    client: Arc<C>,
    config: LlmServiceConfig,
}

impl<C: LlmClient> LlmGenerationService<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            config: LlmServiceConfig::default(),
        }
    }

    pub fn with_config(client: Arc<C>, config: LlmServiceConfig) -> Self {
        Self { client, config }
    }

    fn request(&self, system: String, prompt: String) -> CompletionRequest {
        CompletionRequest::new(prompt)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature)
    }

    fn record_usage(&self, usage: &LlmUsage) {
        let provider = self.client.provider();
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "input"])
            .inc_by(usage.input_tokens as u64);
        metrics::LLM_TOKENS
            .with_label_values(&[provider, "output"])
            .inc_by(usage.output_tokens as u64);
    }
}

const SYSTEM_PROMPT: &str = "You are a meticulous study-guide author. You turn dense source \
material into accurate, well-structured study notes. You never invent facts that are not \
supported by the source unless explicitly allowed. You always answer with a single JSON object \
and nothing else.";

#[derive(Debug, Deserialize)]
struct OutlineReply {
    #[serde(default)]
    sections: Vec<OutlineSection>,
}

#[derive(Debug, Deserialize)]
struct SynthesisReply {
    #[serde(default)]
    roadmap: String,
    #[serde(default)]
    tldr: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    stepwise_teaching: String,
    #[serde(default)]
    numbers: String,
    #[serde(default)]
    algorithm: String,
    #[serde(default)]
    pitfalls: String,
    #[serde(default)]
    memory_aids: String,
    #[serde(default)]
    active_recall: String,
    #[serde(default)]
    glossary_entries: Vec<GlossaryEntry>,
}

fn goal_line(title: &str, tags: &[String]) -> String {
    let title = if title.trim().is_empty() {
        "General mastery"
    } else {
        title
    };
    if tags.is_empty() {
        format!("Study goal: {}.", title)
    } else {
        format!("Study goal: {}. Tags: {}.", title, tags.join(", "))
    }
}

fn extraction_prompt(request: &ChunkExtractionRequest) -> String {
    let mut prompt = format!(
        "Processing chunk {}/{}.\n",
        request.chunk_index + 1,
        request.total_chunks
    );
    prompt.push_str(&settings_guidance(&request.settings));

    if !request.focus_sections.is_empty() {
        prompt.push_str("\nThis chunk is responsible for these outline sections:\n");
        for section in &request.focus_sections {
            prompt.push_str(&format!(
                "- [{}] {} ({}): {}\n",
                section.id,
                section.title,
                section.priority.as_str(),
                section.summary
            ));
        }
    }

    prompt.push_str(
        r#"
Extract detailed material. Do not simplify. Respond with JSON only:
{
  "tldr_points": ["..."],
  "algorithm_steps": ["..."],
  "numbers": ["..."],
  "diagnostic_patterns": ["..."],
  "pitfalls": ["..."],
  "memory_aids": ["..."],
  "active_recall_questions": [{"question": "...", "answer": "..."}],
  "glossary_terms": ["..."],
  "extra_content": ["..."],
  "chunk_markdown": "..."
}

CHUNK TEXT:
"#,
    );
    prompt.push_str(&request.chunk_text);
    prompt
}

fn settings_guidance(settings: &StudySettings) -> String {
    let mut lines = Vec::new();
    lines.push(if settings.include_extra {
        "Material beyond the source is allowed; mark it with [[EXTRA]]."
    } else {
        "Strict mode: use only the source material."
    });
    lines.push(if settings.include_translation {
        "Append a short English gloss in parentheses after key terms."
    } else {
        "Do not add English glosses."
    });
    lines.push(match settings.output_length {
        OutputLength::Light => "Keep the output brief.",
        OutputLength::Standard => "Use a standard level of detail.",
        OutputLength::Deep => "Be exhaustive.",
    });
    lines.push(match settings.highlight_density {
        HighlightDensity::Low => "Highlight sparingly: only the two or three most critical items.",
        HighlightDensity::Medium => "Highlight key terms and numbers at a moderate density.",
        HighlightDensity::High => "Highlight liberally: all relevant terms and numbers.",
    });
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn aggregate_chunks(chunks: &[ExtractedChunkData], per_field: usize) -> String {
    chunks
        .iter()
        .map(|c| {
            let e = &c.extracted;
            let take = |items: &[String], n: usize| {
                items.iter().take(n).cloned().collect::<Vec<_>>().join("; ")
            };
            format!(
                "[Chunk {}]\nKEY POINTS: {}\nSTEPS: {}\nNUMBERS: {}\nPITFALLS: {}",
                c.chunk_id,
                take(&e.tldr_points, per_field),
                take(&e.algorithm_steps, per_field / 2),
                take(&e.numbers, per_field),
                take(&e.pitfalls, per_field / 2),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn synthesis_prompt(request: &SynthesisRequest, per_field: usize) -> String {
    let mut prompt = goal_line(&request.title, &request.tags);
    prompt.push('\n');
    prompt.push_str(&settings_guidance(&request.settings));
    prompt.push_str(
        "Focus on the study goal; compress or omit material unrelated to it.\n\nOUTLINE:\n",
    );
    for section in &request.outline {
        prompt.push_str(&format!("- {} ({})\n", section.title, section.priority.as_str()));
    }
    prompt.push_str("\nSOURCE SAMPLE:\n");
    prompt.push_str(&request.text_sample);
    prompt.push_str("\n\nEXTRACTED DATA:\n");
    prompt.push_str(&aggregate_chunks(&request.chunk_results, per_field));
    prompt.push_str(
        r#"

Merge the data into one cohesive study guide. Respond with JSON only:
{
  "roadmap": "...", "tldr": "...", "explanation": "...", "stepwise_teaching": "...",
  "numbers": "...", "algorithm": "...", "pitfalls": "...", "memory_aids": "...",
  "active_recall": "...",
  "glossary_entries": [{"term": "...", "definition": "...", "english_term": "..."}]
}"#,
    );
    prompt
}

fn render_document(reply: &SynthesisReply, settings: &StudySettings) -> String {
    let sections = [
        ("Roadmap", &reply.roadmap),
        ("TL;DR", &reply.tldr),
        ("Why it works", &reply.explanation),
        ("Step by step", &reply.stepwise_teaching),
        ("Numbers and cutoffs", &reply.numbers),
        ("If/then algorithm", &reply.algorithm),
        ("Pitfalls", &reply.pitfalls),
        ("Memory aids", &reply.memory_aids),
        ("Active recall", &reply.active_recall),
    ];

    let mut doc = String::new();
    for (idx, (heading, body)) in sections.iter().enumerate() {
        doc.push_str(&format!("## {}) {}\n{}\n\n", idx + 1, heading, body.trim()));
    }

    if settings.auto_include_glossary && !reply.glossary_entries.is_empty() {
        doc.push_str(&format!("## {}) Glossary\n", sections.len() + 1));
        for (idx, entry) in reply.glossary_entries.iter().enumerate() {
            match &entry.english_term {
                Some(english) => doc.push_str(&format!(
                    "{}. {} ({}): {}\n",
                    idx + 1,
                    entry.term,
                    english,
                    entry.definition
                )),
                None => doc.push_str(&format!("{}. {}: {}\n", idx + 1, entry.term, entry.definition)),
            }
        }
    }
    doc
}

#[async_trait]
impl<C: LlmClient + 'static> GenerationService for LlmGenerationService<C> {
    fn name(&self) -> &str {
        self.client.provider()
    }

    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<OutlineSection>, GenerationError> {
        let text = SourceText::new(&request.raw_text);
        let prompt = format!(
            "{}\nBuild a study outline of the text below. Give every section a short unique id, \
             a title, a one-sentence summary, optional char_start/char_end offsets and a priority \
             of high, medium or low relative to the study goal.\n\
             Respond with JSON only: {{\"sections\": [{{\"id\": \"...\", \"title\": \"...\", \
             \"summary\": \"...\", \"char_start\": 0, \"char_end\": 0, \"priority\": \"high\"}}]}}\n\n\
             TEXT:\n{}",
            goal_line(&request.title, &request.tags),
            text.prefix(self.config.outline_input_chars)
        );

        let (reply, usage): (OutlineReply, _) = self
            .client
            .complete_json(self.request(SYSTEM_PROMPT.to_string(), prompt))
            .await?;
        self.record_usage(&usage);

        if reply.sections.is_empty() {
            return Err(GenerationError::InvalidResponse(
                "outline contained no sections".to_string(),
            ));
        }
        debug!(sections = reply.sections.len(), "Outline generated");
        Ok(reply.sections)
    }

    async fn extract_chunk(
        &self,
        request: &ChunkExtractionRequest,
    ) -> Result<ExtractedChunkPartial, GenerationError> {
        let (reply, usage): (ExtractedChunkPartial, _) = self
            .client
            .complete_json(self.request(SYSTEM_PROMPT.to_string(), extraction_prompt(request)))
            .await?;
        self.record_usage(&usage);
        Ok(reply)
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisOutput, GenerationError> {
        let prompt = synthesis_prompt(request, self.config.synthesis_items_per_field);
        let (reply, usage): (SynthesisReply, _) = self
            .client
            .complete_json(self.request(SYSTEM_PROMPT.to_string(), prompt))
            .await?;
        self.record_usage(&usage);

        Ok(SynthesisOutput {
            final_document: render_document(&reply, &request.settings),
            glossary_entries: reply.glossary_entries,
        })
    }
}
