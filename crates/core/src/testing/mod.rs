//! Testing utilities and mock implementations.
//!
//! This module provides a scripted generation backend and an in-memory
//! session store, so the whole pipeline can be driven without an LLM or a
//! database.
//!
//! # Example
//!
//! ```rust,ignore
//! use chunkwise_core::testing::{fixtures, InMemorySessionStore, MockGenerationService};
//!
//! let service = Arc::new(MockGenerationService::new());
//! let store = Arc::new(InMemorySessionStore::new());
//! let coordinator = PipelineCoordinator::new(store, service.clone(), config);
//!
//! // Configure mock behavior
//! service.fail_chunk(1, "quota exceeded").await;
//! ```

mod memory_store;
mod mock_generation;

pub use memory_store::InMemorySessionStore;
pub use mock_generation::{MockGenerationService, RecordedExtraction, RecordedSynthesis};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::generation::StudySettings;
    use crate::pipeline::CreateSessionRequest;
    use crate::planner::{OutlineSection, Priority};

    const WORDS: &[&str] = &[
        "shock", "lactate", "perfusion", "vasopressor", "preload", "afterload", "sepsis",
        "oxygen", "delivery", "cardiac", "output", "fluid", "bolus", "norepinephrine",
    ];

    /// Study-like text of exactly `chars` characters.
    ///
    /// Contains no `.` or newline, so the splitter always makes hard cuts.
    pub fn study_text(chars: usize) -> String {
        let mut text = String::with_capacity(chars + 16);
        let mut i = 0;
        while text.len() < chars {
            text.push_str(WORDS[i % WORDS.len()]);
            text.push(' ');
            i += 1;
        }
        text.truncate(chars);
        text
    }

    /// Outline with `count` sections, `section-1..=section-count`.
    ///
    /// Priorities cycle high, medium, low.
    pub fn outline(count: usize) -> Vec<OutlineSection> {
        (1..=count)
            .map(|i| {
                let priority = match (i - 1) % 3 {
                    0 => Priority::High,
                    1 => Priority::Medium,
                    _ => Priority::Low,
                };
                OutlineSection::new(format!("section-{}", i), format!("Section {}", i), priority)
                    .with_summary(format!("Summary of section {}", i))
            })
            .collect()
    }

    /// A session request over `chars` characters of study text.
    pub fn session_request(title: &str, tags: &[&str], chars: usize) -> CreateSessionRequest {
        CreateSessionRequest {
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            input_text: study_text(chars),
            settings: StudySettings::default(),
        }
    }
}
