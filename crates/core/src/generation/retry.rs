//! Bounded retry policy applied to every collaborator call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::traits::{GenerationError, GenerationService};
use super::types::{
    ChunkExtractionRequest, ExtractedChunkPartial, OutlineRequest, SynthesisOutput,
    SynthesisRequest,
};
use crate::metrics;
use crate::planner::OutlineSection;

/// Retry configuration for generation calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1000 // 1 second
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000 // 30 seconds
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut retry = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry < config.max_retries => {
                let delay = config.delay_for(retry);
                warn!(
                    operation,
                    retry = retry + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient generation error, retrying"
                );
                metrics::GENERATION_RETRIES
                    .with_label_values(&[operation])
                    .inc();
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decorates a [`GenerationService`] with the retry policy.
pub struct RetryingGenerationService {
    inner: Arc<dyn GenerationService>,
    config: RetryConfig,
}

impl RetryingGenerationService {
    pub fn new(inner: Arc<dyn GenerationService>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationService for RetryingGenerationService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate_outline(
        &self,
        request: &OutlineRequest,
    ) -> Result<Vec<OutlineSection>, GenerationError> {
        let inner = &self.inner;
        with_retry(&self.config, "outline", move || inner.generate_outline(request)).await
    }

    async fn extract_chunk(
        &self,
        request: &ChunkExtractionRequest,
    ) -> Result<ExtractedChunkPartial, GenerationError> {
        let inner = &self.inner;
        with_retry(&self.config, "extract_chunk", move || {
            inner.extract_chunk(request)
        })
        .await
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesisOutput, GenerationError> {
        let inner = &self.inner;
        with_retry(&self.config, "synthesize", move || inner.synthesize(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::LlmError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 0,
            backoff_multiplier: 2.0,
            max_delay_ms: 0,
        }
    }

    fn transient() -> GenerationError {
        GenerationError::Llm(LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        })
    }

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: RetryConfig = toml::from_str("max_retries = 5").unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::InvalidResponse("garbage".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::InvalidResponse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_never_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryConfig::disabled(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
