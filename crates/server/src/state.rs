use std::sync::{Arc, Mutex, MutexGuard};

use chunkwise_core::{
    ChunkEstimator, Config, EventStore, PipelineCoordinator, ResumeController, SanitizedConfig,
};

use crate::runs::RunRegistry;

/// Shared application state
pub struct AppState {
    config: Config,
    coordinator: Arc<PipelineCoordinator>,
    event_store: Arc<dyn EventStore>,
    runs: RunRegistry,
    resume: Mutex<ResumeController>,
    estimator: Mutex<ChunkEstimator>,
}

impl AppState {
    pub fn new(
        config: Config,
        coordinator: Arc<PipelineCoordinator>,
        event_store: Arc<dyn EventStore>,
    ) -> Self {
        let estimator = ChunkEstimator::new(
            config.pipeline.chunk_size_chars,
            config.pipeline.overlap_chars,
        );
        Self {
            config,
            coordinator,
            event_store,
            runs: RunRegistry::new(),
            resume: Mutex::new(ResumeController::new()),
            estimator: Mutex::new(estimator),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    pub fn event_store(&self) -> &dyn EventStore {
        self.event_store.as_ref()
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.runs
    }

    pub fn resume_controller(&self) -> MutexGuard<'_, ResumeController> {
        self.resume.lock().unwrap()
    }

    pub fn estimator(&self) -> MutexGuard<'_, ChunkEstimator> {
        self.estimator.lock().unwrap()
    }
}
