use std::sync::Arc;

use tokio::sync::mpsc;

use super::{EventEnvelope, EventHandle, EventRecord, EventStore, PipelineEventKind};

/// Background task that logs pipeline events and writes them to storage.
pub struct EventWriter {
    rx: mpsc::Receiver<EventEnvelope>,
    store: Arc<dyn EventStore>,
}

impl EventWriter {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>, store: Arc<dyn EventStore>) -> Self {
        Self { rx, store }
    }

    /// Consume events until every handle has been dropped.
    pub async fn run(mut self) {
        tracing::info!("Event writer started");

        while let Some(envelope) = self.rx.recv().await {
            let event = &envelope.event;
            match event.kind {
                PipelineEventKind::Error => tracing::warn!(
                    session_id = %event.session_id,
                    phase = %event.phase,
                    processed = event.processed_chunks,
                    total = event.total_chunks,
                    error = event.error_message.as_deref().unwrap_or(""),
                    "pipeline error"
                ),
                kind => tracing::info!(
                    session_id = %event.session_id,
                    phase = %event.phase,
                    processed = event.processed_chunks,
                    total = event.total_chunks,
                    tags = event.tag_count,
                    "pipeline {}",
                    kind.as_str()
                ),
            }

            let record = EventRecord {
                id: 0, // assigned by the store
                timestamp: envelope.timestamp,
                kind: event.kind.as_str().to_string(),
                session_id: event.session_id.clone(),
                data: envelope.event,
            };

            if let Err(e) = self.store.insert(&record) {
                tracing::error!("Failed to write pipeline event: {}", e);
            }
        }

        tracing::info!("Event writer shutting down");
    }
}

/// Create a handle/writer pair sharing a channel of `buffer_size` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())`.
pub fn create_event_system(
    store: Arc<dyn EventStore>,
    buffer_size: usize,
) -> (EventHandle, EventWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EventHandle::new(tx), EventWriter::new(rx, store))
}
