use chrono::Utc;
use tokio::sync::mpsc;

use super::{EventEnvelope, PipelineEvent};

/// Handle for emitting pipeline events.
///
/// Cheaply cloneable. Events go through a bounded channel to the
/// `EventWriter`; a full or closed channel is logged, never propagated.
#[derive(Clone)]
pub struct EventHandle {
    tx: mpsc::Sender<EventEnvelope>,
}

impl EventHandle {
    pub fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: PipelineEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::error!("Failed to emit pipeline event: {}", e);
        }
    }

    /// Try to emit without waiting. Returns true if the event was queued.
    pub fn try_emit(&self, event: PipelineEvent) -> bool {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to emit pipeline event: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PipelineEventKind;
    use crate::pipeline::PipelineState;

    fn event(kind: PipelineEventKind) -> PipelineEvent {
        PipelineEvent::from_state(kind, "s-1", &PipelineState::new(), 0)
    }

    #[tokio::test]
    async fn test_emit_event() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = EventHandle::new(tx);

        handle.emit(event(PipelineEventKind::Start)).await;

        let envelope = rx.recv().await.expect("Should receive event");
        assert_eq!(envelope.event.kind, PipelineEventKind::Start);
    }

    #[test]
    fn test_try_emit_full_channel() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = EventHandle::new(tx);

        assert!(handle.try_emit(event(PipelineEventKind::Start)));
        assert!(!handle.try_emit(event(PipelineEventKind::Complete)));
    }

    #[tokio::test]
    async fn test_emit_closed_channel() {
        let (tx, rx) = mpsc::channel::<EventEnvelope>(10);
        let handle = EventHandle::new(tx);
        drop(rx);

        // Logged, not propagated.
        handle.emit(event(PipelineEventKind::Error)).await;
    }

    #[test]
    fn test_envelope_has_timestamp() {
        let (tx, mut rx) = mpsc::channel(10);
        let handle = EventHandle::new(tx);

        let before = Utc::now();
        handle.try_emit(event(PipelineEventKind::Resume));
        let after = Utc::now();

        let envelope = rx.try_recv().expect("Should receive event");
        assert!(envelope.timestamp >= before);
        assert!(envelope.timestamp <= after);
    }
}
