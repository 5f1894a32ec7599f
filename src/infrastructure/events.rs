use crate::domain::event::Event;
use crate::domain::ports::EventSink;
use crate::error::SinkError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Keeps every emitted event in memory, in emission order.
#[derive(Default, Clone)]
pub struct RecordingEventSink {
    events: Arc<RwLock<Vec<Event>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: Event) -> Result<(), SinkError> {
        self.events.write().await.push(event);
        Ok(())
    }
}

/// Writes each event as a structured log line.
#[derive(Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn emit(&self, event: Event) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(&event).map_err(|e| SinkError::Unavailable(e.to_string()))?;
        info!(
            target: "pi_engine::events",
            key = %event.idempotency_key(),
            connector = %event.connector_id(),
            %payload,
            "event emitted"
        );
        Ok(())
    }
}
