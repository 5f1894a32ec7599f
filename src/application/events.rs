use crate::domain::event::{Event, EventSent};
use crate::domain::ports::{EventSinkRef, StorageRef};
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};
use chrono::Utc;
use tracing::debug;

/// Emits events at most once per idempotency key: check the sent log, emit,
/// then record the key.
#[derive(Clone)]
pub struct EventPublisher {
    storage: StorageRef,
    sink: EventSinkRef,
}

impl EventPublisher {
    pub fn new(storage: StorageRef, sink: EventSinkRef) -> Self {
        Self { storage, sink }
    }

    pub async fn send(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        event: &Event,
    ) -> Result<(), EngineError> {
        let key = event.idempotency_key();
        let key = key.as_str();
        let sent = ctx
            .activity(&format!("{step}-sent"), RetryPolicy::Unbounded, || async move {
                self.storage
                    .event_sent_exists(key)
                    .await
                    .map_err(ActivityError::from)
            })
            .await?;
        if sent {
            debug!(key, "event already sent, skipping");
            return Ok(());
        }

        ctx.activity(&format!("{step}-emit"), RetryPolicy::Unbounded, || async move {
            self.sink.emit(event.clone()).await.map_err(ActivityError::from)
        })
        .await?;

        ctx.activity(&format!("{step}-mark"), RetryPolicy::Unbounded, || async move {
            let sent = EventSent {
                idempotency_key: key.to_string(),
                connector_id: event.connector_id().clone(),
                sent_at: Utc::now(),
            };
            self.storage
                .store_event_sent(sent)
                .await
                .map_err(ActivityError::from)
        })
        .await
    }

    /// Sends `events` one after another under `step-0`, `step-1`, ...
    pub async fn send_all(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        events: &[Event],
    ) -> Result<(), EngineError> {
        for (i, event) in events.iter().enumerate() {
            self.send(ctx, &format!("{step}-{i}"), event).await?;
        }
        Ok(())
    }
}
