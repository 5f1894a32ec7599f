use super::retry::{Backoff, RetryPolicy, retry};
use crate::domain::ports::JournalRef;
use crate::error::{ActivityError, ActivityFailure, EngineError, StorageError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

#[derive(Serialize, Deserialize)]
enum StepRecord<T> {
    Completed(T),
    Failed(ActivityFailure),
}

/// Execution context of one workflow run.
///
/// Every side effect goes through [`WorkflowContext::activity`], which
/// records the outcome under a step name. When the same workflow run is
/// executed again after a crash, recorded steps return their journaled
/// outcome instead of running, so the workflow observes the same history and
/// makes the same decisions. Step names must therefore be unique and
/// deterministic within a run.
pub struct WorkflowContext {
    workflow_id: String,
    run: u32,
    journal: JournalRef,
    backoff: Backoff,
    history_threshold: usize,
    history_len: AtomicUsize,
}

impl WorkflowContext {
    pub fn new(
        workflow_id: impl Into<String>,
        run: u32,
        journal: JournalRef,
        backoff: Backoff,
        history_threshold: usize,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run,
            journal,
            backoff,
            history_threshold,
            history_len: AtomicUsize::new(0),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn history_len(&self) -> usize {
        self.history_len.load(Ordering::Relaxed)
    }

    /// True once this run's history is long enough that the workflow should
    /// carry its state into a fresh run.
    pub fn should_continue_as_new(&self) -> bool {
        self.history_len() >= self.history_threshold
    }

    pub async fn activity<T, F, Fut>(
        &self,
        step: &str,
        policy: RetryPolicy,
        op: F,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, ActivityError>> + Send,
    {
        let recorded = self
            .journal
            .load_step(&self.workflow_id, self.run, step)
            .await
            .map_err(EngineError::Journal)?;
        if let Some(recorded) = recorded {
            self.history_len.fetch_add(1, Ordering::Relaxed);
            debug!(workflow_id = %self.workflow_id, step, "replaying recorded step");
            let record: StepRecord<T> = serde_json::from_value(recorded)
                .map_err(|e| EngineError::Journal(StorageError::codec(e)))?;
            return match record {
                StepRecord::Completed(value) => Ok(value),
                StepRecord::Failed(failure) => Err(failure.into()),
            };
        }

        let outcome = retry(step, policy, &self.backoff, op).await;
        let encoded = match &outcome {
            Ok(value) => serde_json::to_value(StepRecord::Completed(value)),
            Err(failure) => serde_json::to_value(StepRecord::<&T>::Failed(failure.clone())),
        }
        .map_err(|e| EngineError::Journal(StorageError::codec(e)))?;
        self.journal
            .record_step(&self.workflow_id, self.run, step, encoded)
            .await
            .map_err(EngineError::Journal)?;
        self.history_len.fetch_add(1, Ordering::Relaxed);
        outcome.map_err(EngineError::from)
    }

    /// Wall-clock read, journaled so replays see the same instant.
    pub async fn now(&self, step: &str) -> Result<DateTime<Utc>, EngineError> {
        self.activity(step, RetryPolicy::Unbounded, || async {
            Ok::<_, ActivityError>(Utc::now())
        })
        .await
    }
}
