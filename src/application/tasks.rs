use crate::domain::ids::{ConnectorId, TaskId};
use crate::domain::ports::StorageRef;
use crate::domain::task::{Task, TaskStatus};
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};
use chrono::{DateTime, Utc};
use tracing::{error, info};

struct TaskRecord {
    status: TaskStatus,
    created_object_id: Option<String>,
    error: Option<String>,
    now: DateTime<Utc>,
}

/// Records the lifecycle of the task that launched a workflow.
#[derive(Clone)]
pub struct TaskRecorder {
    storage: StorageRef,
}

impl TaskRecorder {
    pub fn new(storage: StorageRef) -> Self {
        Self { storage }
    }

    pub async fn processing(
        &self,
        ctx: &WorkflowContext,
        task_id: &TaskId,
        connector_id: &ConnectorId,
    ) -> Result<(), EngineError> {
        let now = ctx.now("task-processing-at").await?;
        let record = TaskRecord {
            status: TaskStatus::Processing,
            created_object_id: None,
            error: None,
            now,
        };
        self.write(ctx, "task-processing", task_id, connector_id, record)
            .await
    }

    /// Records the outcome of the workflow on its task and passes the
    /// outcome through. If the task write itself fails, both errors are kept.
    pub async fn settle(
        &self,
        ctx: &WorkflowContext,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        outcome: Result<Option<String>, EngineError>,
    ) -> Result<(), EngineError> {
        let recorded = match ctx.now("task-settled-at").await {
            Ok(now) => {
                let (step, record) = match &outcome {
                    Ok(created) => (
                        "task-succeeded",
                        TaskRecord {
                            status: TaskStatus::Succeeded,
                            created_object_id: created.clone(),
                            error: None,
                            now,
                        },
                    ),
                    Err(err) => (
                        "task-failed",
                        TaskRecord {
                            status: TaskStatus::Failed,
                            created_object_id: None,
                            error: Some(err.to_string()),
                            now,
                        },
                    ),
                };
                self.write(ctx, step, task_id, connector_id, record).await
            }
            Err(err) => Err(err),
        };

        match (outcome, recorded) {
            (Ok(_), Ok(())) => {
                info!(task = %task_id, "task succeeded");
                Ok(())
            }
            (Err(err), Ok(())) => {
                info!(task = %task_id, error = %err, "task failed");
                Err(err)
            }
            (outcome, Err(bookkeeping)) => {
                error!(task = %task_id, error = %bookkeeping, "failed to record task outcome");
                Err(EngineError::Bookkeeping {
                    outcome: outcome.err().map(Box::new),
                    bookkeeping: Box::new(bookkeeping),
                })
            }
        }
    }

    async fn write(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        record: TaskRecord,
    ) -> Result<(), EngineError> {
        let record = &record;
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            let created_at = self
                .storage
                .get_task(task_id)
                .await?
                .map_or(record.now, |existing| existing.created_at);
            let task = Task {
                id: task_id.clone(),
                connector_id: connector_id.clone(),
                status: record.status,
                created_object_id: record.created_object_id.clone(),
                error: record.error.clone(),
                created_at,
                updated_at: record.now,
            };
            self.storage.store_task(task).await.map_err(ActivityError::from)
        })
        .await
    }
}
