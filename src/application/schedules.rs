use super::workflow::{Exit, Workflow};
use crate::domain::page::PageQuery;
use crate::domain::schedule::Schedule;
use crate::domain::workflow::{TerminateSchedules, WorkflowInput};
use crate::durable::pagination::{FetchedPage, LoopExit, PaginatedTask, run_paginated};
use crate::durable::{Batch, RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};
use async_trait::async_trait;
use tracing::info;

/// Deletes every schedule of a connector, page by page. Trigger deletion is
/// best effort; the schedule rows must go.
struct ScheduleTeardown<'w> {
    workflow: &'w Workflow,
}

#[async_trait]
impl PaginatedTask for ScheduleTeardown<'_> {
    type Item = Schedule;
    type State = TerminateSchedules;

    async fn fetch_page(
        &self,
        ctx: &WorkflowContext,
        state: &TerminateSchedules,
        page: usize,
    ) -> Result<FetchedPage<Schedule, TerminateSchedules>, EngineError> {
        let query = PageQuery {
            page_size: self.workflow.config.list_page_size.max(1),
            cursor: state.cursor.clone(),
        };
        let (storage, query) = (&self.workflow.storage, &query);
        let connector_id = &state.connector_id;
        let listed = ctx
            .activity(
                &format!("storage-schedules-list-{page}"),
                RetryPolicy::Unbounded,
                || async move {
                    storage
                        .list_schedules(connector_id, query.clone())
                        .await
                        .map_err(ActivityError::from)
                },
            )
            .await?;

        let has_more = listed.has_more();
        let state = TerminateSchedules {
            connector_id: state.connector_id.clone(),
            cursor: listed.next.clone().or_else(|| state.cursor.clone()),
        };
        Ok(FetchedPage {
            items: listed.data,
            state,
            has_more,
        })
    }

    fn process<'a>(&'a self, ctx: &'a WorkflowContext, schedule: Schedule, batch: &mut Batch<'a>) {
        let workflow = self.workflow;
        let attempts = workflow.config.cleanup_attempts;
        let id = schedule.id;

        let trigger_id = id.clone();
        batch.spawn_logged(format!("delete-trigger-{id}"), async move {
            let step = format!("scheduler-delete-{trigger_id}");
            workflow
                .delete_trigger(ctx, &step, &trigger_id, RetryPolicy::Bounded(attempts))
                .await
        });
        batch.spawn(format!("delete-schedule-{id}"), async move {
            let step = format!("storage-schedules-delete-{id}");
            workflow.delete_schedule_row(ctx, &step, &id).await
        });
    }

    async fn checkpoint(
        &self,
        ctx: &WorkflowContext,
        state: &TerminateSchedules,
        page: usize,
    ) -> Result<(), EngineError> {
        let storage = &self.workflow.storage;
        let state_id = format!("terminate-schedules-{}", state.connector_id);
        let state_id = state_id.as_str();
        let value =
            serde_json::to_value(state).map_err(|e| EngineError::InvalidInput(e.to_string()))?;
        let value = &value;
        ctx.activity(
            &format!("storage-states-store-{page}"),
            RetryPolicy::Unbounded,
            || async move {
                storage
                    .store_state(state_id, value.clone())
                    .await
                    .map_err(ActivityError::from)
            },
        )
        .await
    }
}

impl Workflow {
    pub(crate) async fn run_terminate_schedules(
        &self,
        ctx: &WorkflowContext,
        req: &TerminateSchedules,
    ) -> Result<Exit, EngineError> {
        let teardown = ScheduleTeardown { workflow: self };
        match run_paginated(ctx, &teardown, req.clone()).await? {
            LoopExit::Completed => {
                info!(connector = %req.connector_id, "all schedules terminated");
                Ok(Exit::Completed)
            }
            LoopExit::ContinueAsNew(state) => {
                Ok(Exit::ContinueAsNew(WorkflowInput::TerminateSchedules(state)))
            }
        }
    }
}
