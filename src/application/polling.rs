use super::workflow::Workflow;
use crate::domain::ids::{ConnectorId, PaymentInitiationId, TaskId};
use crate::domain::payment::{Payment, PspPayment};
use crate::domain::payment_initiation::{AdjustmentStatus, PaymentInitiationAdjustment};
use crate::domain::plugin::{PollOutcome, PollPayoutStatusRequest, PollTransferStatusRequest};
use crate::domain::schedule::{Schedule, polling_schedule_id};
use crate::domain::workflow::{OperationKind, PollPayout, PollTransfer, WorkflowInput};
use crate::durable::{Batch, RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError, SchedulerError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One poll of an asynchronous transfer or payout.
#[derive(Clone, Copy)]
pub(crate) struct PollJob<'a> {
    kind: OperationKind,
    task_id: &'a TaskId,
    connector_id: &'a ConnectorId,
    payment_initiation_id: &'a PaymentInitiationId,
    polling_id: &'a str,
    schedule_id: &'a str,
}

impl<'a> From<&'a PollTransfer> for PollJob<'a> {
    fn from(req: &'a PollTransfer) -> Self {
        Self {
            kind: OperationKind::Transfer,
            task_id: &req.task_id,
            connector_id: &req.connector_id,
            payment_initiation_id: &req.payment_initiation_id,
            polling_id: &req.transfer_id,
            schedule_id: &req.schedule_id,
        }
    }
}

impl<'a> From<&'a PollPayout> for PollJob<'a> {
    fn from(req: &'a PollPayout) -> Self {
        Self {
            kind: OperationKind::Payout,
            task_id: &req.task_id,
            connector_id: &req.connector_id,
            payment_initiation_id: &req.payment_initiation_id,
            polling_id: &req.payout_id,
            schedule_id: &req.schedule_id,
        }
    }
}

impl Workflow {
    /// Registers a recurring poll for an asynchronous PSP operation and its
    /// schedule row.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn schedule_polling(
        &self,
        ctx: &WorkflowContext,
        kind: OperationKind,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        every: Duration,
        pi_id: &PaymentInitiationId,
        polling_id: &str,
    ) -> Result<(), EngineError> {
        let schedule_id = polling_schedule_id(kind, &self.config.stack, connector_id, polling_id);
        let input = match kind {
            OperationKind::Transfer => WorkflowInput::PollTransfer(PollTransfer {
                task_id: task_id.clone(),
                connector_id: connector_id.clone(),
                payment_initiation_id: pi_id.clone(),
                transfer_id: polling_id.to_string(),
                schedule_id: schedule_id.clone(),
            }),
            OperationKind::Payout => WorkflowInput::PollPayout(PollPayout {
                task_id: task_id.clone(),
                connector_id: connector_id.clone(),
                payment_initiation_id: pi_id.clone(),
                payout_id: polling_id.to_string(),
                schedule_id: schedule_id.clone(),
            }),
        };

        // The row goes first: a trigger firing before it exists is dropped.
        let now = ctx.now("schedule-created-at").await?;
        let schedule = Schedule {
            id: schedule_id.clone(),
            connector_id: connector_id.clone(),
            created_at: now,
        };
        let schedule = &schedule;
        ctx.activity("storage-schedules-store", RetryPolicy::Unbounded, || async move {
            self.storage
                .store_schedule(schedule.clone())
                .await
                .map_err(ActivityError::from)
        })
        .await?;

        let (schedule_id, input) = (schedule_id.as_str(), &input);
        ctx.activity("scheduler-create-trigger", RetryPolicy::Unbounded, || async move {
            match self
                .scheduler
                .create_recurring_trigger(schedule_id, input.clone(), every)
                .await
            {
                Ok(()) | Err(SchedulerError::AlreadyExists(_)) => Ok(()),
                Err(err) => Err(ActivityError::from(err)),
            }
        })
        .await?;
        info!(schedule = schedule_id, ?every, "polling scheduled");
        Ok(())
    }

    /// One tick of a poll. A pending status is a no-op. A settled payment
    /// or a PSP-reported error resolves the initiation, tears the schedule
    /// down, and records the task outcome. The tick itself only fails when
    /// that bookkeeping does.
    pub(crate) async fn run_poll(
        &self,
        ctx: &WorkflowContext,
        job: PollJob<'_>,
    ) -> Result<(), EngineError> {
        let connector = self.connectors.get(job.connector_id).await?;
        let plugin = &connector.plugin;
        let polled = ctx
            .activity(
                &format!("plugin-poll-{}-status", job.kind.as_str()),
                RetryPolicy::Bounded(self.config.poll_status_attempts),
                || async move {
                    let outcome: PollOutcome = match job.kind {
                        OperationKind::Transfer => plugin
                            .poll_transfer_status(PollTransferStatusRequest {
                                transfer_id: job.polling_id.to_string(),
                            })
                            .await?
                            .into(),
                        OperationKind::Payout => plugin
                            .poll_payout_status(PollPayoutStatusRequest {
                                payout_id: job.polling_id.to_string(),
                            })
                            .await?
                            .into(),
                    };
                    Ok::<_, ActivityError>(outcome)
                },
            )
            .await;

        let outcome = match polled {
            Ok(PollOutcome {
                payment: Some(psp), ..
            }) => self.resolve_poll(ctx, job, psp).await,
            Ok(PollOutcome {
                error: Some(message),
                ..
            }) => self.fail_poll(ctx, job, message).await,
            Ok(_) => {
                debug!(schedule = job.schedule_id, "still pending");
                return Ok(());
            }
            Err(err @ EngineError::Activity(_)) => Err(err),
            Err(err) => return Err(err),
        };

        match self
            .tasks
            .settle(ctx, job.task_id, job.connector_id, outcome)
            .await
        {
            Err(err @ EngineError::Bookkeeping { .. }) => Err(err),
            Err(err) => {
                warn!(schedule = job.schedule_id, error = %err, "poll resolved task as failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn resolve_poll(
        &self,
        ctx: &WorkflowContext,
        job: PollJob<'_>,
        psp: PspPayment,
    ) -> Result<Option<String>, EngineError> {
        let payment = Payment::from_psp(psp, job.connector_id);
        info!(
            payment_initiation = %job.payment_initiation_id,
            payment = %payment.id,
            status = %payment.status,
            "poll settled payment"
        );
        self.record_payment_with_status(ctx, "commit", &payment, job.payment_initiation_id)
            .await?;
        self.teardown_polling(ctx, job.schedule_id).await?;
        Ok(Some(payment.id.to_string()))
    }

    async fn fail_poll(
        &self,
        ctx: &WorkflowContext,
        job: PollJob<'_>,
        message: String,
    ) -> Result<Option<String>, EngineError> {
        let pi = self
            .load_payment_initiation(ctx, job.payment_initiation_id)
            .await?;
        let now = ctx.now("failed-at").await?;
        self.add_adjustment(
            ctx,
            "adjust-failed",
            PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::Failed)
                .with_amount(pi.amount, pi.asset.clone())
                .with_error(message.clone()),
        )
        .await?;
        self.teardown_polling(ctx, job.schedule_id).await?;
        Err(EngineError::Psp(message))
    }

    /// Deletes the trigger and the schedule row concurrently; done once
    /// both are gone.
    pub(crate) async fn teardown_polling(
        &self,
        ctx: &WorkflowContext,
        schedule_id: &str,
    ) -> Result<(), EngineError> {
        let mut batch = Batch::new();
        batch.spawn(
            "delete-trigger",
            self.delete_trigger(ctx, "scheduler-delete-trigger", schedule_id, RetryPolicy::Unbounded),
        );
        batch.spawn(
            "delete-schedule",
            self.delete_schedule_row(ctx, "storage-schedules-delete", schedule_id),
        );
        batch.join().await
    }

    pub(crate) async fn delete_trigger(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        schedule_id: &str,
        policy: RetryPolicy,
    ) -> Result<(), EngineError> {
        ctx.activity(step, policy, || async move {
            match self.scheduler.delete_recurring_trigger(schedule_id).await {
                Ok(()) | Err(SchedulerError::NotFound(_)) => Ok(()),
                Err(err) => Err(ActivityError::from(err)),
            }
        })
        .await
    }

    pub(crate) async fn delete_schedule_row(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        schedule_id: &str,
    ) -> Result<(), EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            self.storage
                .delete_schedule(schedule_id)
                .await
                .map_err(ActivityError::from)
        })
        .await
    }
}
