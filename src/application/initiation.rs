use super::workflow::Workflow;
use crate::domain::ids::{ConnectorId, PaymentInitiationId, TaskId};
use crate::domain::payment::Payment;
use crate::domain::payment_initiation::{
    AdjustmentStatus, PaymentInitiation, PaymentInitiationAdjustment, PaymentInitiationType,
};
use crate::domain::plugin::{CreatePayoutRequest, CreateTransferRequest, InitiationOutcome};
use crate::domain::workflow::OperationKind;
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};
use tracing::info;

impl Workflow {
    /// Creates a transfer or payout at the PSP for a stored initiation.
    ///
    /// The initiation moves to `PROCESSING` before the plugin is called. A
    /// synchronous answer settles it straight away; a polling id hands it
    /// over to a recurring poll; a plugin failure marks it `FAILED`.
    pub(crate) async fn run_create(
        &self,
        ctx: &WorkflowContext,
        kind: OperationKind,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        pi_id: &PaymentInitiationId,
    ) -> Result<(), EngineError> {
        self.tasks.processing(ctx, task_id, connector_id).await?;
        let outcome = self.initiate(ctx, kind, task_id, connector_id, pi_id).await;
        self.tasks.settle(ctx, task_id, connector_id, outcome).await
    }

    async fn initiate(
        &self,
        ctx: &WorkflowContext,
        kind: OperationKind,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        pi_id: &PaymentInitiationId,
    ) -> Result<Option<String>, EngineError> {
        let connector = self.connectors.get(connector_id).await?;
        let pi = self.load_payment_initiation(ctx, pi_id).await?;
        ensure_kind(&pi, kind)?;
        let psp_pi = self.psp_payment_initiation(ctx, &pi).await?;

        let now = ctx.now("processing-at").await?;
        self.add_adjustment(
            ctx,
            "adjust-processing",
            PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::Processing)
                .with_amount(pi.amount, pi.asset.clone()),
        )
        .await?;

        let plugin = &connector.plugin;
        let psp_pi = &psp_pi;
        let created = ctx
            .activity(
                &format!("plugin-create-{}", kind.as_str()),
                RetryPolicy::Unbounded,
                || async move {
                    let outcome: InitiationOutcome = match kind {
                        OperationKind::Transfer => plugin
                            .create_transfer(CreateTransferRequest {
                                payment_initiation: psp_pi.clone(),
                            })
                            .await?
                            .into(),
                        OperationKind::Payout => plugin
                            .create_payout(CreatePayoutRequest {
                                payment_initiation: psp_pi.clone(),
                            })
                            .await?
                            .into(),
                    };
                    if outcome.payment.is_none() && outcome.polling_id.is_none() {
                        return Err(ActivityError::non_retryable(
                            "plugin returned neither a payment nor a polling id",
                        ));
                    }
                    Ok(outcome)
                },
            )
            .await;

        let outcome = match created {
            Ok(outcome) => outcome,
            Err(EngineError::Activity(failure)) => {
                let now = ctx.now("failed-at").await?;
                self.add_adjustment(
                    ctx,
                    "adjust-failed",
                    PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::Failed)
                        .with_amount(pi.amount, pi.asset.clone())
                        .with_error(failure.message.clone()),
                )
                .await?;
                return Err(failure.into());
            }
            Err(err) => return Err(err),
        };

        if let Some(psp) = outcome.payment {
            let payment = Payment::from_psp(psp, connector_id);
            info!(payment_initiation = %pi.id, payment = %payment.id, status = %payment.status, "payment created");
            self.record_payment_with_status(ctx, "commit", &payment, &pi.id)
                .await?;
            return Ok(Some(payment.id.to_string()));
        }
        if let Some(polling_id) = outcome.polling_id {
            self.schedule_polling(
                ctx,
                kind,
                task_id,
                connector_id,
                connector.polling_period,
                &pi.id,
                &polling_id,
            )
            .await?;
        }
        Ok(None)
    }
}

pub(crate) fn ensure_kind(pi: &PaymentInitiation, kind: OperationKind) -> Result<(), EngineError> {
    let expected = match kind {
        OperationKind::Transfer => PaymentInitiationType::Transfer,
        OperationKind::Payout => PaymentInitiationType::Payout,
    };
    if pi.kind != expected {
        return Err(EngineError::InvalidInput(format!(
            "payment initiation {} is a {}, not a {}",
            pi.id, pi.kind, expected
        )));
    }
    Ok(())
}
