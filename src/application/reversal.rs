use super::initiation::ensure_kind;
use super::workflow::Workflow;
use crate::domain::ids::{ConnectorId, PaymentInitiationReversalId, TaskId};
use crate::domain::payment::Payment;
use crate::domain::payment_initiation::{AdjustmentStatus, PaymentInitiationAdjustment};
use crate::domain::plugin::{ReversePayoutRequest, ReverseTransferRequest};
use crate::domain::reversal::{
    PaymentInitiationReversalAdjustment, PspPaymentInitiationReversal, ReversalStatus,
};
use crate::domain::workflow::OperationKind;
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};
use tracing::info;

impl Workflow {
    pub(crate) async fn run_reverse(
        &self,
        ctx: &WorkflowContext,
        kind: OperationKind,
        task_id: &TaskId,
        connector_id: &ConnectorId,
        reversal_id: &PaymentInitiationReversalId,
    ) -> Result<(), EngineError> {
        self.tasks.processing(ctx, task_id, connector_id).await?;
        let outcome = self.reverse(ctx, kind, connector_id, reversal_id).await;
        self.tasks.settle(ctx, task_id, connector_id, outcome).await
    }

    async fn reverse(
        &self,
        ctx: &WorkflowContext,
        kind: OperationKind,
        connector_id: &ConnectorId,
        reversal_id: &PaymentInitiationReversalId,
    ) -> Result<Option<String>, EngineError> {
        let connector = self.connectors.get(connector_id).await?;
        let reversal = ctx
            .activity("storage-reversals-get", RetryPolicy::Unbounded, || async move {
                self.storage
                    .get_reversal(reversal_id)
                    .await
                    .map_err(ActivityError::from)
            })
            .await?;
        let pi = self
            .load_payment_initiation(ctx, &reversal.payment_initiation_id)
            .await?;
        ensure_kind(&pi, kind)?;

        self.validator.validate(ctx, &pi, &reversal).await?;

        let now = ctx.now("reversal-processing-at").await?;
        self.add_reversal_adjustment(
            ctx,
            "reversal-processing",
            PaymentInitiationReversalAdjustment::new(
                reversal.id.clone(),
                now,
                ReversalStatus::Processing,
            ),
        )
        .await?;

        let related = self.psp_payment_initiation(ctx, &pi).await?;
        let request = PspPaymentInitiationReversal::new(&reversal, related);
        let (plugin, request) = (&connector.plugin, &request);
        let reversed = ctx
            .activity(
                &format!("plugin-reverse-{}", kind.as_str()),
                RetryPolicy::Unbounded,
                || async move {
                    let payment = match kind {
                        OperationKind::Transfer => {
                            plugin
                                .reverse_transfer(ReverseTransferRequest {
                                    payment_initiation_reversal: request.clone(),
                                })
                                .await?
                                .payment
                        }
                        OperationKind::Payout => {
                            plugin
                                .reverse_payout(ReversePayoutRequest {
                                    payment_initiation_reversal: request.clone(),
                                })
                                .await?
                                .payment
                        }
                    };
                    Ok::<_, ActivityError>(payment)
                },
            )
            .await;

        match reversed {
            Ok(psp) => {
                let payment = Payment::from_psp(psp, connector_id);
                self.record_payment(ctx, "commit", &payment, &pi.id).await?;

                let now = ctx.now("reversed-at").await?;
                self.add_adjustment(
                    ctx,
                    "adjust-reversed",
                    PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::Reversed)
                        .with_amount(reversal.amount, reversal.asset.clone())
                        .with_metadata("reversal_id", reversal.id.to_string()),
                )
                .await?;
                self.add_reversal_adjustment(
                    ctx,
                    "reversal-processed",
                    PaymentInitiationReversalAdjustment::new(
                        reversal.id.clone(),
                        now,
                        ReversalStatus::Processed,
                    ),
                )
                .await?;
                info!(payment_initiation = %pi.id, reversal = %reversal.id, amount = %reversal.amount, "reversal processed");
                Ok(Some(payment.id.to_string()))
            }
            Err(EngineError::Activity(failure)) => {
                let now = ctx.now("reverse-failed-at").await?;
                self.add_reversal_adjustment(
                    ctx,
                    "reversal-failed",
                    PaymentInitiationReversalAdjustment::new(
                        reversal.id.clone(),
                        now,
                        ReversalStatus::Failed,
                    )
                    .with_error(failure.message.clone()),
                )
                .await?;
                self.add_adjustment(
                    ctx,
                    "adjust-reverse-failed",
                    PaymentInitiationAdjustment::new(
                        pi.id.clone(),
                        now,
                        AdjustmentStatus::ReverseFailed,
                    )
                    .with_amount(reversal.amount, reversal.asset.clone())
                    .with_error(failure.message.clone()),
                )
                .await?;
                Err(failure.into())
            }
            Err(err) => Err(err),
        }
    }
}
