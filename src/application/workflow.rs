use super::connectors::Connectors;
use super::events::EventPublisher;
use super::ledger::AdjustmentLedger;
use super::tasks::TaskRecorder;
use super::validator::ReversalValidator;
use crate::config::EngineConfig;
use crate::domain::account::{Account, PspAccount};
use crate::domain::event::Event;
use crate::domain::ids::{AccountId, PaymentInitiationId};
use crate::domain::payment::Payment;
use crate::domain::payment_initiation::{
    PaymentInitiation, PaymentInitiationAdjustment, PaymentInitiationRelatedPayment,
    PspPaymentInitiation,
};
use crate::domain::ports::{SchedulerRef, StorageRef};
use crate::domain::reversal::PaymentInitiationReversalAdjustment;
use crate::domain::workflow::{OperationKind, WorkflowInput};
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError};

/// How a workflow run ended.
pub(crate) enum Exit {
    Completed,
    ContinueAsNew(WorkflowInput),
}

/// Shared dependencies and building blocks of every workflow. The flows
/// themselves live in sibling modules as further `impl Workflow` blocks.
pub(crate) struct Workflow {
    pub(crate) storage: StorageRef,
    pub(crate) scheduler: SchedulerRef,
    pub(crate) connectors: Connectors,
    pub(crate) ledger: AdjustmentLedger,
    pub(crate) events: EventPublisher,
    pub(crate) tasks: TaskRecorder,
    pub(crate) validator: ReversalValidator,
    pub(crate) config: EngineConfig,
}

impl Workflow {
    pub(crate) async fn dispatch(
        &self,
        ctx: &WorkflowContext,
        input: &WorkflowInput,
    ) -> Result<Exit, EngineError> {
        match input {
            WorkflowInput::CreateTransfer(req) => {
                self.run_create(
                    ctx,
                    OperationKind::Transfer,
                    &req.task_id,
                    &req.connector_id,
                    &req.payment_initiation_id,
                )
                .await?
            }
            WorkflowInput::CreatePayout(req) => {
                self.run_create(
                    ctx,
                    OperationKind::Payout,
                    &req.task_id,
                    &req.connector_id,
                    &req.payment_initiation_id,
                )
                .await?
            }
            WorkflowInput::ReverseTransfer(req) => {
                self.run_reverse(
                    ctx,
                    OperationKind::Transfer,
                    &req.task_id,
                    &req.connector_id,
                    &req.reversal_id,
                )
                .await?
            }
            WorkflowInput::ReversePayout(req) => {
                self.run_reverse(
                    ctx,
                    OperationKind::Payout,
                    &req.task_id,
                    &req.connector_id,
                    &req.reversal_id,
                )
                .await?
            }
            WorkflowInput::PollTransfer(req) => self.run_poll(ctx, req.into()).await?,
            WorkflowInput::PollPayout(req) => self.run_poll(ctx, req.into()).await?,
            WorkflowInput::TerminateSchedules(req) => {
                return self.run_terminate_schedules(ctx, req).await;
            }
        }
        Ok(Exit::Completed)
    }

    pub(crate) async fn load_payment_initiation(
        &self,
        ctx: &WorkflowContext,
        id: &PaymentInitiationId,
    ) -> Result<PaymentInitiation, EngineError> {
        ctx.activity("storage-payment-initiations-get", RetryPolicy::Unbounded, || async move {
            self.storage
                .get_payment_initiation(id)
                .await
                .map_err(ActivityError::from)
        })
        .await
    }

    async fn load_account(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        id: &AccountId,
    ) -> Result<Account, EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            self.storage.get_account(id).await.map_err(ActivityError::from)
        })
        .await
    }

    /// Resolves the accounts of `pi` into the shape plugins expect.
    pub(crate) async fn psp_payment_initiation(
        &self,
        ctx: &WorkflowContext,
        pi: &PaymentInitiation,
    ) -> Result<PspPaymentInitiation, EngineError> {
        let source = match &pi.source_account_id {
            Some(id) => Some(PspAccount::from(
                self.load_account(ctx, "storage-accounts-get-source", id).await?,
            )),
            None => None,
        };
        let destination = match &pi.destination_account_id {
            Some(id) => Some(PspAccount::from(
                self.load_account(ctx, "storage-accounts-get-destination", id).await?,
            )),
            None => None,
        };
        Ok(PspPaymentInitiation::from_payment_initiation(
            pi,
            source,
            destination,
        ))
    }

    /// Appends to the ledger, then announces the adjustment.
    pub(crate) async fn add_adjustment(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        adj: PaymentInitiationAdjustment,
    ) -> Result<(), EngineError> {
        self.ledger.append(ctx, step, &adj).await?;
        self.events
            .send(
                ctx,
                &format!("{step}-event"),
                &Event::PaymentInitiationAdjustment(adj),
            )
            .await
    }

    pub(crate) async fn add_reversal_adjustment(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        adj: PaymentInitiationReversalAdjustment,
    ) -> Result<(), EngineError> {
        self.ledger.append_reversal(ctx, step, &adj).await?;
        self.events
            .send(
                ctx,
                &format!("{step}-event"),
                &Event::PaymentInitiationReversalAdjustment(adj),
            )
            .await
    }

    /// Stores a payment produced for `pi`, links the two, and announces both.
    pub(crate) async fn record_payment(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        payment: &Payment,
        pi: &PaymentInitiationId,
    ) -> Result<(), EngineError> {
        ctx.activity(&format!("{step}-store-payment"), RetryPolicy::Unbounded, || async move {
            self.storage
                .store_payment(payment.clone())
                .await
                .map_err(ActivityError::from)
        })
        .await?;

        let link = PaymentInitiationRelatedPayment {
            payment_initiation_id: pi.clone(),
            payment_id: payment.id.clone(),
            created_at: payment.created_at,
        };
        let link_ref = &link;
        ctx.activity(&format!("{step}-link-payment"), RetryPolicy::Unbounded, || async move {
            self.storage
                .link_payment(link_ref.clone())
                .await
                .map_err(ActivityError::from)
        })
        .await?;

        self.events
            .send_all(
                ctx,
                &format!("{step}-payment-events"),
                &[
                    Event::Payment(payment.clone()),
                    Event::PaymentInitiationRelatedPayment(link),
                ],
            )
            .await
    }

    /// [`Workflow::record_payment`], then an adjustment on `pi` derived from
    /// the payment status.
    pub(crate) async fn record_payment_with_status(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        payment: &Payment,
        pi: &PaymentInitiationId,
    ) -> Result<(), EngineError> {
        self.record_payment(ctx, step, payment, pi).await?;

        let (status, error) = payment.status.adjustment();
        let now = ctx.now(&format!("{step}-at")).await?;
        let mut adj = PaymentInitiationAdjustment::new(pi.clone(), now, status)
            .with_amount(payment.amount, payment.asset.clone());
        if let Some(error) = error {
            adj = adj.with_error(error);
        }
        self.add_adjustment(ctx, &format!("{step}-adjust"), adj).await
    }
}
