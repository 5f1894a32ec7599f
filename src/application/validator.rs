use super::events::EventPublisher;
use super::ledger::AdjustmentLedger;
use crate::domain::event::Event;
use crate::domain::payment_initiation::{
    AdjustmentStatus, PaymentInitiation, PaymentInitiationAdjustment,
};
use crate::domain::reversal::PaymentInitiationReversal;
use crate::durable::WorkflowContext;
use crate::error::{EngineError, ReversalRejection};
use tracing::{info, warn};

/// Statuses that block a new reversal claim when they are the latest.
const REVERSE_CONFLICTS: [AdjustmentStatus; 1] = [AdjustmentStatus::ReverseProcessing];

/// Guards reversals of a payment initiation.
///
/// Checks run in order and the first failure rejects the reversal:
///
/// 1. the initiation has at least one `PROCESSED` adjustment;
/// 2. the amount already reversed plus the requested amount does not exceed
///    the initiation amount;
/// 3. no other reversal is in flight, enforced by conditionally appending
///    `REVERSE_PROCESSING`. That append is the claim: concurrent callers race
///    on it and only one wins.
///
/// A reversal can settle between the amount check and the claim, so the
/// amount is checked again once claimed. An overshoot releases the claim with
/// `REVERSE_FAILED` and rejects the reversal.
#[derive(Clone)]
pub struct ReversalValidator {
    ledger: AdjustmentLedger,
    events: EventPublisher,
}

impl ReversalValidator {
    pub fn new(ledger: AdjustmentLedger, events: EventPublisher) -> Self {
        Self { ledger, events }
    }

    /// Returns the claiming `REVERSE_PROCESSING` adjustment on success.
    pub async fn validate(
        &self,
        ctx: &WorkflowContext,
        pi: &PaymentInitiation,
        reversal: &PaymentInitiationReversal,
    ) -> Result<PaymentInitiationAdjustment, EngineError> {
        self.ensure_processed(ctx, pi).await?;
        self.check_amount(ctx, "validate-reversed", pi, reversal).await?;
        let claimed = self.claim(ctx, pi, reversal).await?;
        match self.check_amount(ctx, "claimed-reversed", pi, reversal).await {
            Ok(()) => Ok(claimed),
            Err(err) if err.rejection().is_some() => {
                self.release(ctx, pi, reversal, &err).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn ensure_processed(
        &self,
        ctx: &WorkflowContext,
        pi: &PaymentInitiation,
    ) -> Result<(), EngineError> {
        let processed = self
            .ledger
            .has_status(ctx, "validate-processed", &pi.id, AdjustmentStatus::Processed)
            .await?;
        if !processed {
            return Err(ReversalRejection::NotProcessed(pi.id.to_string()).into());
        }
        Ok(())
    }

    async fn check_amount(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        pi: &PaymentInitiation,
        reversal: &PaymentInitiationReversal,
    ) -> Result<(), EngineError> {
        let reversed = self
            .ledger
            .sum(ctx, step, &pi.id, AdjustmentStatus::Reversed)
            .await?;
        let remaining = pi.amount.checked_sub(reversed)?;
        if remaining.checked_sub(reversal.amount)?.is_negative() {
            return Err(ReversalRejection::CannotReverseMoreThanAmount {
                remaining,
                requested: reversal.amount,
            }
            .into());
        }
        Ok(())
    }

    async fn claim(
        &self,
        ctx: &WorkflowContext,
        pi: &PaymentInitiation,
        reversal: &PaymentInitiationReversal,
    ) -> Result<PaymentInitiationAdjustment, EngineError> {
        let now = ctx.now("claim-reverse-at").await?;
        let adj = PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::ReverseProcessing)
            .with_amount(reversal.amount, reversal.asset.clone())
            .with_metadata("reversal_id", reversal.id.to_string());
        let claimed = self
            .ledger
            .append_if_no_conflict(ctx, "claim-reverse", &adj, &REVERSE_CONFLICTS)
            .await?;
        if !claimed {
            return Err(ReversalRejection::AnotherReverseInProgress(pi.id.to_string()).into());
        }
        info!(payment_initiation = %pi.id, reversal = %reversal.id, "reversal claimed");
        self.events
            .send(ctx, "claim-reverse-event", &Event::PaymentInitiationAdjustment(adj.clone()))
            .await?;
        Ok(adj)
    }

    async fn release(
        &self,
        ctx: &WorkflowContext,
        pi: &PaymentInitiation,
        reversal: &PaymentInitiationReversal,
        err: &EngineError,
    ) -> Result<(), EngineError> {
        let now = ctx.now("claim-release-at").await?;
        let adj = PaymentInitiationAdjustment::new(pi.id.clone(), now, AdjustmentStatus::ReverseFailed)
            .with_amount(reversal.amount, reversal.asset.clone())
            .with_error(err.to_string())
            .with_metadata("reversal_id", reversal.id.to_string());
        self.ledger.append(ctx, "claim-release", &adj).await?;
        warn!(payment_initiation = %pi.id, reversal = %reversal.id, "claimed reversal exceeds the remaining amount");
        self.events
            .send(ctx, "claim-release-event", &Event::PaymentInitiationAdjustment(adj))
            .await
    }
}
