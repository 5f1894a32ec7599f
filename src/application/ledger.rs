use crate::domain::amount::Amount;
use crate::domain::ids::PaymentInitiationId;
use crate::domain::page::{Cursor, PageQuery};
use crate::domain::payment_initiation::{
    AdjustmentStatus, PaymentInitiationAdjustment, current_status,
};
use crate::domain::ports::StorageRef;
use crate::domain::reversal::PaymentInitiationReversalAdjustment;
use crate::durable::{RetryPolicy, WorkflowContext};
use crate::error::{ActivityError, EngineError, StorageError};

/// Append-only ledger of payment initiation adjustments.
///
/// Writes and reads made from a workflow go through the context, so they are
/// retried without bound and replayed from the journal.
#[derive(Clone)]
pub struct AdjustmentLedger {
    storage: StorageRef,
    page_size: usize,
}

impl AdjustmentLedger {
    pub fn new(storage: StorageRef, page_size: usize) -> Self {
        Self {
            storage,
            page_size: page_size.max(1),
        }
    }

    pub async fn append(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        adj: &PaymentInitiationAdjustment,
    ) -> Result<(), EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            self.storage
                .append_adjustment(adj.clone())
                .await
                .map_err(ActivityError::from)
        })
        .await
    }

    /// Appends `adj` unless the latest adjustment of its initiation has one
    /// of the `conflicts` statuses. Returns whether it was appended.
    pub async fn append_if_no_conflict(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        adj: &PaymentInitiationAdjustment,
        conflicts: &[AdjustmentStatus],
    ) -> Result<bool, EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            self.storage
                .append_adjustment_if_no_conflict(adj.clone(), conflicts)
                .await
                .map_err(ActivityError::from)
        })
        .await
    }

    /// Whether any adjustment of `pi` has `status`.
    pub async fn has_status(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        pi: &PaymentInitiationId,
        status: AdjustmentStatus,
    ) -> Result<bool, EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            let page = self
                .storage
                .list_adjustments(pi, Some(status), PageQuery::first(1))
                .await?;
            Ok::<_, ActivityError>(!page.data.is_empty())
        })
        .await
    }

    /// Sum of the amounts of every adjustment of `pi` with `status`, read
    /// page by page. Adjustments without an amount count as zero.
    pub async fn sum(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        pi: &PaymentInitiationId,
        status: AdjustmentStatus,
    ) -> Result<Amount, EngineError> {
        let mut total = Amount::ZERO;
        let mut cursor: Option<Cursor> = None;
        let mut page = 0usize;
        loop {
            let query = PageQuery {
                page_size: self.page_size,
                cursor: cursor.take(),
            };
            let query = &query;
            let (subtotal, next): (Amount, Option<Cursor>) = ctx
                .activity(&format!("{step}-{page}"), RetryPolicy::Unbounded, || async move {
                    let page = self
                        .storage
                        .list_adjustments(pi, Some(status), query.clone())
                        .await?;
                    let subtotal = page
                        .data
                        .iter()
                        .filter_map(|adj| adj.amount)
                        .try_fold(Amount::ZERO, Amount::checked_add)
                        .map_err(|e| ActivityError::non_retryable(e.to_string()))?;
                    Ok::<_, ActivityError>((subtotal, page.next))
                })
                .await?;
            total = total.checked_add(subtotal)?;
            match next {
                Some(next) => {
                    cursor = Some(next);
                    page += 1;
                }
                None => return Ok(total),
            }
        }
    }

    pub async fn append_reversal(
        &self,
        ctx: &WorkflowContext,
        step: &str,
        adj: &PaymentInitiationReversalAdjustment,
    ) -> Result<(), EngineError> {
        ctx.activity(step, RetryPolicy::Unbounded, || async move {
            self.storage
                .append_reversal_adjustment(adj.clone())
                .await
                .map_err(ActivityError::from)
        })
        .await
    }

    /// Full adjustment log of `pi`, outside of any workflow.
    pub async fn history(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Vec<PaymentInitiationAdjustment>, StorageError> {
        let mut log = Vec::new();
        let mut query = PageQuery::first(self.page_size);
        loop {
            let page = self.storage.list_adjustments(pi, None, query.clone()).await?;
            log.extend(page.data);
            match page.next {
                Some(next) => query = PageQuery::after(self.page_size, next),
                None => return Ok(log),
            }
        }
    }

    pub async fn current_status(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Option<AdjustmentStatus>, StorageError> {
        Ok(current_status(&self.history(pi).await?))
    }
}
