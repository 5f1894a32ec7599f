use super::account::Account;
use super::event::{Event, EventSent};
use super::ids::{
    AccountId, ConnectorId, PaymentId, PaymentInitiationId, PaymentInitiationReversalId, TaskId,
};
use super::page::{Page, PageQuery};
use super::payment::Payment;
use super::payment_initiation::{
    AdjustmentStatus, PaymentInitiation, PaymentInitiationAdjustment,
    PaymentInitiationRelatedPayment,
};
use super::plugin::*;
use super::reversal::{PaymentInitiationReversal, PaymentInitiationReversalAdjustment};
use super::schedule::Schedule;
use super::task::Task;
use super::workflow::WorkflowInput;
use crate::error::{PluginError, SchedulerError, SinkError, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Persistent state of the engine. Every write is idempotent on its natural
/// key so that retried or replayed activities never duplicate rows.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn store_payment_initiation(&self, pi: PaymentInitiation) -> Result<(), StorageError>;
    async fn get_payment_initiation(
        &self,
        id: &PaymentInitiationId,
    ) -> Result<PaymentInitiation, StorageError>;

    async fn store_reversal(&self, reversal: PaymentInitiationReversal) -> Result<(), StorageError>;
    async fn get_reversal(
        &self,
        id: &PaymentInitiationReversalId,
    ) -> Result<PaymentInitiationReversal, StorageError>;

    async fn store_account(&self, account: Account) -> Result<(), StorageError>;
    async fn get_account(&self, id: &AccountId) -> Result<Account, StorageError>;

    /// Unconditional append. A second append with the same
    /// `(payment initiation, created_at, status)` is a no-op.
    async fn append_adjustment(&self, adj: PaymentInitiationAdjustment)
    -> Result<(), StorageError>;

    /// Appends `adj` only if the latest adjustment of its initiation does not
    /// have one of `conflicts`. Returns whether the row was inserted. Must be
    /// atomic with respect to concurrent callers on the same initiation.
    async fn append_adjustment_if_no_conflict(
        &self,
        adj: PaymentInitiationAdjustment,
        conflicts: &[AdjustmentStatus],
    ) -> Result<bool, StorageError>;

    /// Adjustments of one initiation in `(created_at, insertion)` order,
    /// optionally filtered by status.
    async fn list_adjustments(
        &self,
        pi: &PaymentInitiationId,
        status: Option<AdjustmentStatus>,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationAdjustment>, StorageError>;

    async fn append_reversal_adjustment(
        &self,
        adj: PaymentInitiationReversalAdjustment,
    ) -> Result<(), StorageError>;
    async fn list_reversal_adjustments(
        &self,
        reversal: &PaymentInitiationReversalId,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationReversalAdjustment>, StorageError>;

    async fn store_payment(&self, payment: Payment) -> Result<(), StorageError>;
    async fn get_payment(&self, id: &PaymentId) -> Result<Payment, StorageError>;
    async fn link_payment(&self, link: PaymentInitiationRelatedPayment) -> Result<(), StorageError>;
    async fn list_related_payments(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Vec<PaymentInitiationRelatedPayment>, StorageError>;

    async fn store_schedule(&self, schedule: Schedule) -> Result<(), StorageError>;
    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StorageError>;
    /// Deleting a missing schedule succeeds.
    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError>;
    /// Keyset-paginated by schedule id, so deleting listed rows between pages
    /// does not shift later pages.
    async fn list_schedules(
        &self,
        connector_id: &ConnectorId,
        query: PageQuery,
    ) -> Result<Page<Schedule>, StorageError>;

    async fn store_task(&self, task: Task) -> Result<(), StorageError>;
    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    async fn event_sent_exists(&self, idempotency_key: &str) -> Result<bool, StorageError>;
    async fn store_event_sent(&self, sent: EventSent) -> Result<(), StorageError>;

    async fn store_state(&self, id: &str, state: serde_json::Value) -> Result<(), StorageError>;
    async fn get_state(&self, id: &str) -> Result<Option<serde_json::Value>, StorageError>;
}

/// A PSP integration. Only the calls the engine drives are listed; payout
/// support is optional.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn create_transfer(
        &self,
        req: CreateTransferRequest,
    ) -> Result<CreateTransferResponse, PluginError>;

    async fn reverse_transfer(
        &self,
        req: ReverseTransferRequest,
    ) -> Result<ReverseTransferResponse, PluginError>;

    async fn poll_transfer_status(
        &self,
        req: PollTransferStatusRequest,
    ) -> Result<PollTransferStatusResponse, PluginError>;

    async fn create_payout(
        &self,
        _req: CreatePayoutRequest,
    ) -> Result<CreatePayoutResponse, PluginError> {
        Err(PluginError::Unsupported("create_payout".into()))
    }

    async fn reverse_payout(
        &self,
        _req: ReversePayoutRequest,
    ) -> Result<ReversePayoutResponse, PluginError> {
        Err(PluginError::Unsupported("reverse_payout".into()))
    }

    async fn poll_payout_status(
        &self,
        _req: PollPayoutStatusRequest,
    ) -> Result<PollPayoutStatusResponse, PluginError> {
        Err(PluginError::Unsupported("poll_payout_status".into()))
    }
}

/// Registers recurring triggers that start a workflow every `every`,
/// starting immediately. Overlapping firings are skipped.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn create_recurring_trigger(
        &self,
        schedule_id: &str,
        input: WorkflowInput,
        every: Duration,
    ) -> Result<(), SchedulerError>;

    async fn delete_recurring_trigger(&self, schedule_id: &str) -> Result<(), SchedulerError>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// One run of a workflow. `continue_as_new` starts the next run under the
/// same workflow id with a fresh history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run: u32,
    pub input: WorkflowInput,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
}

/// Durable record of workflow step outcomes, keyed by (workflow id, run,
/// step name). Step values are opaque JSON.
#[async_trait]
pub trait WorkflowJournal: Send + Sync {
    /// Returns the current run of `workflow_id`, creating run 0 with `input`
    /// if the workflow has never been seen.
    async fn begin(&self, workflow_id: &str, input: WorkflowInput)
    -> Result<WorkflowRun, StorageError>;

    async fn load_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
    ) -> Result<Option<serde_json::Value>, StorageError>;

    async fn record_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
        outcome: serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Drops the history of the current run and starts the next one.
    async fn continue_as_new(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<WorkflowRun, StorageError>;

    async fn complete(&self, workflow_id: &str, status: WorkflowStatus)
    -> Result<(), StorageError>;

    async fn get_run(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, StorageError>;

    /// Drops a workflow and all of its history. Unknown ids are a no-op.
    async fn forget(&self, workflow_id: &str) -> Result<(), StorageError>;

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StorageError>;
}

pub type StorageRef = Arc<dyn Storage>;
pub type PluginRef = Arc<dyn Plugin>;
pub type SchedulerRef = Arc<dyn Scheduler>;
pub type EventSinkRef = Arc<dyn EventSink>;
pub type JournalRef = Arc<dyn WorkflowJournal>;
