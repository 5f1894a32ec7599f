use crate::domain::account::Account;
use crate::domain::event::EventSent;
use crate::domain::ids::{
    AccountId, ConnectorId, PaymentId, PaymentInitiationId, PaymentInitiationReversalId, TaskId,
};
use crate::domain::page::{Cursor, Page, PageQuery};
use crate::domain::payment::Payment;
use crate::domain::payment_initiation::{
    AdjustmentId, AdjustmentStatus, PaymentInitiation, PaymentInitiationAdjustment,
    PaymentInitiationRelatedPayment,
};
use crate::domain::ports::{Storage, WorkflowJournal, WorkflowRun, WorkflowStatus};
use crate::domain::reversal::{
    PaymentInitiationReversal, PaymentInitiationReversalAdjustment, ReversalAdjustmentId,
};
use crate::domain::schedule::Schedule;
use crate::domain::task::Task;
use crate::domain::workflow::WorkflowInput;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    payment_initiations: HashMap<PaymentInitiationId, PaymentInitiation>,
    reversals: HashMap<PaymentInitiationReversalId, PaymentInitiationReversal>,
    accounts: HashMap<AccountId, Account>,
    adjustments: HashMap<PaymentInitiationId, Vec<PaymentInitiationAdjustment>>,
    adjustment_ids: HashSet<AdjustmentId>,
    reversal_adjustments: HashMap<PaymentInitiationReversalId, Vec<PaymentInitiationReversalAdjustment>>,
    reversal_adjustment_ids: HashSet<ReversalAdjustmentId>,
    payments: HashMap<PaymentId, Payment>,
    related_payments: HashMap<PaymentInitiationId, Vec<PaymentInitiationRelatedPayment>>,
    schedules: BTreeMap<String, Schedule>,
    tasks: HashMap<TaskId, Task>,
    events_sent: HashSet<String>,
    states: HashMap<String, serde_json::Value>,
}

/// Process-local storage.
///
/// All tables sit behind one `RwLock`, which also makes the conditional
/// append atomic. Adjustment logs keep insertion order, so ties on
/// `created_at` resolve to the later insert.
#[derive(Default, Clone)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn offset_of(query: &PageQuery) -> Result<usize, StorageError> {
    match &query.cursor {
        None => Ok(0),
        Some(Cursor(raw)) => raw
            .parse()
            .map_err(|_| StorageError::codec(format!("invalid cursor {raw}"))),
    }
}

fn paginate<T: Clone>(items: &[T], query: &PageQuery) -> Result<Page<T>, StorageError> {
    let offset = offset_of(query)?;
    let end = offset.saturating_add(query.page_size).min(items.len());
    let data = items.get(offset..end).map(<[T]>::to_vec).unwrap_or_default();
    let next = (end < items.len()).then(|| Cursor(end.to_string()));
    Ok(Page { data, next })
}

/// Stable sort by `created_at`, keeping insertion order for ties.
fn ordered_adjustments(log: &[PaymentInitiationAdjustment]) -> Vec<PaymentInitiationAdjustment> {
    let mut ordered = log.to_vec();
    ordered.sort_by_key(|adj| adj.created_at);
    ordered
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn store_payment_initiation(&self, pi: PaymentInitiation) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.payment_initiations.entry(pi.id.clone()).or_insert(pi);
        Ok(())
    }

    async fn get_payment_initiation(
        &self,
        id: &PaymentInitiationId,
    ) -> Result<PaymentInitiation, StorageError> {
        let tables = self.tables.read().await;
        tables
            .payment_initiations
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("payment initiation {id}")))
    }

    async fn store_reversal(&self, reversal: PaymentInitiationReversal) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.reversals.entry(reversal.id.clone()).or_insert(reversal);
        Ok(())
    }

    async fn get_reversal(
        &self,
        id: &PaymentInitiationReversalId,
    ) -> Result<PaymentInitiationReversal, StorageError> {
        let tables = self.tables.read().await;
        tables
            .reversals
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("payment initiation reversal {id}")))
    }

    async fn store_account(&self, account: Account) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StorageError> {
        let tables = self.tables.read().await;
        tables
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("account {id}")))
    }

    async fn append_adjustment(
        &self,
        adj: PaymentInitiationAdjustment,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.adjustment_ids.insert(adj.id.clone()) {
            tables
                .adjustments
                .entry(adj.payment_initiation_id().clone())
                .or_default()
                .push(adj);
        }
        Ok(())
    }

    async fn append_adjustment_if_no_conflict(
        &self,
        adj: PaymentInitiationAdjustment,
        conflicts: &[AdjustmentStatus],
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables.write().await;
        if tables.adjustment_ids.contains(&adj.id) {
            return Ok(true);
        }
        let pi = adj.payment_initiation_id().clone();
        let latest = tables
            .adjustments
            .get(&pi)
            .and_then(|log| crate::domain::payment_initiation::current_status(log));
        if latest.is_some_and(|status| conflicts.contains(&status)) {
            return Ok(false);
        }
        tables.adjustment_ids.insert(adj.id.clone());
        tables.adjustments.entry(pi).or_default().push(adj);
        Ok(true)
    }

    async fn list_adjustments(
        &self,
        pi: &PaymentInitiationId,
        status: Option<AdjustmentStatus>,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationAdjustment>, StorageError> {
        let tables = self.tables.read().await;
        let log = tables.adjustments.get(pi).map(Vec::as_slice).unwrap_or_default();
        let filtered: Vec<_> = ordered_adjustments(log)
            .into_iter()
            .filter(|adj| status.is_none_or(|status| adj.status == status))
            .collect();
        paginate(&filtered, &query)
    }

    async fn append_reversal_adjustment(
        &self,
        adj: PaymentInitiationReversalAdjustment,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if tables.reversal_adjustment_ids.insert(adj.id.clone()) {
            tables
                .reversal_adjustments
                .entry(adj.reversal_id().clone())
                .or_default()
                .push(adj);
        }
        Ok(())
    }

    async fn list_reversal_adjustments(
        &self,
        reversal: &PaymentInitiationReversalId,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationReversalAdjustment>, StorageError> {
        let tables = self.tables.read().await;
        let mut log = tables
            .reversal_adjustments
            .get(reversal)
            .cloned()
            .unwrap_or_default();
        log.sort_by_key(|adj| adj.created_at);
        paginate(&log, &query)
    }

    async fn store_payment(&self, payment: Payment) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Payment, StorageError> {
        let tables = self.tables.read().await;
        tables
            .payments
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("payment {id}")))
    }

    async fn link_payment(&self, link: PaymentInitiationRelatedPayment) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        let links = tables
            .related_payments
            .entry(link.payment_initiation_id.clone())
            .or_default();
        if !links.iter().any(|l| l.payment_id == link.payment_id) {
            links.push(link);
        }
        Ok(())
    }

    async fn list_related_payments(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Vec<PaymentInitiationRelatedPayment>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.related_payments.get(pi).cloned().unwrap_or_default())
    }

    async fn store_schedule(&self, schedule: Schedule) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.schedules.entry(schedule.id.clone()).or_insert(schedule);
        Ok(())
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.schedules.get(id).cloned())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.schedules.remove(id);
        Ok(())
    }

    async fn list_schedules(
        &self,
        connector_id: &ConnectorId,
        query: PageQuery,
    ) -> Result<Page<Schedule>, StorageError> {
        let tables = self.tables.read().await;
        let lower = match &query.cursor {
            Some(Cursor(after)) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let mut data: Vec<Schedule> = tables
            .schedules
            .range((lower, Bound::Unbounded))
            .map(|(_, schedule)| schedule)
            .filter(|schedule| &schedule.connector_id == connector_id)
            .take(query.page_size + 1)
            .cloned()
            .collect();
        let next = if data.len() > query.page_size {
            data.truncate(query.page_size);
            data.last().map(|schedule| Cursor(schedule.id.clone()))
        } else {
            None
        };
        Ok(Page { data, next })
    }

    async fn store_task(&self, task: Task) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.tasks.get(id).cloned())
    }

    async fn event_sent_exists(&self, idempotency_key: &str) -> Result<bool, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.events_sent.contains(idempotency_key))
    }

    async fn store_event_sent(&self, sent: EventSent) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.events_sent.insert(sent.idempotency_key);
        Ok(())
    }

    async fn store_state(&self, id: &str, state: serde_json::Value) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.states.insert(id.to_string(), state);
        Ok(())
    }

    async fn get_state(&self, id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.states.get(id).cloned())
    }
}

struct JournalEntry {
    run: WorkflowRun,
    steps: HashMap<String, serde_json::Value>,
}

/// Process-local workflow journal. Lost on restart, so it only provides
/// replay within one process (e.g. for tests and the in-memory CLI).
#[derive(Default, Clone)]
pub struct InMemoryJournal {
    entries: Arc<RwLock<HashMap<String, JournalEntry>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workflows the journal holds, in any status.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn step_count(&self, workflow_id: &str) -> usize {
        let entries = self.entries.read().await;
        entries.get(workflow_id).map_or(0, |entry| entry.steps.len())
    }
}

fn unknown_workflow(workflow_id: &str) -> StorageError {
    StorageError::not_found(format!("workflow {workflow_id}"))
}

#[async_trait]
impl WorkflowJournal for InMemoryJournal {
    async fn begin(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<WorkflowRun, StorageError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(workflow_id.to_string())
            .or_insert_with(|| JournalEntry {
                run: WorkflowRun {
                    workflow_id: workflow_id.to_string(),
                    run: 0,
                    input,
                    status: WorkflowStatus::Running,
                    started_at: Utc::now(),
                },
                steps: HashMap::new(),
            });
        Ok(entry.run.clone())
    }

    async fn load_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(workflow_id)
            .filter(|entry| entry.run.run == run)
            .and_then(|entry| entry.steps.get(step).cloned()))
    }

    async fn record_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
        outcome: serde_json::Value,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(workflow_id)
            .filter(|entry| entry.run.run == run)
            .ok_or_else(|| unknown_workflow(workflow_id))?;
        entry.steps.insert(step.to_string(), outcome);
        Ok(())
    }

    async fn continue_as_new(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<WorkflowRun, StorageError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(workflow_id)
            .ok_or_else(|| unknown_workflow(workflow_id))?;
        entry.steps.clear();
        entry.run.run += 1;
        entry.run.input = input;
        entry.run.status = WorkflowStatus::Running;
        entry.run.started_at = Utc::now();
        Ok(entry.run.clone())
    }

    async fn complete(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(workflow_id)
            .ok_or_else(|| unknown_workflow(workflow_id))?;
        entry.run.status = status;
        Ok(())
    }

    async fn get_run(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries.get(workflow_id).map(|entry| entry.run.clone()))
    }

    async fn forget(&self, workflow_id: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(workflow_id);
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StorageError> {
        let entries = self.entries.read().await;
        let mut running: Vec<_> = entries
            .values()
            .filter(|entry| entry.run.status == WorkflowStatus::Running)
            .map(|entry| entry.run.clone())
            .collect();
        running.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(running)
    }
}
