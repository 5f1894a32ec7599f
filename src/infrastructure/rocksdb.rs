use crate::domain::account::Account;
use crate::domain::event::EventSent;
use crate::domain::ids::{
    AccountId, ConnectorId, PaymentId, PaymentInitiationId, PaymentInitiationReversalId, TaskId,
};
use crate::domain::page::{Cursor, Page, PageQuery};
use crate::domain::payment::Payment;
use crate::domain::payment_initiation::{
    AdjustmentStatus, PaymentInitiation, PaymentInitiationAdjustment,
    PaymentInitiationRelatedPayment,
};
use crate::domain::ports::{Storage, WorkflowJournal, WorkflowRun, WorkflowStatus};
use crate::domain::reversal::{PaymentInitiationReversal, PaymentInitiationReversalAdjustment};
use crate::domain::schedule::Schedule;
use crate::domain::task::Task;
use crate::domain::workflow::WorkflowInput;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const CF_PAYMENT_INITIATIONS: &str = "payment_initiations";
pub const CF_REVERSALS: &str = "reversals";
pub const CF_ACCOUNTS: &str = "accounts";
pub const CF_ADJUSTMENTS: &str = "adjustments";
pub const CF_REVERSAL_ADJUSTMENTS: &str = "reversal_adjustments";
pub const CF_PAYMENTS: &str = "payments";
pub const CF_RELATED_PAYMENTS: &str = "related_payments";
pub const CF_SCHEDULES: &str = "schedules";
pub const CF_TASKS: &str = "tasks";
pub const CF_EVENTS_SENT: &str = "events_sent";
pub const CF_STATES: &str = "states";
/// Workflow runs, keyed by workflow id.
pub const CF_WORKFLOWS: &str = "workflows";
/// Journaled step outcomes, keyed by workflow id, run and step name.
pub const CF_STEPS: &str = "workflow_steps";

const COLUMN_FAMILIES: [&str; 13] = [
    CF_PAYMENT_INITIATIONS,
    CF_REVERSALS,
    CF_ACCOUNTS,
    CF_ADJUSTMENTS,
    CF_REVERSAL_ADJUSTMENTS,
    CF_PAYMENTS,
    CF_RELATED_PAYMENTS,
    CF_SCHEDULES,
    CF_TASKS,
    CF_EVENTS_SENT,
    CF_STATES,
    CF_WORKFLOWS,
    CF_STEPS,
];

const SEP: u8 = 0;

/// A persistent store and workflow journal on RocksDB.
///
/// Each entity lives in its own column family with JSON values. Log-like
/// tables (adjustments, related payments, journal steps) use composite keys
/// `owner \0 suffix` so that a prefix scan returns one owner's rows in key
/// order. Adjustment suffixes are the big-endian `created_at` nanos with the
/// sign bit flipped, then the status code, so byte order is time order.
///
/// Check-then-write operations hold `write_guard`; RocksDB itself only
/// orders single writes. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    write_guard: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(backend)?;

        Ok(Self {
            db: Arc::new(db),
            write_guard: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Backend(format!("column family {name} not found")))
    }

    fn put<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(StorageError::codec)?;
        self.db.put_cf(self.cf(cf)?, key, bytes).map_err(backend)
    }

    fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.db.get_pinned_cf(self.cf(cf)?, key).map_err(backend)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(StorageError::codec),
            None => Ok(None),
        }
    }

    fn exists(&self, cf: &str, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.db.get_pinned_cf(self.cf(cf)?, key).map_err(backend)?.is_some())
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete_cf(self.cf(cf)?, key).map_err(backend)
    }

    /// Keys and decoded values under `prefix`, starting at `from` (inclusive)
    /// when given.
    fn scan<T: DeserializeOwned>(
        &self,
        cf: &str,
        prefix: &[u8],
        from: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, T)>, StorageError> {
        let start = from.unwrap_or(prefix);
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(start, Direction::Forward));
        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(backend)?;
            if !key.starts_with(prefix) {
                break;
            }
            let decoded = serde_json::from_slice(&value).map_err(StorageError::codec)?;
            rows.push((key.to_vec(), decoded));
        }
        Ok(rows)
    }

    /// One keyset page of `scan`, resuming strictly after the cursor key.
    fn scan_page<T: DeserializeOwned>(
        &self,
        cf: &str,
        prefix: &[u8],
        query: &PageQuery,
        keep: impl Fn(&T) -> bool,
    ) -> Result<Page<T>, StorageError> {
        let after = query.cursor.as_ref().map(decode_cursor).transpose()?;
        let mut rows: Vec<(Vec<u8>, T)> = self
            .scan(cf, prefix, after.as_deref())?
            .into_iter()
            .filter(|(key, _)| after.as_deref() != Some(key.as_slice()))
            .filter(|(_, value)| keep(value))
            .take(query.page_size + 1)
            .collect();
        let next = if rows.len() > query.page_size {
            rows.truncate(query.page_size);
            rows.last().map(|(key, _)| encode_cursor(key))
        } else {
            None
        };
        Ok(Page {
            data: rows.into_iter().map(|(_, value)| value).collect(),
            next,
        })
    }
}

fn backend(err: rocksdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn encode_cursor(key: &[u8]) -> Cursor {
    let mut hex = String::with_capacity(key.len() * 2);
    for byte in key {
        let _ = write!(hex, "{byte:02x}");
    }
    Cursor(hex)
}

fn decode_cursor(cursor: &Cursor) -> Result<Vec<u8>, StorageError> {
    let raw = cursor.0.as_bytes();
    if raw.len() % 2 != 0 {
        return Err(StorageError::codec(format!("invalid cursor {}", cursor.0)));
    }
    raw.chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or_else(|| StorageError::codec(format!("invalid cursor {}", cursor.0)))
        })
        .collect()
}

fn prefix(owner: impl std::fmt::Display) -> Vec<u8> {
    let mut key = owner.to_string().into_bytes();
    key.push(SEP);
    key
}

fn time_key(owner: impl std::fmt::Display, at: DateTime<Utc>, code: u8) -> Vec<u8> {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1_000));
    let mut key = prefix(owner);
    key.extend_from_slice(&((nanos as u64) ^ (1 << 63)).to_be_bytes());
    key.push(code);
    key
}

fn adjustment_key(adj: &PaymentInitiationAdjustment) -> Vec<u8> {
    time_key(adj.payment_initiation_id(), adj.created_at, adj.status.code())
}

fn step_key(workflow_id: &str, run: u32, step: &str) -> Vec<u8> {
    let mut key = step_prefix(workflow_id);
    key.extend_from_slice(&run.to_be_bytes());
    key.push(SEP);
    key.extend_from_slice(step.as_bytes());
    key
}

fn step_prefix(workflow_id: &str) -> Vec<u8> {
    prefix(workflow_id)
}

#[async_trait]
impl Storage for RocksDbStore {
    async fn store_payment_initiation(&self, pi: PaymentInitiation) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let key = pi.id.to_string();
        if !self.exists(CF_PAYMENT_INITIATIONS, key.as_bytes())? {
            self.put(CF_PAYMENT_INITIATIONS, key.as_bytes(), &pi)?;
        }
        Ok(())
    }

    async fn get_payment_initiation(
        &self,
        id: &PaymentInitiationId,
    ) -> Result<PaymentInitiation, StorageError> {
        self.get(CF_PAYMENT_INITIATIONS, id.to_string().as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("payment initiation {id}")))
    }

    async fn store_reversal(&self, reversal: PaymentInitiationReversal) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let key = reversal.id.to_string();
        if !self.exists(CF_REVERSALS, key.as_bytes())? {
            self.put(CF_REVERSALS, key.as_bytes(), &reversal)?;
        }
        Ok(())
    }

    async fn get_reversal(
        &self,
        id: &PaymentInitiationReversalId,
    ) -> Result<PaymentInitiationReversal, StorageError> {
        self.get(CF_REVERSALS, id.to_string().as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("payment initiation reversal {id}")))
    }

    async fn store_account(&self, account: Account) -> Result<(), StorageError> {
        self.put(CF_ACCOUNTS, account.id.to_string().as_bytes(), &account)
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StorageError> {
        self.get(CF_ACCOUNTS, id.to_string().as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("account {id}")))
    }

    async fn append_adjustment(
        &self,
        adj: PaymentInitiationAdjustment,
    ) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let key = adjustment_key(&adj);
        if !self.exists(CF_ADJUSTMENTS, &key)? {
            self.put(CF_ADJUSTMENTS, &key, &adj)?;
        }
        Ok(())
    }

    async fn append_adjustment_if_no_conflict(
        &self,
        adj: PaymentInitiationAdjustment,
        conflicts: &[AdjustmentStatus],
    ) -> Result<bool, StorageError> {
        let _guard = self.write_guard.lock().await;
        let key = adjustment_key(&adj);
        if self.exists(CF_ADJUSTMENTS, &key)? {
            return Ok(true);
        }
        let latest = self
            .scan::<PaymentInitiationAdjustment>(
                CF_ADJUSTMENTS,
                &prefix(adj.payment_initiation_id()),
                None,
            )?
            .pop()
            .map(|(_, latest)| latest.status);
        if latest.is_some_and(|status| conflicts.contains(&status)) {
            return Ok(false);
        }
        self.put(CF_ADJUSTMENTS, &key, &adj)?;
        Ok(true)
    }

    async fn list_adjustments(
        &self,
        pi: &PaymentInitiationId,
        status: Option<AdjustmentStatus>,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationAdjustment>, StorageError> {
        self.scan_page(CF_ADJUSTMENTS, &prefix(pi), &query, |adj: &PaymentInitiationAdjustment| {
            status.is_none_or(|status| adj.status == status)
        })
    }

    async fn append_reversal_adjustment(
        &self,
        adj: PaymentInitiationReversalAdjustment,
    ) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let key = time_key(adj.reversal_id(), adj.created_at, adj.status.code());
        if !self.exists(CF_REVERSAL_ADJUSTMENTS, &key)? {
            self.put(CF_REVERSAL_ADJUSTMENTS, &key, &adj)?;
        }
        Ok(())
    }

    async fn list_reversal_adjustments(
        &self,
        reversal: &PaymentInitiationReversalId,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationReversalAdjustment>, StorageError> {
        self.scan_page(CF_REVERSAL_ADJUSTMENTS, &prefix(reversal), &query, |_| true)
    }

    async fn store_payment(&self, payment: Payment) -> Result<(), StorageError> {
        self.put(CF_PAYMENTS, payment.id.to_string().as_bytes(), &payment)
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Payment, StorageError> {
        self.get(CF_PAYMENTS, id.to_string().as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("payment {id}")))
    }

    async fn link_payment(&self, link: PaymentInitiationRelatedPayment) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let mut key = prefix(&link.payment_initiation_id);
        key.extend_from_slice(link.payment_id.to_string().as_bytes());
        if !self.exists(CF_RELATED_PAYMENTS, &key)? {
            self.put(CF_RELATED_PAYMENTS, &key, &link)?;
        }
        Ok(())
    }

    async fn list_related_payments(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Vec<PaymentInitiationRelatedPayment>, StorageError> {
        let mut links: Vec<PaymentInitiationRelatedPayment> = self
            .scan(CF_RELATED_PAYMENTS, &prefix(pi), None)?
            .into_iter()
            .map(|(_, link)| link)
            .collect();
        links.sort_by_key(|link: &PaymentInitiationRelatedPayment| link.created_at);
        Ok(links)
    }

    async fn store_schedule(&self, schedule: Schedule) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        if !self.exists(CF_SCHEDULES, schedule.id.as_bytes())? {
            self.put(CF_SCHEDULES, schedule.id.as_bytes(), &schedule)?;
        }
        Ok(())
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StorageError> {
        self.get(CF_SCHEDULES, id.as_bytes())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        self.delete(CF_SCHEDULES, id.as_bytes())
    }

    async fn list_schedules(
        &self,
        connector_id: &ConnectorId,
        query: PageQuery,
    ) -> Result<Page<Schedule>, StorageError> {
        self.scan_page(CF_SCHEDULES, &[], &query, |schedule: &Schedule| {
            &schedule.connector_id == connector_id
        })
    }

    async fn store_task(&self, task: Task) -> Result<(), StorageError> {
        self.put(CF_TASKS, task.id.to_string().as_bytes(), &task)
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        self.get(CF_TASKS, id.to_string().as_bytes())
    }

    async fn event_sent_exists(&self, idempotency_key: &str) -> Result<bool, StorageError> {
        self.exists(CF_EVENTS_SENT, idempotency_key.as_bytes())
    }

    async fn store_event_sent(&self, sent: EventSent) -> Result<(), StorageError> {
        self.put(CF_EVENTS_SENT, sent.idempotency_key.as_bytes(), &sent)
    }

    async fn store_state(&self, id: &str, state: serde_json::Value) -> Result<(), StorageError> {
        self.put(CF_STATES, id.as_bytes(), &state)
    }

    async fn get_state(&self, id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        self.get(CF_STATES, id.as_bytes())
    }
}

#[async_trait]
impl WorkflowJournal for RocksDbStore {
    async fn begin(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<WorkflowRun, StorageError> {
        let _guard = self.write_guard.lock().await;
        if let Some(run) = self.get(CF_WORKFLOWS, workflow_id.as_bytes())? {
            return Ok(run);
        }
        let run = WorkflowRun {
            workflow_id: workflow_id.to_string(),
            run: 0,
            input,
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
        };
        self.put(CF_WORKFLOWS, workflow_id.as_bytes(), &run)?;
        Ok(run)
    }

    async fn load_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        self.get(CF_STEPS, &step_key(workflow_id, run, step))
    }

    async fn record_step(
        &self,
        workflow_id: &str,
        run: u32,
        step: &str,
        outcome: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.put(CF_STEPS, &step_key(workflow_id, run, step), &outcome)
    }

    async fn continue_as_new(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<WorkflowRun, StorageError> {
        let _guard = self.write_guard.lock().await;
        let mut run: WorkflowRun = self
            .get(CF_WORKFLOWS, workflow_id.as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("workflow {workflow_id}")))?;
        run.run += 1;
        run.input = input;
        run.status = WorkflowStatus::Running;
        run.started_at = Utc::now();

        let steps = self.cf(CF_STEPS)?;
        let mut batch = WriteBatch::default();
        for (key, _) in self.scan::<serde_json::Value>(CF_STEPS, &step_prefix(workflow_id), None)? {
            batch.delete_cf(steps, key);
        }
        let bytes = serde_json::to_vec(&run).map_err(StorageError::codec)?;
        batch.put_cf(self.cf(CF_WORKFLOWS)?, workflow_id.as_bytes(), bytes);
        self.db.write(batch).map_err(backend)?;
        Ok(run)
    }

    async fn complete(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
    ) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let mut run: WorkflowRun = self
            .get(CF_WORKFLOWS, workflow_id.as_bytes())?
            .ok_or_else(|| StorageError::not_found(format!("workflow {workflow_id}")))?;
        run.status = status;
        self.put(CF_WORKFLOWS, workflow_id.as_bytes(), &run)
    }

    async fn get_run(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, StorageError> {
        self.get(CF_WORKFLOWS, workflow_id.as_bytes())
    }

    async fn forget(&self, workflow_id: &str) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let steps = self.cf(CF_STEPS)?;
        let mut batch = WriteBatch::default();
        for (key, _) in self.scan::<serde_json::Value>(CF_STEPS, &step_prefix(workflow_id), None)? {
            batch.delete_cf(steps, key);
        }
        batch.delete_cf(self.cf(CF_WORKFLOWS)?, workflow_id.as_bytes());
        self.db.write(batch).map_err(backend)
    }

    async fn list_running(&self) -> Result<Vec<WorkflowRun>, StorageError> {
        let mut running: Vec<WorkflowRun> = self
            .scan(CF_WORKFLOWS, &[], None)?
            .into_iter()
            .map(|(_, run)| run)
            .filter(|run: &WorkflowRun| run.status == WorkflowStatus::Running)
            .collect();
        running.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(running)
    }
}
