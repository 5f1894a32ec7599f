#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use pi_engine::application::Engine;
use pi_engine::config::EngineConfig;
use pi_engine::domain::account::Account;
use pi_engine::domain::amount::Amount;
use pi_engine::domain::event::{Event, EventSent};
use pi_engine::domain::ids::{
    AccountId, ConnectorId, PaymentId, PaymentInitiationId, PaymentInitiationReversalId, TaskId,
};
use pi_engine::domain::page::{Page, PageQuery};
use pi_engine::domain::payment::{Payment, PaymentStatus, PaymentType, PspPayment};
use pi_engine::domain::payment_initiation::{
    AdjustmentStatus, Metadata, PaymentInitiation, PaymentInitiationAdjustment,
    PaymentInitiationRelatedPayment, PaymentInitiationType, PspPaymentInitiation,
};
use pi_engine::domain::plugin::*;
use pi_engine::domain::ports::{Plugin, Storage};
use pi_engine::domain::reversal::{
    PaymentInitiationReversal, PaymentInitiationReversalAdjustment, PspPaymentInitiationReversal,
};
use pi_engine::domain::schedule::Schedule;
use pi_engine::domain::task::{Task, TaskStatus};
use pi_engine::domain::workflow::{CreatePayout, CreateTransfer, ReversePayout, ReverseTransfer, Trigger};
use pi_engine::error::{PluginError, StorageError};
use pi_engine::infrastructure::events::RecordingEventSink;
use pi_engine::infrastructure::in_memory::{InMemoryJournal, InMemoryStorage};
use pi_engine::infrastructure::scheduler::TokioScheduler;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc, oneshot};

pub const CONNECTOR: &str = "sandbox";
pub const ASSET: &str = "EUR/2";

/// What a scripted plugin call does.
pub enum Script<T> {
    Respond(T),
    Fail(PluginError),
    /// Never completes.
    Hang,
}

/// A plugin whose answers are queued by the test. With an empty queue it
/// settles creations synchronously, refunds reversals in full and reports
/// polls as pending.
#[derive(Default)]
pub struct ScriptedPlugin {
    creates: Mutex<VecDeque<Script<InitiationOutcome>>>,
    reverses: Mutex<VecDeque<Script<PspPayment>>>,
    polls: Mutex<VecDeque<Script<PollOutcome>>>,
    create_calls: AtomicUsize,
    reverse_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_create(&self, script: Script<InitiationOutcome>) {
        self.creates.lock().await.push_back(script);
    }

    pub async fn on_reverse(&self, script: Script<PspPayment>) {
        self.reverses.lock().await.push_back(script);
    }

    pub async fn on_poll(&self, script: Script<PollOutcome>) {
        self.polls.lock().await.push_back(script);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn reverse_calls(&self) -> usize {
        self.reverse_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    async fn play<T>(queue: &Mutex<VecDeque<Script<T>>>, default: T) -> Result<T, PluginError> {
        let next = queue.lock().await.pop_front();
        match next {
            None => Ok(default),
            Some(Script::Respond(value)) => Ok(value),
            Some(Script::Fail(err)) => Err(err),
            Some(Script::Hang) => std::future::pending().await,
        }
    }

    async fn create(
        &self,
        pi: &PspPaymentInitiation,
        kind: PaymentType,
    ) -> Result<InitiationOutcome, PluginError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut payment = psp_payment(&pi.reference, PaymentStatus::Succeeded, pi.amount);
        payment.kind = kind;
        let settled = InitiationOutcome {
            payment: Some(payment),
            polling_id: None,
        };
        Self::play(&self.creates, settled).await
    }

    async fn reverse(&self, reversal: &PspPaymentInitiationReversal) -> Result<PspPayment, PluginError> {
        self.reverse_calls.fetch_add(1, Ordering::SeqCst);
        let refunded = psp_payment(&reversal.reference, PaymentStatus::Refunded, reversal.amount);
        Self::play(&self.reverses, refunded).await
    }

    async fn poll(&self) -> Result<PollOutcome, PluginError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Self::play(&self.polls, PollOutcome::default()).await
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    async fn create_transfer(
        &self,
        req: CreateTransferRequest,
    ) -> Result<CreateTransferResponse, PluginError> {
        let outcome = self.create(&req.payment_initiation, PaymentType::Transfer).await?;
        Ok(CreateTransferResponse {
            payment: outcome.payment,
            polling_transfer_id: outcome.polling_id,
        })
    }

    async fn reverse_transfer(
        &self,
        req: ReverseTransferRequest,
    ) -> Result<ReverseTransferResponse, PluginError> {
        let payment = self.reverse(&req.payment_initiation_reversal).await?;
        Ok(ReverseTransferResponse { payment })
    }

    async fn poll_transfer_status(
        &self,
        _req: PollTransferStatusRequest,
    ) -> Result<PollTransferStatusResponse, PluginError> {
        let outcome = self.poll().await?;
        Ok(PollTransferStatusResponse {
            payment: outcome.payment,
            error: outcome.error,
        })
    }

    async fn create_payout(
        &self,
        req: CreatePayoutRequest,
    ) -> Result<CreatePayoutResponse, PluginError> {
        let outcome = self.create(&req.payment_initiation, PaymentType::Payout).await?;
        Ok(CreatePayoutResponse {
            payment: outcome.payment,
            polling_payout_id: outcome.polling_id,
        })
    }

    async fn reverse_payout(
        &self,
        req: ReversePayoutRequest,
    ) -> Result<ReversePayoutResponse, PluginError> {
        let payment = self.reverse(&req.payment_initiation_reversal).await?;
        Ok(ReversePayoutResponse { payment })
    }

    async fn poll_payout_status(
        &self,
        _req: PollPayoutStatusRequest,
    ) -> Result<PollPayoutStatusResponse, PluginError> {
        let outcome = self.poll().await?;
        Ok(PollPayoutStatusResponse {
            payment: outcome.payment,
            error: outcome.error,
        })
    }
}

/// In-memory storage that can reject task outcome writes or park a
/// conditional append.
#[derive(Default)]
pub struct FaultyStorage {
    inner: InMemoryStorage,
    reject_task_outcomes: AtomicBool,
    held_claim: Mutex<Option<oneshot::Receiver<()>>>,
    claim_arrived: Notify,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_task_outcomes(&self) {
        self.reject_task_outcomes.store(true, Ordering::SeqCst);
    }

    /// Parks the next conditional append until the returned sender fires.
    pub async fn hold_next_claim(&self) -> oneshot::Sender<()> {
        let (release, held) = oneshot::channel();
        *self.held_claim.lock().await = Some(held);
        release
    }

    /// Resolves once a held conditional append is parked.
    pub async fn claim_held(&self) {
        self.claim_arrived.notified().await;
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn store_payment_initiation(&self, pi: PaymentInitiation) -> Result<(), StorageError> {
        self.inner.store_payment_initiation(pi).await
    }

    async fn get_payment_initiation(
        &self,
        id: &PaymentInitiationId,
    ) -> Result<PaymentInitiation, StorageError> {
        self.inner.get_payment_initiation(id).await
    }

    async fn store_reversal(&self, reversal: PaymentInitiationReversal) -> Result<(), StorageError> {
        self.inner.store_reversal(reversal).await
    }

    async fn get_reversal(
        &self,
        id: &PaymentInitiationReversalId,
    ) -> Result<PaymentInitiationReversal, StorageError> {
        self.inner.get_reversal(id).await
    }

    async fn store_account(&self, account: Account) -> Result<(), StorageError> {
        self.inner.store_account(account).await
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StorageError> {
        self.inner.get_account(id).await
    }

    async fn append_adjustment(
        &self,
        adj: PaymentInitiationAdjustment,
    ) -> Result<(), StorageError> {
        self.inner.append_adjustment(adj).await
    }

    async fn append_adjustment_if_no_conflict(
        &self,
        adj: PaymentInitiationAdjustment,
        conflicts: &[AdjustmentStatus],
    ) -> Result<bool, StorageError> {
        let held = self.held_claim.lock().await.take();
        if let Some(held) = held {
            self.claim_arrived.notify_one();
            let _ = held.await;
        }
        self.inner.append_adjustment_if_no_conflict(adj, conflicts).await
    }

    async fn list_adjustments(
        &self,
        pi: &PaymentInitiationId,
        status: Option<AdjustmentStatus>,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationAdjustment>, StorageError> {
        self.inner.list_adjustments(pi, status, query).await
    }

    async fn append_reversal_adjustment(
        &self,
        adj: PaymentInitiationReversalAdjustment,
    ) -> Result<(), StorageError> {
        self.inner.append_reversal_adjustment(adj).await
    }

    async fn list_reversal_adjustments(
        &self,
        reversal: &PaymentInitiationReversalId,
        query: PageQuery,
    ) -> Result<Page<PaymentInitiationReversalAdjustment>, StorageError> {
        self.inner.list_reversal_adjustments(reversal, query).await
    }

    async fn store_payment(&self, payment: Payment) -> Result<(), StorageError> {
        self.inner.store_payment(payment).await
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<Payment, StorageError> {
        self.inner.get_payment(id).await
    }

    async fn link_payment(&self, link: PaymentInitiationRelatedPayment) -> Result<(), StorageError> {
        self.inner.link_payment(link).await
    }

    async fn list_related_payments(
        &self,
        pi: &PaymentInitiationId,
    ) -> Result<Vec<PaymentInitiationRelatedPayment>, StorageError> {
        self.inner.list_related_payments(pi).await
    }

    async fn store_schedule(&self, schedule: Schedule) -> Result<(), StorageError> {
        self.inner.store_schedule(schedule).await
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, StorageError> {
        self.inner.get_schedule(id).await
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), StorageError> {
        self.inner.delete_schedule(id).await
    }

    async fn list_schedules(
        &self,
        connector_id: &ConnectorId,
        query: PageQuery,
    ) -> Result<Page<Schedule>, StorageError> {
        self.inner.list_schedules(connector_id, query).await
    }

    async fn store_task(&self, task: Task) -> Result<(), StorageError> {
        if task.status != TaskStatus::Processing && self.reject_task_outcomes.load(Ordering::SeqCst)
        {
            return Err(StorageError::Codec("task table is read-only".into()));
        }
        self.inner.store_task(task).await
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        self.inner.get_task(id).await
    }

    async fn event_sent_exists(&self, idempotency_key: &str) -> Result<bool, StorageError> {
        self.inner.event_sent_exists(idempotency_key).await
    }

    async fn store_event_sent(&self, sent: EventSent) -> Result<(), StorageError> {
        self.inner.store_event_sent(sent).await
    }

    async fn store_state(&self, id: &str, state: serde_json::Value) -> Result<(), StorageError> {
        self.inner.store_state(id, state).await
    }

    async fn get_state(&self, id: &str) -> Result<Option<serde_json::Value>, StorageError> {
        self.inner.get_state(id).await
    }
}

/// Retries in milliseconds rather than seconds.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.initial_interval_ms = 1;
    config.retry.maximum_interval_ms = 5;
    config
}

pub struct Harness<S: Storage + 'static = InMemoryStorage> {
    pub engine: Arc<Engine>,
    pub storage: Arc<S>,
    pub journal: Arc<InMemoryJournal>,
    pub sink: RecordingEventSink,
    pub plugin: Arc<ScriptedPlugin>,
    pub scheduler: TokioScheduler,
    // Held so the scheduler's channel stays open; firings are not drained.
    pub triggers: mpsc::Receiver<Trigger>,
}

pub async fn harness() -> Harness {
    harness_with(Arc::new(InMemoryStorage::new()), fast_config()).await
}

pub async fn harness_with<S: Storage + 'static>(storage: Arc<S>, config: EngineConfig) -> Harness<S> {
    let journal = Arc::new(InMemoryJournal::new());
    let sink = RecordingEventSink::new();
    let plugin = Arc::new(ScriptedPlugin::new());
    let (scheduler, triggers) = TokioScheduler::new(16);
    let engine = Arc::new(Engine::new(
        storage.clone(),
        journal.clone(),
        Arc::new(scheduler.clone()),
        Arc::new(sink.clone()),
        config,
    ));
    engine
        .register_connector(connector(), plugin.clone(), None)
        .await;
    Harness {
        engine,
        storage,
        journal,
        sink,
        plugin,
        scheduler,
        triggers,
    }
}

impl<S: Storage + 'static> Harness<S> {
    pub async fn statuses(&self, pi: &PaymentInitiationId) -> Vec<AdjustmentStatus> {
        self.engine
            .ledger()
            .history(pi)
            .await
            .unwrap()
            .iter()
            .map(|adj| adj.status)
            .collect()
    }

    pub async fn reversed_total(&self, pi: &PaymentInitiationId) -> Amount {
        self.engine
            .ledger()
            .history(pi)
            .await
            .unwrap()
            .iter()
            .filter(|adj| adj.status == AdjustmentStatus::Reversed)
            .filter_map(|adj| adj.amount)
            .fold(Amount::ZERO, |total, amount| total.checked_add(amount).unwrap())
    }

    pub async fn task(&self, id: &TaskId) -> Task {
        self.storage.get_task(id).await.unwrap().unwrap()
    }

    pub async fn adjustment_events(&self, status: AdjustmentStatus) -> usize {
        self.sink
            .events()
            .await
            .iter()
            .filter(|event| matches!(event, Event::PaymentInitiationAdjustment(adj) if adj.status == status))
            .count()
    }

    /// Stores a transfer initiation and returns the request that creates it.
    pub async fn seed_transfer(&self, reference: &str, amount: i64) -> CreateTransfer {
        let pi = payment_initiation(reference, PaymentInitiationType::Transfer, amount);
        let req = CreateTransfer {
            task_id: task_id(&format!("create-{reference}")),
            connector_id: connector(),
            payment_initiation_id: pi.id.clone(),
        };
        self.storage.store_payment_initiation(pi).await.unwrap();
        req
    }

    pub async fn seed_payout(&self, reference: &str, amount: i64) -> CreatePayout {
        let pi = payment_initiation(reference, PaymentInitiationType::Payout, amount);
        let req = CreatePayout {
            task_id: task_id(&format!("create-{reference}")),
            connector_id: connector(),
            payment_initiation_id: pi.id.clone(),
        };
        self.storage.store_payment_initiation(pi).await.unwrap();
        req
    }

    /// Stores a reversal of `pi` and returns the request that runs it.
    pub async fn seed_reversal(
        &self,
        reference: &str,
        pi: &PaymentInitiationId,
        amount: i64,
    ) -> ReverseTransfer {
        let reversal = reversal(reference, pi, amount);
        let req = ReverseTransfer {
            task_id: task_id(&format!("reverse-{reference}")),
            connector_id: connector(),
            reversal_id: reversal.id.clone(),
        };
        self.storage.store_reversal(reversal).await.unwrap();
        req
    }

    pub async fn seed_payout_reversal(
        &self,
        reference: &str,
        pi: &PaymentInitiationId,
        amount: i64,
    ) -> ReversePayout {
        let reversal = reversal(reference, pi, amount);
        let req = ReversePayout {
            task_id: task_id(&format!("reverse-{reference}")),
            connector_id: connector(),
            reversal_id: reversal.id.clone(),
        };
        self.storage.store_reversal(reversal).await.unwrap();
        req
    }
}

pub fn connector() -> ConnectorId {
    ConnectorId::new(CONNECTOR)
}

pub fn task_id(reference: &str) -> TaskId {
    TaskId::new(reference, connector())
}

pub fn payment_initiation(reference: &str, kind: PaymentInitiationType, amount: i64) -> PaymentInitiation {
    PaymentInitiation {
        id: PaymentInitiationId::new(reference, connector()),
        connector_id: connector(),
        reference: reference.to_string(),
        created_at: Utc::now(),
        scheduled_at: None,
        description: format!("initiation {reference}"),
        kind,
        amount: Amount::from(amount),
        asset: ASSET.to_string(),
        source_account_id: None,
        destination_account_id: None,
        metadata: Metadata::new(),
    }
}

pub fn reversal(reference: &str, pi: &PaymentInitiationId, amount: i64) -> PaymentInitiationReversal {
    PaymentInitiationReversal {
        id: PaymentInitiationReversalId::new(reference, connector()),
        connector_id: connector(),
        payment_initiation_id: pi.clone(),
        reference: reference.to_string(),
        created_at: Utc::now(),
        description: format!("reversal {reference}"),
        amount: Amount::from(amount),
        asset: ASSET.to_string(),
        metadata: Metadata::new(),
    }
}

pub fn psp_payment(reference: &str, status: PaymentStatus, amount: Amount) -> PspPayment {
    PspPayment {
        reference: reference.to_string(),
        created_at: Utc::now(),
        kind: PaymentType::Transfer,
        status,
        amount,
        asset: ASSET.to_string(),
        source_account_reference: None,
        destination_account_reference: None,
        metadata: Metadata::new(),
    }
}

pub fn polling(polling_id: &str) -> InitiationOutcome {
    InitiationOutcome {
        payment: None,
        polling_id: Some(polling_id.to_string()),
    }
}

pub const INSTRUCTIONS_HEADER: &str = "type,connector,reference,amount,asset,target,mode";

/// Writes an instructions file from `(type, reference, amount, target, mode)`
/// rows on the sandbox connector.
pub fn write_instructions(path: &Path, rows: &[(&str, &str, i64, &str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(INSTRUCTIONS_HEADER.split(','))?;
    for (kind, reference, amount, target, mode) in rows {
        let amount = amount.to_string();
        wtr.write_record([
            *kind,
            CONNECTOR,
            *reference,
            amount.as_str(),
            ASSET,
            *target,
            *mode,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
