use super::connectors::{Connectors, RegisteredConnector};
use super::events::EventPublisher;
use super::ledger::AdjustmentLedger;
use super::tasks::TaskRecorder;
use super::validator::ReversalValidator;
use super::workflow::{Exit, Workflow};
use crate::config::EngineConfig;
use crate::domain::ids::ConnectorId;
use crate::domain::ports::{
    EventSinkRef, JournalRef, PluginRef, SchedulerRef, StorageRef, WorkflowStatus,
};
use crate::domain::workflow::{
    CreatePayout, CreateTransfer, PollPayout, PollTransfer, ReversePayout, ReverseTransfer,
    TerminateSchedules, Trigger, WorkflowInput,
};
use crate::durable::WorkflowContext;
use crate::error::{EngineError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span};

/// The entry point for running payment initiation workflows.
///
/// `Engine` owns the storage, journal, scheduler and event sink, and runs
/// each workflow to completion under a durable id. Running a workflow id
/// again (after a crash, or as a duplicate submission) replays its journal:
/// completed steps are not repeated.
pub struct Engine {
    workflow: Arc<Workflow>,
    journal: JournalRef,
    config: EngineConfig,
}

impl Engine {
    /// Creates a new `Engine`.
    ///
    /// # Arguments
    ///
    /// * `storage` - Ledger, payments, schedules, tasks and sent events.
    /// * `journal` - Step history of running workflows.
    /// * `scheduler` - Recurring triggers used for polling.
    /// * `sink` - Destination of outbound events.
    /// * `config` - Engine settings.
    pub fn new(
        storage: StorageRef,
        journal: JournalRef,
        scheduler: SchedulerRef,
        sink: EventSinkRef,
        config: EngineConfig,
    ) -> Self {
        let ledger = AdjustmentLedger::new(storage.clone(), config.list_page_size);
        let events = EventPublisher::new(storage.clone(), sink);
        let workflow = Workflow {
            tasks: TaskRecorder::new(storage.clone()),
            validator: ReversalValidator::new(ledger.clone(), events.clone()),
            storage,
            scheduler,
            connectors: Connectors::default(),
            ledger,
            events,
            config: config.clone(),
        };
        Self {
            workflow: Arc::new(workflow),
            journal,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageRef {
        &self.workflow.storage
    }

    pub fn ledger(&self) -> &AdjustmentLedger {
        &self.workflow.ledger
    }

    /// Installs `plugin` for `connector_id`. Polls for this connector run
    /// every `polling_period`, or the configured default.
    pub async fn register_connector(
        &self,
        connector_id: ConnectorId,
        plugin: PluginRef,
        polling_period: Option<Duration>,
    ) {
        let polling_period = polling_period.unwrap_or_else(|| self.config.default_polling_period());
        info!(connector = %connector_id, ?polling_period, "connector registered");
        self.workflow
            .connectors
            .register(connector_id, RegisteredConnector {
                plugin,
                polling_period,
            })
            .await;
    }

    pub async fn create_transfer(&self, req: CreateTransfer) -> Result<()> {
        self.submit(WorkflowInput::CreateTransfer(req)).await
    }

    pub async fn create_payout(&self, req: CreatePayout) -> Result<()> {
        self.submit(WorkflowInput::CreatePayout(req)).await
    }

    pub async fn reverse_transfer(&self, req: ReverseTransfer) -> Result<()> {
        self.submit(WorkflowInput::ReverseTransfer(req)).await
    }

    pub async fn reverse_payout(&self, req: ReversePayout) -> Result<()> {
        self.submit(WorkflowInput::ReversePayout(req)).await
    }

    /// Runs one poll tick outside of the scheduler.
    pub async fn poll_transfer(&self, req: PollTransfer) -> Result<()> {
        self.run_trigger(Trigger {
            schedule_id: req.schedule_id.clone(),
            fired_at: Utc::now(),
            input: WorkflowInput::PollTransfer(req),
        })
        .await
    }

    pub async fn poll_payout(&self, req: PollPayout) -> Result<()> {
        self.run_trigger(Trigger {
            schedule_id: req.schedule_id.clone(),
            fired_at: Utc::now(),
            input: WorkflowInput::PollPayout(req),
        })
        .await
    }

    /// Removes every recurring trigger and schedule row of a connector.
    ///
    /// Each call is a new workflow, so schedules created after an earlier
    /// call are removed too. Returns the id the workflow ran under.
    pub async fn terminate_schedules(&self, connector_id: ConnectorId) -> Result<String> {
        let input = WorkflowInput::TerminateSchedules(TerminateSchedules {
            connector_id,
            cursor: None,
        });
        let workflow_id = format!("{}@{}", input.workflow_id(), Utc::now().timestamp_micros());
        self.execute(&workflow_id, input).await?;
        Ok(workflow_id)
    }

    async fn submit(&self, input: WorkflowInput) -> Result<()> {
        let workflow_id = input.workflow_id();
        self.execute(&workflow_id, input).await
    }

    /// Runs a scheduler firing. Firings whose schedule row is gone are
    /// dropped, which covers ticks queued before the schedule was torn down.
    pub async fn run_trigger(&self, trigger: Trigger) -> Result<()> {
        let exists = self
            .workflow
            .storage
            .get_schedule(&trigger.schedule_id)
            .await?
            .is_some();
        if !exists {
            debug!(schedule = %trigger.schedule_id, "schedule is gone, dropping trigger");
            return Ok(());
        }
        let workflow_id = trigger.workflow_id();
        self.execute(&workflow_id, trigger.input).await
    }

    /// Runs `workflow_id` to completion, resuming from its journal.
    ///
    /// Journal errors leave the workflow running so [`Engine::recover`] can
    /// pick it up; any other error marks it failed.
    pub async fn execute(&self, workflow_id: &str, input: WorkflowInput) -> Result<()> {
        let mut run = self
            .journal
            .begin(workflow_id, input)
            .await
            .map_err(EngineError::Journal)?;
        loop {
            let ctx = WorkflowContext::new(
                workflow_id,
                run.run,
                self.journal.clone(),
                self.config.retry.backoff(),
                self.config.history_threshold,
            );
            let span = info_span!(
                "workflow",
                id = workflow_id,
                run = run.run,
                kind = run.input.name()
            );
            let exit = self
                .workflow
                .dispatch(&ctx, &run.input)
                .instrument(span)
                .await;
            match exit {
                Ok(Exit::Completed) => {
                    self.finish(workflow_id, &run.input, WorkflowStatus::Completed)
                        .await?;
                    return Ok(());
                }
                Ok(Exit::ContinueAsNew(next)) => {
                    run = self
                        .journal
                        .continue_as_new(workflow_id, next)
                        .await
                        .map_err(EngineError::Journal)?;
                    info!(workflow_id, run = run.run, "continued as new");
                }
                Err(err @ EngineError::Journal(_)) => {
                    error!(workflow_id, error = %err, "journal unavailable, leaving workflow running");
                    return Err(err);
                }
                Err(err) => {
                    self.finish(workflow_id, &run.input, WorkflowStatus::Failed)
                        .await?;
                    return Err(err);
                }
            }
        }
    }

    /// Marks the run finished. Poll ticks are dropped from the journal
    /// instead: every firing is its own workflow, and a pending operation
    /// may tick indefinitely.
    async fn finish(
        &self,
        workflow_id: &str,
        input: &WorkflowInput,
        status: WorkflowStatus,
    ) -> Result<()> {
        let finished = if input.is_poll() {
            self.journal.forget(workflow_id).await
        } else {
            self.journal.complete(workflow_id, status).await
        };
        finished.map_err(EngineError::Journal)
    }

    /// Resumes every workflow the journal still marks as running, e.g. after
    /// a restart. Returns how many were resumed; their individual failures
    /// are logged.
    pub async fn recover(&self) -> Result<usize> {
        let running = self
            .journal
            .list_running()
            .await
            .map_err(EngineError::Journal)?;
        let count = running.len();
        for run in running {
            info!(workflow_id = %run.workflow_id, run = run.run, "resuming workflow");
            if let Err(err) = self.execute(&run.workflow_id, run.input).await {
                error!(workflow_id = %run.workflow_id, error = %err, "resumed workflow failed");
            }
        }
        Ok(count)
    }
}
