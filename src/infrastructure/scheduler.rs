use crate::application::Engine;
use crate::domain::ports::Scheduler;
use crate::domain::workflow::{Trigger, WorkflowInput};
use crate::error::SchedulerError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Recurring triggers as tokio interval tasks.
///
/// Each trigger fires immediately and then every period, pushing a
/// [`Trigger`] into a bounded channel drained by [`run_worker`]. When the
/// worker is behind, the firing is skipped rather than queued.
#[derive(Clone)]
pub struct TokioScheduler {
    triggers: mpsc::Sender<Trigger>,
    tickers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl TokioScheduler {
    /// Creates a scheduler and the receiving end of its trigger channel.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Trigger>) {
        let (triggers, rx) = mpsc::channel(buffer.max(1));
        let scheduler = Self {
            triggers,
            tickers: Arc::default(),
        };
        (scheduler, rx)
    }

    /// Number of registered triggers still ticking.
    pub async fn active(&self) -> usize {
        let tickers = self.tickers.lock().await;
        tickers.values().filter(|handle| !handle.is_finished()).count()
    }

    pub async fn shutdown(&self) {
        let mut tickers = self.tickers.lock().await;
        for (_, handle) in tickers.drain() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn create_recurring_trigger(
        &self,
        schedule_id: &str,
        input: WorkflowInput,
        every: Duration,
    ) -> Result<(), SchedulerError> {
        let mut tickers = self.tickers.lock().await;
        if tickers
            .get(schedule_id)
            .is_some_and(|handle| !handle.is_finished())
        {
            return Err(SchedulerError::AlreadyExists(schedule_id.to_string()));
        }

        let sender = self.triggers.clone();
        let id = schedule_id.to_string();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let trigger = Trigger {
                    schedule_id: id.clone(),
                    fired_at: Utc::now(),
                    input: input.clone(),
                };
                match sender.try_send(trigger) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(schedule = %id, "worker busy, skipping firing");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        tickers.insert(schedule_id.to_string(), handle);
        info!(schedule = schedule_id, ?every, "recurring trigger created");
        Ok(())
    }

    async fn delete_recurring_trigger(&self, schedule_id: &str) -> Result<(), SchedulerError> {
        let mut tickers = self.tickers.lock().await;
        match tickers.remove(schedule_id) {
            Some(handle) => {
                handle.abort();
                info!(schedule = schedule_id, "recurring trigger deleted");
                Ok(())
            }
            None => Err(SchedulerError::NotFound(schedule_id.to_string())),
        }
    }
}

/// Runs triggers one at a time until the channel closes.
pub async fn run_worker(engine: Arc<Engine>, mut triggers: mpsc::Receiver<Trigger>) {
    while let Some(trigger) = triggers.recv().await {
        let schedule = trigger.schedule_id.clone();
        if let Err(err) = engine.run_trigger(trigger).await {
            error!(schedule = %schedule, error = %err, "triggered workflow failed");
        }
    }
}
