mod common;

use chrono::Utc;
use common::*;
use pi_engine::domain::page::PageQuery;
use pi_engine::domain::ports::{Scheduler, Storage, WorkflowJournal, WorkflowStatus};
use pi_engine::domain::schedule::Schedule;
use pi_engine::domain::workflow::{PollTransfer, WorkflowInput};
use pi_engine::domain::ids::PaymentInitiationId;
use pi_engine::infrastructure::in_memory::InMemoryStorage;
use std::sync::Arc;
use std::time::Duration;

async fn seed_schedules<S: Storage + 'static>(h: &Harness<S>, ids: std::ops::Range<usize>) {
    for i in ids {
        let schedule_id = format!("polling-transfer-default-sandbox-tr_{i}");
        h.storage
            .store_schedule(Schedule {
                id: schedule_id.clone(),
                connector_id: connector(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let input = WorkflowInput::PollTransfer(PollTransfer {
            task_id: task_id(&format!("create-pi_{i}")),
            connector_id: connector(),
            payment_initiation_id: PaymentInitiationId::new(format!("pi_{i}"), connector()),
            transfer_id: format!("tr_{i}"),
            schedule_id: schedule_id.clone(),
        });
        h.scheduler
            .create_recurring_trigger(&schedule_id, input, Duration::from_secs(3600))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_terminate_schedules_pages_and_continues_as_new() {
    let mut config = fast_config();
    config.list_page_size = 2;
    config.history_threshold = 10;
    let h = harness_with(Arc::new(InMemoryStorage::new()), config).await;
    seed_schedules(&h, 0..7).await;
    assert_eq!(h.scheduler.active().await, 7);

    let workflow_id = h.engine.terminate_schedules(connector()).await.unwrap();

    let left = h
        .storage
        .list_schedules(&connector(), PageQuery::first(100))
        .await
        .unwrap();
    assert!(left.data.is_empty());
    assert_eq!(h.scheduler.active().await, 0);

    let run = h
        .journal
        .get_run(&workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert!(run.run >= 1, "expected at least one continue-as-new, got run {}", run.run);
    assert!(
        h.storage
            .get_state("terminate-schedules-sandbox")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_terminate_schedules_again_removes_new_schedules() {
    let h = harness().await;
    seed_schedules(&h, 0..2).await;
    let first = h.engine.terminate_schedules(connector()).await.unwrap();
    seed_schedules(&h, 2..5).await;
    assert_eq!(h.scheduler.active().await, 3);

    let second = h.engine.terminate_schedules(connector()).await.unwrap();

    assert_ne!(first, second);
    let left = h
        .storage
        .list_schedules(&connector(), PageQuery::first(100))
        .await
        .unwrap();
    assert!(left.data.is_empty());
    assert_eq!(h.scheduler.active().await, 0);
}

#[tokio::test]
async fn test_terminate_schedules_only_touches_its_connector() {
    let h = harness().await;
    seed_schedules(&h, 0..3).await;
    let other = pi_engine::domain::ids::ConnectorId::new("other");
    h.storage
        .store_schedule(Schedule {
            id: "polling-payout-default-other-po_1".into(),
            connector_id: other.clone(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    h.engine.terminate_schedules(connector()).await.unwrap();

    assert!(
        h.storage
            .list_schedules(&connector(), PageQuery::first(10))
            .await
            .unwrap()
            .data
            .is_empty()
    );
    let kept = h
        .storage
        .list_schedules(&other, PageQuery::first(10))
        .await
        .unwrap();
    assert_eq!(kept.data.len(), 1);
}

#[tokio::test]
async fn test_missing_trigger_does_not_block_row_deletion() {
    let h = harness().await;
    h.storage
        .store_schedule(Schedule {
            id: "polling-transfer-default-sandbox-orphan".into(),
            connector_id: connector(),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    h.engine.terminate_schedules(connector()).await.unwrap();

    assert!(
        h.storage
            .get_schedule("polling-transfer-default-sandbox-orphan")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_trigger_for_deleted_schedule_is_dropped() {
    let h = harness().await;
    let req = h.seed_transfer("pi_1", 100).await;

    h.engine
        .poll_transfer(PollTransfer {
            task_id: req.task_id.clone(),
            connector_id: connector(),
            payment_initiation_id: req.payment_initiation_id.clone(),
            transfer_id: "tr_gone".into(),
            schedule_id: "polling-transfer-default-sandbox-tr_gone".into(),
        })
        .await
        .unwrap();

    assert_eq!(h.plugin.poll_calls(), 0);
    assert!(h.storage.get_task(&req.task_id).await.unwrap().is_none());
}
