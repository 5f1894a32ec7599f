mod common;

use common::*;
use pi_engine::domain::payment_initiation::AdjustmentStatus;
use pi_engine::domain::ports::{WorkflowJournal, WorkflowStatus};
use pi_engine::domain::task::TaskStatus;
use pi_engine::error::{EngineError, PluginError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_interrupted_workflow_resumes_without_duplicate_effects() {
    let h = harness().await;
    let req = h.seed_transfer("pi_1", 10_000).await;
    h.plugin.on_create(Script::Hang).await;

    let interrupted =
        tokio::time::timeout(Duration::from_millis(100), h.engine.create_transfer(req.clone())).await;
    assert!(interrupted.is_err());

    let workflow_id = format!("create-transfer-{}", req.task_id);
    let run = h.journal.get_run(&workflow_id).await.unwrap().unwrap();
    assert_eq!(run.status, WorkflowStatus::Running);
    assert_eq!(h.statuses(&req.payment_initiation_id).await, [AdjustmentStatus::Processing]);

    let resumed = h.engine.recover().await.unwrap();

    assert_eq!(resumed, 1);
    assert_eq!(h.plugin.create_calls(), 2);
    assert_eq!(
        h.statuses(&req.payment_initiation_id).await,
        [AdjustmentStatus::Processing, AdjustmentStatus::Processed]
    );
    assert_eq!(h.adjustment_events(AdjustmentStatus::Processing).await, 1);
    assert_eq!(h.task(&req.task_id).await.status, TaskStatus::Succeeded);
    let run = h.journal.get_run(&workflow_id).await.unwrap().unwrap();
    assert_eq!(run.status, WorkflowStatus::Completed);
    assert_eq!(h.engine.recover().await.unwrap(), 0);
}

#[tokio::test]
async fn test_resubmitting_a_completed_workflow_replays_it() {
    let h = harness().await;
    let req = h.seed_transfer("pi_1", 10_000).await;
    h.engine.create_transfer(req.clone()).await.unwrap();
    let events = h.sink.events().await.len();

    h.engine.create_transfer(req.clone()).await.unwrap();

    assert_eq!(h.plugin.create_calls(), 1);
    assert_eq!(
        h.statuses(&req.payment_initiation_id).await,
        [AdjustmentStatus::Processing, AdjustmentStatus::Processed]
    );
    assert_eq!(h.sink.events().await.len(), events);
}

#[tokio::test]
async fn test_replayed_failure_is_not_retried() {
    let h = harness().await;
    let req = h.seed_transfer("pi_1", 10_000).await;
    h.plugin
        .on_create(Script::Fail(PluginError::Rejected("account blocked".into())))
        .await;
    assert!(h.engine.create_transfer(req.clone()).await.is_err());

    let err = h.engine.create_transfer(req.clone()).await.unwrap_err();

    assert_eq!(err.to_string(), "account blocked");
    assert_eq!(h.plugin.create_calls(), 1);
    assert_eq!(
        h.statuses(&req.payment_initiation_id).await,
        [AdjustmentStatus::Processing, AdjustmentStatus::Failed]
    );
}

#[tokio::test]
async fn test_task_write_failure_keeps_the_workflow_outcome() {
    let storage = Arc::new(FaultyStorage::new());
    let h = harness_with(storage.clone(), fast_config()).await;
    storage.reject_task_outcomes();

    let failing = h.seed_transfer("pi_1", 10_000).await;
    h.plugin
        .on_create(Script::Fail(PluginError::Rejected("declined".into())))
        .await;
    let err = h.engine.create_transfer(failing).await.unwrap_err();

    assert!(matches!(err, EngineError::Bookkeeping { .. }));
    assert!(matches!(err.outcome(), Some(EngineError::Activity(_))));
    let rendered = err.to_string();
    assert!(rendered.contains("declined"));
    assert!(rendered.contains("task bookkeeping failed"));

    let settled = h.seed_transfer("pi_2", 10_000).await;
    let err = h.engine.create_transfer(settled.clone()).await.unwrap_err();

    assert!(matches!(err, EngineError::Bookkeeping { outcome: None, .. }));
    assert!(err.outcome().is_none());
    assert_eq!(
        h.statuses(&settled.payment_initiation_id).await,
        [AdjustmentStatus::Processing, AdjustmentStatus::Processed]
    );
}
