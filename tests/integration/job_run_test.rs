//! Integration tests for the PostgreSQL run store and crash recovery.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cronwork_core::error::ErrorKind;
use cronwork_entity::job_run::RunStatus;
use cronwork_worker::{FnJob, JobDefinition, JobError};

use helpers::{TestApp, eventually, minute, unique_job};

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_run_lifecycle_persists() {
    let app = TestApp::new().await;
    let job = unique_job("lifecycle");

    let id = app.store.create_run(&job, minute(0)).await.expect("create");
    let run = app.store.find_by_id(id).await.expect("find").expect("exists");
    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.retry_count, 0);
    assert_eq!(run.scheduled_time, minute(0));

    app.store.mark_running(id).await.expect("running");
    app.store.mark_running(id).await.expect("running again");
    app.store
        .mark_failed(id, "feed timeout", 2.5)
        .await
        .expect("fail");

    let run = app.store.find_by_id(id).await.expect("find").expect("exists");
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.retry_count, 1);
    assert_eq!(run.last_error.as_deref(), Some("feed timeout"));
    assert_eq!(run.duration_seconds, Some(2.5));
    assert!(run.updated_at >= run.created_at);

    app.store.mark_running(id).await.expect("running");
    app.store.mark_completed(id, 0.75).await.expect("complete");

    let run = app.store.find_by_id(id).await.expect("find").expect("exists");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.retry_count, 1);
    assert_eq!(run.duration_seconds, Some(0.75));
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_completed_runs_reject_transitions() {
    let app = TestApp::new().await;
    let job = unique_job("terminal");

    let id = app.store.create_run(&job, minute(0)).await.expect("create");
    app.store.mark_completed(id, 0.1).await.expect("complete");

    let err = app.store.mark_running(id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
    let err = app.store.mark_failed(id, "late", 0.1).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    let err = app.store.mark_running(i64::MAX).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_duplicate_fire_time_is_conflict() {
    let app = TestApp::new().await;
    let job = unique_job("duplicate");

    app.store.create_run(&job, minute(3)).await.expect("create");
    let err = app.store.create_run(&job, minute(3)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_list_recoverable_filters_and_orders() {
    let app = TestApp::new().await;
    let job = unique_job("recoverable");

    let late = app.insert_run(&job, minute(10), RunStatus::Running, 0).await;
    let early = app.insert_run(&job, minute(1), RunStatus::Failed, 2).await;
    app.insert_run(&job, minute(2), RunStatus::Completed, 0).await;
    app.insert_run(&job, minute(3), RunStatus::Failed, 3).await;
    app.insert_run(&unique_job("other"), minute(0), RunStatus::Pending, 0)
        .await;

    let runs = app.store.list_recoverable(&job, 3).await.expect("list");
    let ids: Vec<i64> = runs.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![early, late]);
    assert_eq!(runs[0].retry_count, 2);
    assert_eq!(runs[0].scheduled_time, minute(1));
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_crashed_run_is_resumed_on_registration() {
    let app = TestApp::new().await;
    let job = unique_job("crashed");
    let id = app.insert_run(&job, minute(0), RunStatus::Running, 1).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let unit = Arc::new(FnJob::new("AlwaysFails", move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<bool, _>(JobError::failed("source offline"))
        }
    }));

    let scheduler = app.scheduler();
    scheduler
        .register(JobDefinition::new(job.clone(), "0 0 1 1 *", unit))
        .await
        .expect("register");

    let store = Arc::clone(&app.store);
    let exhausted = eventually(Duration::from_secs(10), || {
        let store = Arc::clone(&store);
        async move {
            matches!(store.find_by_id(id).await, Ok(Some(run)) if run.retry_count == 4)
        }
    })
    .await;
    assert!(exhausted, "recovered run did not exhaust its retries");
    assert!(scheduler.shutdown(Duration::from_secs(5)).await);

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let runs = app.store.list_by_job(&job).await.expect("list");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(
        app.store
            .list_recoverable(&job, 3)
            .await
            .expect("list")
            .is_empty()
    );
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_closed_store_reports_storage_error() {
    let app = TestApp::new().await;
    app.store.health_check().await.expect("reachable");

    app.store.close().await;

    let err = app.store.health_check().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
    let err = app
        .store
        .create_run(&unique_job("closed"), minute(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Storage);
}
