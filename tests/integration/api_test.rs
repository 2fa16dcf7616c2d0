//! Integration tests for the HTTP surface against PostgreSQL.

mod helpers;

use axum::http::StatusCode;

use cronwork_entity::job_run::RunStatus;

use helpers::{TestApp, minute, unique_job};

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_health_reports_store_ok() {
    let app = TestApp::new().await;

    let response = app.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], 200);
    assert_eq!(response.body["store"], "ok");
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_job_runs_listing() {
    let app = TestApp::new().await;
    let job = unique_job("listing");
    let second = app.insert_run(&job, minute(2), RunStatus::Completed, 0).await;
    let first = app.insert_run(&job, minute(1), RunStatus::Failed, 1).await;

    let response = app.get(&format!("/api/jobs/{job}/runs")).await;
    assert_eq!(response.status, StatusCode::OK);

    let ids: Vec<i64> = response
        .body
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|run| run["id"].as_i64())
        .collect();
    assert_eq!(ids, vec![first, second]);

    let response = app.get(&format!("/api/runs/{first}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "failed");
    assert_eq!(response.body["job_name"], job.as_str());
}

#[tokio::test]
#[ignore = "requires CRONWORK_TEST_DATABASE_URL"]
async fn test_unknown_run_is_404() {
    let app = TestApp::new().await;

    let response = app.get(&format!("/api/runs/{}", i64::MAX)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
}
