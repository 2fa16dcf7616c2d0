//! Shared test helpers for integration tests.
//!
//! These tests need a disposable PostgreSQL database named by
//! `CRONWORK_TEST_DATABASE_URL`; they are `#[ignore]`d otherwise.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use cronwork_api::{AppState, build_router};
use cronwork_core::config::{DatabaseConfig, SchedulerConfig};
use cronwork_database::{JobRunRepository, RunStore};
use cronwork_entity::job_run::{RunId, RunStatus};
use cronwork_worker::{CronJobMetrics, CronScheduler};

static NEXT_JOB: AtomicU32 = AtomicU32::new(0);

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Database pool for direct queries
    pub db_pool: PgPool,
    /// Run store backed by `db_pool`
    pub store: Arc<dyn RunStore>,
    /// Metrics sink shared with the router
    pub metrics: Arc<CronJobMetrics>,
}

impl TestApp {
    /// Connect, migrate, and build the router.
    pub async fn new() -> Self {
        let url = std::env::var("CRONWORK_TEST_DATABASE_URL")
            .expect("CRONWORK_TEST_DATABASE_URL must point at a disposable database");
        let config = DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        };

        let db_pool = cronwork_database::connection::connect(&config)
            .await
            .expect("Failed to connect to test database");
        cronwork_database::migration::run_migrations(&db_pool)
            .await
            .expect("Failed to run migrations");

        let store: Arc<dyn RunStore> = Arc::new(JobRunRepository::new(db_pool.clone()));
        let metrics = Arc::new(CronJobMetrics::new().expect("Failed to build metrics"));
        let router = build_router(AppState::new(
            Arc::clone(&store),
            Arc::clone(&metrics),
            "Cronwork",
        ));

        Self {
            router,
            db_pool,
            store,
            metrics,
        }
    }

    /// A scheduler over this app's store with no retry backoff.
    pub fn scheduler(&self) -> Arc<CronScheduler> {
        let config = SchedulerConfig {
            retry_backoff_seconds: 0,
            ..SchedulerConfig::default()
        };
        Arc::new(CronScheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.metrics),
            config,
        ))
    }

    /// Insert a run row directly, as a crashed process would have left it.
    pub async fn insert_run(
        &self,
        job_name: &str,
        scheduled_time: DateTime<Utc>,
        status: RunStatus,
        retry_count: i32,
    ) -> RunId {
        sqlx::query_scalar::<_, RunId>(
            "INSERT INTO cron_job_runs (job_name, scheduled_time, status, retry_count) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(job_name)
        .bind(scheduled_time)
        .bind(status.as_str())
        .bind(retry_count)
        .fetch_one(&self.db_pool)
        .await
        .expect("Failed to insert run")
    }

    /// Make a GET request to the test app
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

/// A job name no other test (or earlier test run) uses.
pub fn unique_job(prefix: &str) -> String {
    let n = NEXT_JOB.fetch_add(1, Ordering::SeqCst);
    format!(
        "{prefix}-{}-{n}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

/// Whole-second timestamp `minutes` after a fixed base.
pub fn minute(minutes: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + minutes * 60, 0).expect("valid timestamp")
}

/// Poll `check` every 50ms until it holds or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
