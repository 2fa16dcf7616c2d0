//! Job run repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use cronwork_core::error::{AppError, ErrorKind};
use cronwork_core::result::AppResult;
use cronwork_entity::job_run::{JobRun, RecoverableRun, RunId, RunStatus};

use crate::store::RunStore;

/// Repository for the `cron_job_runs` table.
///
/// Every method checks a connection out of the pool for the duration of a
/// single statement only.
#[derive(Debug, Clone)]
pub struct JobRunRepository {
    pool: PgPool,
}

impl JobRunRepository {
    /// Create a new job run repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a status update and translate "no row touched" into the right error.
    async fn transition(
        &self,
        run_id: RunId,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
        action: &str,
    ) -> AppResult<()> {
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error(format!("Failed to {action} run {run_id}"), e))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.find_by_id(run_id).await? {
            Some(run) => Err(AppError::conflict(format!(
                "Cannot {action} run {run_id}: run is {}",
                run.status
            ))),
            None => Err(AppError::not_found(format!("Run {run_id} not found"))),
        }
    }
}

#[async_trait]
impl RunStore for JobRunRepository {
    async fn create_run(&self, job_name: &str, scheduled_time: DateTime<Utc>) -> AppResult<RunId> {
        sqlx::query_scalar::<_, RunId>(
            "INSERT INTO cron_job_runs (job_name, scheduled_time, status) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(job_name)
        .bind(scheduled_time)
        .bind(RunStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::conflict(
                format!("A run of '{job_name}' scheduled at {scheduled_time} already exists"),
            ),
            e => storage_error(format!("Failed to create run for '{job_name}'"), e),
        })
    }

    async fn mark_running(&self, run_id: RunId) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE cron_job_runs SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status <> 'completed'",
        )
        .bind(run_id)
        .bind(RunStatus::Running.as_str());

        self.transition(run_id, query, "mark running").await
    }

    async fn mark_completed(&self, run_id: RunId, duration_seconds: f64) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE cron_job_runs SET status = $2, duration_seconds = $3, updated_at = NOW() \
             WHERE id = $1 AND status <> 'completed'",
        )
        .bind(run_id)
        .bind(RunStatus::Completed.as_str())
        .bind(duration_seconds);

        self.transition(run_id, query, "complete").await
    }

    async fn mark_failed(
        &self,
        run_id: RunId,
        error_text: &str,
        duration_seconds: f64,
    ) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE cron_job_runs SET status = $2, retry_count = retry_count + 1, \
             last_error = $3, duration_seconds = $4, updated_at = NOW() \
             WHERE id = $1 AND status <> 'completed'",
        )
        .bind(run_id)
        .bind(RunStatus::Failed.as_str())
        .bind(error_text)
        .bind(duration_seconds);

        self.transition(run_id, query, "fail").await
    }

    async fn list_recoverable(
        &self,
        job_name: &str,
        max_retries: i32,
    ) -> AppResult<Vec<RecoverableRun>> {
        sqlx::query_as::<_, RecoverableRun>(
            "SELECT id, scheduled_time, retry_count FROM cron_job_runs \
             WHERE job_name = $1 AND status <> 'completed' AND retry_count < $2 \
             ORDER BY scheduled_time ASC, id ASC",
        )
        .bind(job_name)
        .bind(max_retries)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error(format!("Failed to list recoverable runs for '{job_name}'"), e))
    }

    async fn find_by_id(&self, run_id: RunId) -> AppResult<Option<JobRun>> {
        sqlx::query_as::<_, JobRun>("SELECT * FROM cron_job_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error(format!("Failed to find run {run_id}"), e))
    }

    async fn list_by_job(&self, job_name: &str) -> AppResult<Vec<JobRun>> {
        sqlx::query_as::<_, JobRun>(
            "SELECT * FROM cron_job_runs WHERE job_name = $1 ORDER BY scheduled_time ASC, id ASC",
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error(format!("Failed to list runs for '{job_name}'"), e))
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| storage_error("Health check failed", e))
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Run store connections closed");
    }
}

fn storage_error(message: impl Into<String>, err: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::Storage, message, err)
}
