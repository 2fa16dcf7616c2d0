//! The run store contract shared by every persistence backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use cronwork_core::config::{DatabaseConfig, StoreBackend};
use cronwork_core::result::AppResult;
use cronwork_entity::job_run::{JobRun, RecoverableRun, RunId};

use crate::connection;
use crate::memory::MemoryRunStore;
use crate::migration::run_migrations;
use crate::repositories::job_run::JobRunRepository;

/// Durable record of every run and every attempt's outcome.
///
/// Backends report an unreachable store as `ErrorKind::Storage`, an unknown
/// run id as `ErrorKind::NotFound`, and a transition out of `completed` as
/// `ErrorKind::Conflict`.
#[async_trait]
pub trait RunStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a `pending` run and return its fresh identifier.
    async fn create_run(&self, job_name: &str, scheduled_time: DateTime<Utc>) -> AppResult<RunId>;

    /// Move a run to `running`. Repeating the call only refreshes `updated_at`.
    async fn mark_running(&self, run_id: RunId) -> AppResult<()>;

    /// Move a run to `completed` and record the attempt's duration.
    async fn mark_completed(&self, run_id: RunId, duration_seconds: f64) -> AppResult<()>;

    /// Move a run to `failed`, incrementing `retry_count` in the same write.
    async fn mark_failed(
        &self,
        run_id: RunId,
        error_text: &str,
        duration_seconds: f64,
    ) -> AppResult<()>;

    /// Runs of `job_name` that are not completed and have
    /// `retry_count < max_retries`, oldest `scheduled_time` first.
    async fn list_recoverable(
        &self,
        job_name: &str,
        max_retries: i32,
    ) -> AppResult<Vec<RecoverableRun>>;

    /// Fetch a single run.
    async fn find_by_id(&self, run_id: RunId) -> AppResult<Option<JobRun>>;

    /// All runs of a job, oldest `scheduled_time` first.
    async fn list_by_job(&self, job_name: &str) -> AppResult<Vec<JobRun>>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> AppResult<()>;

    /// Release the store's connections once no run will write again.
    async fn close(&self) {}
}

/// Build the configured run store, running migrations for PostgreSQL.
pub async fn build_run_store(config: &DatabaseConfig) -> AppResult<Arc<dyn RunStore>> {
    let store: Arc<dyn RunStore> = match config.backend {
        StoreBackend::Postgres => {
            info!("Initializing PostgreSQL run store");
            let pool = connection::connect(config).await?;
            run_migrations(&pool).await?;
            Arc::new(JobRunRepository::new(pool))
        }
        StoreBackend::Memory => {
            info!("Initializing in-memory run store; runs will not survive a restart");
            Arc::new(MemoryRunStore::new())
        }
    };

    Ok(store)
}
