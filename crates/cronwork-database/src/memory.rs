//! In-process run store.
//!
//! Mirrors the PostgreSQL repository's semantics exactly (status checks,
//! uniqueness of `(job_name, scheduled_time)`, recovery ordering) without
//! surviving a restart. The engine's tests run against it, and it can
//! simulate an outage via [`MemoryRunStore::set_available`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use cronwork_core::error::AppError;
use cronwork_core::result::AppResult;
use cronwork_entity::job_run::{JobRun, RecoverableRun, RunId, RunStatus};

use crate::store::RunStore;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: RunId,
    runs: BTreeMap<RunId, JobRun>,
}

/// Run store backed by a map guarded by an async lock.
#[derive(Debug)]
pub struct MemoryRunStore {
    state: RwLock<MemoryState>,
    available: AtomicBool,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                next_id: 1,
                runs: BTreeMap::new(),
            }),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated reachability. While unavailable every call fails
    /// with a storage error.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert a run as-is, e.g. one left behind by a crashed process.
    ///
    /// The run keeps its id; later ids are allocated above it.
    pub async fn insert(&self, run: JobRun) {
        let mut state = self.state.write().await;
        state.next_id = state.next_id.max(run.id + 1);
        state.runs.insert(run.id, run);
    }

    /// Number of stored runs across all jobs.
    pub async fn len(&self) -> usize {
        self.state.read().await.runs.len()
    }

    /// Whether the store holds no runs.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.runs.is_empty()
    }

    fn ensure_available(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::storage("Run store is unavailable"))
        }
    }

    /// Apply `update` to a non-completed run and refresh `updated_at`.
    async fn transition(
        &self,
        run_id: RunId,
        action: &str,
        update: impl FnOnce(&mut JobRun),
    ) -> AppResult<()> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| AppError::not_found(format!("Run {run_id} not found")))?;

        if run.status.is_completed() {
            return Err(AppError::conflict(format!(
                "Cannot {action} run {run_id}: run is {}",
                run.status
            )));
        }

        update(run);
        run.updated_at = Utc::now();
        Ok(())
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, job_name: &str, scheduled_time: DateTime<Utc>) -> AppResult<RunId> {
        self.ensure_available()?;
        let mut state = self.state.write().await;

        let duplicate = state
            .runs
            .values()
            .any(|r| r.job_name == job_name && r.scheduled_time == scheduled_time);
        if duplicate {
            return Err(AppError::conflict(format!(
                "A run of '{job_name}' scheduled at {scheduled_time} already exists"
            )));
        }

        let id = state.next_id;
        state.next_id += 1;

        let now = Utc::now();
        state.runs.insert(
            id,
            JobRun {
                id,
                job_name: job_name.to_string(),
                scheduled_time,
                status: RunStatus::Pending,
                retry_count: 0,
                last_error: None,
                duration_seconds: None,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn mark_running(&self, run_id: RunId) -> AppResult<()> {
        self.transition(run_id, "mark running", |run| {
            run.status = RunStatus::Running;
        })
        .await
    }

    async fn mark_completed(&self, run_id: RunId, duration_seconds: f64) -> AppResult<()> {
        self.transition(run_id, "complete", |run| {
            run.status = RunStatus::Completed;
            run.duration_seconds = Some(duration_seconds);
        })
        .await
    }

    async fn mark_failed(
        &self,
        run_id: RunId,
        error_text: &str,
        duration_seconds: f64,
    ) -> AppResult<()> {
        self.transition(run_id, "fail", |run| {
            run.status = RunStatus::Failed;
            run.retry_count += 1;
            run.last_error = Some(error_text.to_string());
            run.duration_seconds = Some(duration_seconds);
        })
        .await
    }

    async fn list_recoverable(
        &self,
        job_name: &str,
        max_retries: i32,
    ) -> AppResult<Vec<RecoverableRun>> {
        self.ensure_available()?;
        let state = self.state.read().await;

        let mut runs: Vec<RecoverableRun> = state
            .runs
            .values()
            .filter(|r| r.job_name == job_name && r.is_recoverable(max_retries))
            .map(RecoverableRun::from)
            .collect();
        runs.sort_by_key(|r| (r.scheduled_time, r.id));
        Ok(runs)
    }

    async fn find_by_id(&self, run_id: RunId) -> AppResult<Option<JobRun>> {
        self.ensure_available()?;
        Ok(self.state.read().await.runs.get(&run_id).cloned())
    }

    async fn list_by_job(&self, job_name: &str) -> AppResult<Vec<JobRun>> {
        self.ensure_available()?;
        let state = self.state.read().await;

        let mut runs: Vec<JobRun> = state
            .runs
            .values()
            .filter(|r| r.job_name == job_name)
            .cloned()
            .collect();
        runs.sort_by_key(|r| (r.scheduled_time, r.id));
        Ok(runs)
    }

    async fn health_check(&self) -> AppResult<()> {
        self.ensure_available()
    }
}
