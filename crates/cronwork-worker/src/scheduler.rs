//! Cron scheduler: registration, crash recovery, and per-job timing loops.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing;

use cronwork_core::config::SchedulerConfig;
use cronwork_core::error::{AppError, ErrorKind};
use cronwork_core::result::AppResult;
use cronwork_database::RunStore;

use crate::executor::{RetryPolicy, RunExecutor};
use crate::job::JobDefinition;
use crate::metrics::CronJobMetrics;
use crate::schedule::CronSchedule;

/// A registered job, ready to have its timing loop started.
#[derive(Debug)]
pub struct JobHandle {
    schedule: CronSchedule,
    executor: RunExecutor,
    metrics: Option<Arc<CronJobMetrics>>,
}

impl JobHandle {
    /// The job's name.
    pub fn name(&self) -> &str {
        self.executor.job_name()
    }

    /// The job's parsed schedule.
    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }
}

/// Drives every registered job on its own timing loop.
///
/// Executions (scheduled and recovered) run on a shared [`TaskTracker`] so
/// shutdown can wait for them within a grace period.
pub struct CronScheduler {
    store: Arc<dyn RunStore>,
    metrics: Arc<CronJobMetrics>,
    config: SchedulerConfig,
    tracker: TaskTracker,
    shutdown_tx: watch::Sender<bool>,
    names: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("in_flight", &self.tracker.len())
            .field("shutting_down", &*self.shutdown_tx.borrow())
            .finish()
    }
}

impl CronScheduler {
    /// Create a scheduler over a run store and metrics sink.
    pub fn new(
        store: Arc<dyn RunStore>,
        metrics: Arc<CronJobMetrics>,
        config: SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            metrics,
            config,
            tracker: TaskTracker::new(),
            shutdown_tx,
            names: Mutex::new(HashSet::new()),
        }
    }

    /// Validate and register a job, then resume its incomplete runs.
    ///
    /// Fails with a configuration error for a malformed cron expression and
    /// a validation error for a bad name or retry budget. A store failure
    /// during the recovery scan is logged and does not fail registration.
    pub async fn register(&self, definition: JobDefinition) -> AppResult<JobHandle> {
        if definition.name.trim().is_empty() {
            return Err(AppError::validation("Job name must not be empty"));
        }
        if definition.max_retries < 0 {
            return Err(AppError::validation(format!(
                "Job '{}': max_retries must be >= 0, got {}",
                definition.name, definition.max_retries
            )));
        }

        let schedule = CronSchedule::parse(&definition.cron_expression)?;

        {
            let mut names = self
                .names
                .lock()
                .map_err(|_| AppError::internal("Job registry lock poisoned"))?;
            if !names.insert(definition.name.clone()) {
                return Err(AppError::conflict(format!(
                    "Job '{}' is already registered",
                    definition.name
                )));
            }
        }

        let metrics = definition
            .metrics_enabled
            .then(|| Arc::clone(&self.metrics));
        if let Some(metrics) = &metrics {
            metrics.register_job(
                &definition.name,
                schedule.expression(),
                definition.unit.label(),
            );
        }

        let executor = RunExecutor::new(
            definition.name.as_str(),
            definition.unit,
            Arc::clone(&self.store),
            metrics.clone(),
            RetryPolicy::from_config(&self.config, definition.max_retries),
            self.shutdown_tx.subscribe(),
        );

        tracing::info!(
            job_name = %definition.name,
            cron = %schedule,
            max_retries = definition.max_retries,
            "Registered cron job"
        );

        self.recover(&executor, definition.max_retries).await;

        Ok(JobHandle {
            schedule,
            executor,
            metrics,
        })
    }

    /// Dispatch every incomplete run left behind by a previous process.
    async fn recover(&self, executor: &RunExecutor, max_retries: i32) {
        let job_name = executor.job_name();
        let runs = match self.store.list_recoverable(job_name, max_retries).await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::error!(
                    job_name = %job_name,
                    error = %e,
                    "Recovery scan failed; incomplete runs will be retried on next startup"
                );
                return;
            }
        };

        if runs.is_empty() {
            return;
        }

        tracing::info!(
            job_name = %job_name,
            count = runs.len(),
            "Recovering incomplete runs"
        );

        for run in runs {
            let executor = executor.clone();
            tracing::info!(
                job_name = %job_name,
                run_id = run.id,
                attempt = run.retry_count,
                scheduled_time = %run.scheduled_time,
                "Resuming run"
            );
            self.tracker.spawn(async move {
                executor
                    .execute(run.id, run.scheduled_time, run.retry_count)
                    .await;
            });
        }
    }

    /// Run the job's timing loop until shutdown is requested.
    pub async fn start(&self, handle: JobHandle) {
        let job_name = handle.name().to_string();
        let mut shutdown = self.shutdown_tx.subscribe();

        if let Some(metrics) = &handle.metrics {
            metrics.loop_started(&job_name);
        }
        tracing::info!(job_name = %job_name, cron = %handle.schedule, "Timing loop started");

        let mut anchor = Utc::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(next_run) = handle.schedule.next_after(anchor) else {
                tracing::warn!(job_name = %job_name, "Schedule has no further fire times");
                break;
            };

            if let Some(metrics) = &handle.metrics {
                metrics.next_scheduled(&job_name, next_run);
            }

            let wait = (next_run - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(
                job_name = %job_name,
                %next_run,
                wait_seconds = wait.as_secs_f64(),
                "Next run scheduled"
            );

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            self.dispatch(&handle.executor, next_run);
            anchor = next_run;
        }

        if let Some(metrics) = &handle.metrics {
            metrics.loop_stopped(&job_name);
        }
        tracing::info!(job_name = %job_name, "Timing loop stopped");
    }

    /// Start the job's timing loop on its own task.
    pub fn spawn(self: &Arc<Self>, handle: JobHandle) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.start(handle).await })
    }

    /// Create the run record and execute it without blocking the loop.
    fn dispatch(&self, executor: &RunExecutor, scheduled_time: DateTime<Utc>) {
        let executor = executor.clone();
        let store = Arc::clone(&self.store);

        self.tracker.spawn(async move {
            let job_name = executor.job_name();
            let run_id = match store.create_run(job_name, scheduled_time).await {
                Ok(run_id) => run_id,
                Err(e) if e.kind == ErrorKind::Conflict => {
                    tracing::warn!(
                        job_name = %job_name,
                        %scheduled_time,
                        "Run already exists for this fire time; skipping"
                    );
                    return;
                }
                Err(e) => {
                    tracing::error!(
                        job_name = %job_name,
                        %scheduled_time,
                        error = %e,
                        "Failed to create run; this fire time is skipped"
                    );
                    return;
                }
            };

            executor.execute(run_id, scheduled_time, 0).await;
        });
    }

    /// Number of executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop every timing loop and wait up to `grace` for in-flight runs.
    ///
    /// Returns `true` if every execution finished within the grace period.
    /// Runs still going after it are left for the next startup's recovery.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.shutdown_tx.send_replace(true);
        self.tracker.close();

        tracing::info!(
            in_flight = self.tracker.len(),
            "Scheduler shutting down, waiting up to {:?} for in-flight runs",
            grace
        );

        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        if drained {
            tracing::info!("Scheduler shut down cleanly");
        } else {
            tracing::warn!(
                in_flight = self.tracker.len(),
                "Grace period elapsed with runs still in flight"
            );
        }
        drained
    }
}
