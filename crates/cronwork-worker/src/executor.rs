//! Run executor: drives one run through its attempts.
//!
//! Each attempt marks the run `running`, invokes the job unit on its own
//! task, and records the outcome in the run store and the metrics sink.
//! Failed attempts are retried after a fixed backoff until the retry
//! budget is spent.

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing;

use cronwork_core::config::SchedulerConfig;
use cronwork_core::error::ErrorKind;
use cronwork_database::RunStore;
use cronwork_entity::job_run::RunId;

use crate::job::{JobError, JobUnit};
use crate::metrics::{CronJobMetrics, ExecutionTimer};

/// Retry and timeout settings applied to every run of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failed attempts allowed beyond the first.
    pub max_retries: i32,
    /// Pause between a failed attempt and the next one.
    pub backoff: Duration,
    /// Optional limit on a single attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Policy with the configured backoff and timeout and the given budget.
    pub fn from_config(config: &SchedulerConfig, max_retries: i32) -> Self {
        Self {
            max_retries,
            backoff: config.retry_backoff(),
            attempt_timeout: config.attempt_timeout(),
        }
    }
}

/// How a run left the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// An attempt succeeded and the run is `completed`.
    Completed,
    /// The last allowed attempt failed; the run stays `failed`.
    Exhausted,
    /// The unit succeeded but the completion could not be stored.
    Indeterminate,
    /// Shutdown was requested during a backoff.
    Interrupted,
    /// The store refused the run (already completed or gone).
    Abandoned,
}

enum AttemptResult {
    Succeeded,
    Failed,
    Indeterminate,
    Abandoned,
}

/// Executes runs of a single job.
#[derive(Debug, Clone)]
pub struct RunExecutor {
    job_name: Arc<str>,
    unit: Arc<dyn JobUnit>,
    store: Arc<dyn RunStore>,
    metrics: Option<Arc<CronJobMetrics>>,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
}

impl RunExecutor {
    /// Create an executor. `metrics` is `None` when the job opted out.
    pub fn new(
        job_name: impl Into<Arc<str>>,
        unit: Arc<dyn JobUnit>,
        store: Arc<dyn RunStore>,
        metrics: Option<Arc<CronJobMetrics>>,
        policy: RetryPolicy,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            unit,
            store,
            metrics,
            policy,
            shutdown,
        }
    }

    /// Name of the job this executor runs.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Drive `run_id` starting from attempt number `attempt`.
    ///
    /// New runs start at `0`; recovered runs start at their stored
    /// `retry_count`. Never returns an error: every failure ends up in the
    /// run record, the logs, or the metrics.
    pub async fn execute(
        &self,
        run_id: RunId,
        scheduled_time: DateTime<Utc>,
        attempt: i32,
    ) -> RunOutcome {
        let mut attempt = attempt;

        loop {
            match self.attempt(run_id, scheduled_time, attempt).await {
                AttemptResult::Succeeded => return RunOutcome::Completed,
                AttemptResult::Indeterminate => return RunOutcome::Indeterminate,
                AttemptResult::Abandoned => return RunOutcome::Abandoned,
                AttemptResult::Failed => {}
            }

            attempt += 1;
            if attempt > self.policy.max_retries {
                tracing::warn!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    max_retries = self.policy.max_retries,
                    "Retries exhausted; abandoning run"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.retries_exhausted(&self.job_name);
                }
                return RunOutcome::Exhausted;
            }

            tracing::info!(
                job_name = %self.job_name,
                run_id,
                attempt,
                "Retrying in {:?}",
                self.policy.backoff
            );

            if !self.wait_backoff().await {
                tracing::info!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    "Shutdown requested during backoff; run left for recovery"
                );
                return RunOutcome::Interrupted;
            }
        }
    }

    async fn attempt(
        &self,
        run_id: RunId,
        scheduled_time: DateTime<Utc>,
        attempt: i32,
    ) -> AttemptResult {
        let marked = self.store.mark_running(run_id).await;
        if let Err(e) = &marked {
            if matches!(e.kind, ErrorKind::Conflict | ErrorKind::NotFound) {
                tracing::warn!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    error = %e,
                    "Run can no longer be executed"
                );
                return AttemptResult::Abandoned;
            }
        }

        let timer = self.start_timer();
        let started = Instant::now();

        let outcome = match marked {
            Ok(()) => {
                tracing::info!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    %scheduled_time,
                    "Executing job"
                );
                self.invoke().await
            }
            Err(e) => {
                tracing::error!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    error = %e,
                    "Failed to mark run as running"
                );
                Err(JobError::failed(format!("run store unavailable: {e}")))
            }
        };

        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.mark_completed(run_id, duration).await {
                    tracing::error!(
                        job_name = %self.job_name,
                        run_id,
                        attempt,
                        error = %e,
                        "Job succeeded but completion could not be recorded"
                    );
                    if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                        metrics.execution_failed(&self.job_name, timer);
                    }
                    return AttemptResult::Indeterminate;
                }

                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.execution_succeeded(&self.job_name, timer);
                }

                tracing::info!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    duration_seconds = duration,
                    "Job completed"
                );
                AttemptResult::Succeeded
            }
            Err(job_error) => {
                if let (Some(metrics), Some(timer)) = (&self.metrics, timer) {
                    metrics.execution_failed(&self.job_name, timer);
                }

                let error_text = job_error.to_string();
                tracing::warn!(
                    job_name = %self.job_name,
                    run_id,
                    attempt,
                    duration_seconds = duration,
                    error = %error_text,
                    "Job attempt failed"
                );

                if let Err(e) = self.store.mark_failed(run_id, &error_text, duration).await {
                    tracing::error!(
                        job_name = %self.job_name,
                        run_id,
                        attempt,
                        error = %e,
                        "Failed to record attempt failure"
                    );
                }
                AttemptResult::Failed
            }
        }
    }

    fn start_timer(&self) -> Option<ExecutionTimer> {
        self.metrics
            .as_ref()
            .map(|metrics| metrics.execution_started(&self.job_name))
    }

    /// Run the unit on its own task so a panic surfaces as a failure.
    async fn invoke(&self) -> Result<(), JobError> {
        let unit = Arc::clone(&self.unit);
        let mut handle = tokio::spawn(async move { unit.run().await });

        let joined = match self.policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(JobError::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(JobError::Unsuccessful),
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_panic() => Err(JobError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(JobError::failed(format!("job task cancelled: {e}"))),
        }
    }

    /// Sleep for the backoff. Returns `false` if shutdown cut it short.
    async fn wait_backoff(&self) -> bool {
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return false;
        }

        let stop_requested = async move {
            // A dropped sender means nobody can request a stop.
            if shutdown.wait_for(|stop| *stop).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(self.policy.backoff) => true,
            _ = stop_requested => false,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
