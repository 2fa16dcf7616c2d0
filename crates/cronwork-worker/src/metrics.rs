//! Cron job metrics and Prometheus exposition.
//!
//! One [`CronJobMetrics`] is built at process start and shared by handle.
//! Every series lives in a private registry, so tests can construct
//! isolated instances. Recording never fails the caller.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

use cronwork_core::error::{AppError, ErrorKind};
use cronwork_core::result::AppResult;

/// Upper bounds of the duration histogram, in seconds.
pub const DURATION_BUCKETS: [f64; 10] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Outcome label for successful attempts.
pub const STATUS_SUCCESS: &str = "success";
/// Outcome label for failed attempts.
pub const STATUS_ERROR: &str = "error";

/// Start marker for one attempt, returned by [`CronJobMetrics::execution_started`].
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimer {
    started: Instant,
}

impl ExecutionTimer {
    /// Seconds elapsed since the attempt started.
    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

/// Process-wide execution metrics, keyed by job name.
#[derive(Debug)]
pub struct CronJobMetrics {
    registry: Registry,
    executions_total: IntCounterVec,
    duration_seconds: HistogramVec,
    last_success_timestamp: GaugeVec,
    last_execution_timestamp: GaugeVec,
    next_execution_timestamp: GaugeVec,
    job_info: GaugeVec,
    active_loops: IntGauge,
    retries_exhausted_total: IntCounterVec,
    /// Current `(cron_expression, class_name)` info labels per job.
    registered: Mutex<HashMap<String, (String, String)>>,
}

impl CronJobMetrics {
    /// Create a collector with its own registry.
    pub fn new() -> AppResult<Self> {
        let registry = Registry::new();

        let executions_total = IntCounterVec::new(
            Opts::new(
                "cron_job_executions_total",
                "Total number of cron job executions",
            ),
            &["job_name", "status"],
        )
        .map_err(metrics_error)?;

        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "cron_job_duration_seconds",
                "Time spent executing cron jobs",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["job_name"],
        )
        .map_err(metrics_error)?;

        let last_success_timestamp = GaugeVec::new(
            Opts::new(
                "cron_job_last_success_timestamp",
                "Timestamp of the last successful job execution",
            ),
            &["job_name"],
        )
        .map_err(metrics_error)?;

        let last_execution_timestamp = GaugeVec::new(
            Opts::new(
                "cron_job_last_execution_timestamp",
                "Timestamp of the last job execution (success or failure)",
            ),
            &["job_name"],
        )
        .map_err(metrics_error)?;

        let next_execution_timestamp = GaugeVec::new(
            Opts::new(
                "cron_job_next_execution_timestamp",
                "Timestamp of the next scheduled job execution",
            ),
            &["job_name"],
        )
        .map_err(metrics_error)?;

        let job_info = GaugeVec::new(
            Opts::new("cron_job_info", "Information about cron jobs"),
            &["job_name", "cron_expression", "class_name"],
        )
        .map_err(metrics_error)?;

        let active_loops = IntGauge::new("cron_jobs_active", "Number of currently active cron jobs")
            .map_err(metrics_error)?;

        let retries_exhausted_total = IntCounterVec::new(
            Opts::new(
                "cron_job_retries_exhausted_total",
                "Runs abandoned after exhausting their retry budget",
            ),
            &["job_name"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(executions_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(duration_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(last_success_timestamp.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(last_execution_timestamp.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(next_execution_timestamp.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(job_info.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(active_loops.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(retries_exhausted_total.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            executions_total,
            duration_seconds,
            last_success_timestamp,
            last_execution_timestamp,
            next_execution_timestamp,
            job_info,
            active_loops,
            retries_exhausted_total,
            registered: Mutex::new(HashMap::new()),
        })
    }

    /// Publish a job's static metadata. Re-registering replaces the old series.
    pub fn register_job(&self, job_name: &str, cron_expression: &str, class_name: &str) {
        if let Ok(mut registered) = self.registered.lock() {
            if let Some((old_cron, old_class)) = registered.remove(job_name) {
                let _ = self
                    .job_info
                    .remove_label_values(&[job_name, old_cron.as_str(), old_class.as_str()]);
            }
            registered.insert(
                job_name.to_string(),
                (cron_expression.to_string(), class_name.to_string()),
            );
        }
        self.job_info
            .with_label_values(&[job_name, cron_expression, class_name])
            .set(1.0);
    }

    /// A timing loop came up.
    pub fn loop_started(&self, _job_name: &str) {
        self.active_loops.inc();
    }

    /// A timing loop exited.
    pub fn loop_stopped(&self, _job_name: &str) {
        self.active_loops.dec();
    }

    /// Record the start of an attempt.
    pub fn execution_started(&self, job_name: &str) -> ExecutionTimer {
        self.last_execution_timestamp
            .with_label_values(&[job_name])
            .set(unix_seconds(Utc::now()));
        ExecutionTimer {
            started: Instant::now(),
        }
    }

    /// Record a successful attempt.
    pub fn execution_succeeded(&self, job_name: &str, timer: ExecutionTimer) {
        self.executions_total
            .with_label_values(&[job_name, STATUS_SUCCESS])
            .inc();
        self.duration_seconds
            .with_label_values(&[job_name])
            .observe(timer.elapsed_seconds());
        self.last_success_timestamp
            .with_label_values(&[job_name])
            .set(unix_seconds(Utc::now()));
    }

    /// Record a failed attempt.
    pub fn execution_failed(&self, job_name: &str, timer: ExecutionTimer) {
        self.executions_total
            .with_label_values(&[job_name, STATUS_ERROR])
            .inc();
        self.duration_seconds
            .with_label_values(&[job_name])
            .observe(timer.elapsed_seconds());
    }

    /// Record the next computed fire time.
    pub fn next_scheduled(&self, job_name: &str, next_run: DateTime<Utc>) {
        self.next_execution_timestamp
            .with_label_values(&[job_name])
            .set(unix_seconds(next_run));
    }

    /// Record a run abandoned after its last allowed attempt.
    pub fn retries_exhausted(&self, job_name: &str) {
        self.retries_exhausted_total
            .with_label_values(&[job_name])
            .inc();
    }

    /// Number of live timing loops.
    pub fn active_loops(&self) -> i64 {
        self.active_loops.get()
    }

    /// Attempt count for a job and outcome label.
    pub fn executions(&self, job_name: &str, status: &str) -> u64 {
        self.executions_total
            .with_label_values(&[job_name, status])
            .get()
    }

    /// Number of durations observed for a job.
    pub fn duration_samples(&self, job_name: &str) -> u64 {
        self.duration_seconds
            .with_label_values(&[job_name])
            .get_sample_count()
    }

    /// Last recorded next-fire time for a job, as Unix seconds.
    pub fn next_execution_timestamp(&self, job_name: &str) -> f64 {
        self.next_execution_timestamp
            .with_label_values(&[job_name])
            .get()
    }

    /// Last successful attempt for a job, as Unix seconds.
    pub fn last_success_timestamp(&self, job_name: &str) -> f64 {
        self.last_success_timestamp
            .with_label_values(&[job_name])
            .get()
    }

    /// Runs of a job abandoned with retries exhausted.
    pub fn retries_exhausted_count(&self, job_name: &str) -> u64 {
        self.retries_exhausted_total
            .with_label_values(&[job_name])
            .get()
    }

    /// Encode every series in the Prometheus text exposition format.
    ///
    /// An encoding problem is logged and yields an empty body.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&families, &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_else(|e| {
            warn!(error = %e, "Encoded metrics are not valid UTF-8");
            String::new()
        })
    }
}

fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

fn metrics_error(err: prometheus::Error) -> AppError {
    AppError::with_source(ErrorKind::Internal, "Failed to set up metrics", err)
}
