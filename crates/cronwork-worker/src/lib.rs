//! Scheduled job execution for Cronwork.
//!
//! This crate provides:
//! - Five-field cron schedules and per-job timing loops
//! - A run executor with persisted state transitions and fixed-backoff retries
//! - Crash recovery of runs left incomplete by a previous process
//! - Prometheus metrics describing execution outcomes and timing
//! - Built-in command and HTTP job units

pub mod executor;
pub mod job;
pub mod jobs;
pub mod metrics;
pub mod schedule;
pub mod scheduler;

pub use executor::{RetryPolicy, RunExecutor, RunOutcome};
pub use job::{FnJob, JobDefinition, JobError, JobUnit};
pub use jobs::build_job_definition;
pub use metrics::CronJobMetrics;
pub use schedule::CronSchedule;
pub use scheduler::{CronScheduler, JobHandle};
