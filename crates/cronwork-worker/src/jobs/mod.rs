//! Built-in job units and their construction from configuration.

pub mod command;
pub mod http;

use std::sync::Arc;

pub use command::CommandJob;
pub use http::HttpJob;

use cronwork_core::config::{JobConfig, JobKind, MetricsConfig, SchedulerConfig};
use cronwork_core::error::AppError;
use cronwork_core::result::AppResult;

use crate::job::{JobDefinition, JobUnit};

/// Build a job definition from a `[[jobs]]` entry.
pub fn build_job_definition(
    job: &JobConfig,
    scheduler: &SchedulerConfig,
    metrics: &MetricsConfig,
) -> AppResult<JobDefinition> {
    let unit: Arc<dyn JobUnit> = match job.kind {
        JobKind::Command => {
            let program = job.command.as_deref().ok_or_else(|| {
                AppError::configuration(format!("Job '{}': command jobs need 'command'", job.name))
            })?;
            Arc::new(CommandJob::new(program, job.args.clone()))
        }
        JobKind::Http => {
            let url = job.url.as_deref().ok_or_else(|| {
                AppError::configuration(format!("Job '{}': http jobs need 'url'", job.name))
            })?;
            Arc::new(HttpJob::new(url, scheduler.attempt_timeout())?)
        }
    };

    Ok(JobDefinition::new(job.name.clone(), job.cron.clone(), unit)
        .with_max_retries(job.max_retries.unwrap_or(scheduler.default_max_retries))
        .with_metrics(metrics.enabled && job.metrics_enabled))
}
