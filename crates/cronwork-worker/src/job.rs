//! The job unit capability and job definitions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Why a job unit attempt did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The unit ran and reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The unit returned `Ok(false)` without a message.
    #[error("job unit reported failure")]
    Unsuccessful,

    /// The unit panicked; the payload message is kept when it is a string.
    #[error("job unit panicked: {0}")]
    Panicked(String),

    /// The attempt exceeded the configured per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    /// Any other error surfaced by the unit's own collaborators.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl JobError {
    /// Convenience constructor for [`JobError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A schedulable piece of work.
///
/// `Ok(true)` is success. `Ok(false)`, `Err(_)`, and a panic are all
/// failures and consume one attempt of the run's retry budget.
#[async_trait]
pub trait JobUnit: Send + Sync + fmt::Debug + 'static {
    /// Perform the work once.
    async fn run(&self) -> Result<bool, JobError>;

    /// Implementation label reported in `cron_job_info`.
    fn label(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Adapts an async closure into a [`JobUnit`].
pub struct FnJob<F> {
    label: String,
    f: F,
}

impl<F> FnJob<F> {
    /// Wrap `f`, reporting `label` as the implementation label.
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            label: label.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnJob<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnJob").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F, Fut> JobUnit for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, JobError>> + Send + 'static,
{
    async fn run(&self) -> Result<bool, JobError> {
        (self.f)().await
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Static description of a registered job. Lives for the process lifetime.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    /// Job name; keys run records and metrics labels.
    pub name: String,
    /// Five-field cron expression.
    pub cron_expression: String,
    /// The work to perform on each firing.
    pub unit: Arc<dyn JobUnit>,
    /// Failed attempts allowed beyond the first before a run is abandoned.
    pub max_retries: i32,
    /// Whether this job reports to the metrics sink.
    pub metrics_enabled: bool,
}

impl JobDefinition {
    /// Define a job with three retries and metrics enabled.
    pub fn new(
        name: impl Into<String>,
        cron_expression: impl Into<String>,
        unit: Arc<dyn JobUnit>,
    ) -> Self {
        Self {
            name: name.into(),
            cron_expression: cron_expression.into(),
            unit,
            max_retries: 3,
            metrics_enabled: true,
        }
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enable or disable metrics reporting.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}
