//! Job definitions loaded from configuration.

use serde::{Deserialize, Serialize};

/// Built-in job unit kinds that can be declared in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Run a local program; success is a zero exit status.
    Command,
    /// Issue an HTTP GET; success is a 2xx response.
    Http,
}

/// A single `[[jobs]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name, used as the run store key and metrics label.
    pub name: String,
    /// Five-field cron expression.
    pub cron: String,
    /// Which built-in unit executes the job.
    pub kind: JobKind,
    /// Program to execute (`command` jobs).
    #[serde(default)]
    pub command: Option<String>,
    /// Program arguments (`command` jobs).
    #[serde(default)]
    pub args: Vec<String>,
    /// Target URL (`http` jobs).
    #[serde(default)]
    pub url: Option<String>,
    /// Retry budget; falls back to `scheduler.default_max_retries`.
    #[serde(default)]
    pub max_retries: Option<i32>,
    /// Whether this job reports to the metrics sink.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_true() -> bool {
    true
}
