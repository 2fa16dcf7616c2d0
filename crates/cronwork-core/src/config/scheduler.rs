//! Scheduling engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry, timeout, and shutdown settings shared by every job's timing loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether job loops are started at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fixed wait between a failed attempt and the next retry.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
    /// Retry budget applied to jobs that do not set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: i32,
    /// Upper bound on a single attempt. `None` lets a unit run forever.
    #[serde(default)]
    pub attempt_timeout_seconds: Option<u64>,
    /// How long shutdown waits for in-flight attempts.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl SchedulerConfig {
    /// Backoff interval as a [`Duration`].
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_seconds)
    }

    /// Per-attempt timeout as a [`Duration`], if configured.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_seconds.map(Duration::from_secs)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_backoff_seconds: default_retry_backoff(),
            default_max_retries: default_max_retries(),
            attempt_timeout_seconds: None,
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

/// Metrics exposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether jobs report to the metrics sink unless they opt out.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_max_retries() -> i32 {
    3
}

fn default_shutdown_grace() -> u64 {
    30
}
