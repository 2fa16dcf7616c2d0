//! Shared application state threaded through every handler.

use std::sync::Arc;
use std::time::Instant;

use cronwork_database::RunStore;
use cronwork_worker::CronJobMetrics;

/// State shared by all HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Durable run records.
    pub store: Arc<dyn RunStore>,
    /// Process-wide execution metrics.
    pub metrics: Arc<CronJobMetrics>,
    /// When the process came up; drives the uptime in `/health`.
    pub started_at: Instant,
    /// Name reported in the health message.
    pub service_name: String,
}

impl AppState {
    /// Build state, stamping the start time as now.
    pub fn new(
        store: Arc<dyn RunStore>,
        metrics: Arc<CronJobMetrics>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            metrics,
            started_at: Instant::now(),
            service_name: service_name.into(),
        }
    }
}
