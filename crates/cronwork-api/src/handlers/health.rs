//! Health check handler.

use axum::Json;
use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `200`; the endpoint answering at all is the liveness signal.
    pub status: u16,
    /// Coarse human-readable uptime.
    pub uptime: String,
    /// Current time, RFC 3339 UTC.
    pub date: String,
    /// Free-form status line.
    pub message: String,
    /// Timing loops currently running.
    pub active_jobs: i64,
    /// `"ok"` or `"unreachable"`.
    pub store: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = match state.store.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Run store health check failed");
            "unreachable"
        }
    };

    Json(HealthResponse {
        status: 200,
        uptime: format_uptime(state.started_at.elapsed().as_secs_f64()),
        date: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        message: format!("{} is running.", state.service_name),
        active_jobs: state.metrics.active_loops(),
        store: store.to_string(),
    })
}

/// Render uptime at the coarsest sensible unit, truncating.
pub fn format_uptime(seconds: f64) -> String {
    if seconds < 5.0 {
        "just now".to_string()
    } else if seconds < 60.0 {
        format!("{} seconds", seconds as u64)
    } else if seconds < 3600.0 {
        format!("{} minutes", (seconds / 60.0) as u64)
    } else {
        format!("{} hours", (seconds / 3600.0) as u64)
    }
}
