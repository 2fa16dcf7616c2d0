//! Read-only views of persisted runs.

use axum::Json;
use axum::extract::{Path, State};

use cronwork_core::error::AppError;
use cronwork_entity::job_run::{JobRun, RunId};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/jobs/{name}/runs
pub async fn list_job_runs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<JobRun>>, ApiError> {
    let runs = state.store.list_by_job(&name).await?;
    Ok(Json(runs))
}

/// GET /api/runs/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobRun>, ApiError> {
    let id = parse_run_id(&id)?;
    let run = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Run {id} not found")))?;
    Ok(Json(run))
}

/// Parses a run id from a path segment.
fn parse_run_id(s: &str) -> Result<RunId, AppError> {
    s.parse::<RunId>()
        .map_err(|_| AppError::validation(format!("Invalid run id: {s}")))
}
