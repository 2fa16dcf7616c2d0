//! Route definitions for the Cronwork HTTP surface.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the router with every route and the request tracing layer.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/jobs/{name}/runs", get(handlers::runs::list_job_runs))
        .route("/runs/{id}", get(handlers::runs::get_run));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::metrics::metrics))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
