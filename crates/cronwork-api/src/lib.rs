//! # cronwork-api
//!
//! HTTP surface for Cronwork built on Axum.
//!
//! Serves a liveness probe, the Prometheus scrape endpoint, and read-only
//! views of persisted job runs.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
