//! # cronwork-entity
//!
//! Domain entity models for Cronwork. Every struct in this crate
//! represents a database table row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and database
//! entities additionally derive `sqlx::FromRow`.

pub mod job_run;

pub use job_run::{JobRun, RecoverableRun, RunId, RunStatus};
