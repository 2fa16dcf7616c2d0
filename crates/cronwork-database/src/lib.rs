//! # cronwork-database
//!
//! Durable storage for job runs. Defines the [`RunStore`] contract used by
//! the scheduling engine and its two backends: a PostgreSQL repository and
//! a process-local store.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use memory::MemoryRunStore;
pub use repositories::job_run::JobRunRepository;
pub use store::{RunStore, build_run_store};
