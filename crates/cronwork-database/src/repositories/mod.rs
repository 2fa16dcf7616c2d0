//! Concrete PostgreSQL repositories.

pub mod job_run;
