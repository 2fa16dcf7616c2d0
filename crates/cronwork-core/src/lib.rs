//! # cronwork-core
//!
//! Core crate for Cronwork. Contains the configuration schema and the
//! unified error system shared by the scheduling engine, the run store,
//! and the HTTP surface.
//!
//! This crate has **no** internal dependencies on other Cronwork crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
