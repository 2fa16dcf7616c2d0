//! Job run entities: one row per scheduled firing of a job.

pub mod model;
pub mod status;

pub use model::{JobRun, RecoverableRun, RunId};
pub use status::RunStatus;
