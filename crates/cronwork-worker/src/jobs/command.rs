//! Job unit that runs a local program.

use async_trait::async_trait;
use tokio::process::Command;
use tracing;

use crate::job::{JobError, JobUnit};

/// Characters of stderr kept in a failure message.
const STDERR_TAIL_CHARS: usize = 512;

/// Runs a program; a zero exit status is success.
///
/// The child is killed if the attempt is dropped (e.g. on timeout).
#[derive(Debug, Clone)]
pub struct CommandJob {
    program: String,
    args: Vec<String>,
}

impl CommandJob {
    /// Create a unit running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl JobUnit for CommandJob {
    async fn run(&self) -> Result<bool, JobError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| JobError::failed(format!("Failed to spawn '{}': {}", self.program, e)))?;

        if output.status.success() {
            tracing::debug!(
                program = %self.program,
                stdout_bytes = output.stdout.len(),
                "Command finished"
            );
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail = match stderr.char_indices().rev().nth(STDERR_TAIL_CHARS) {
            Some((idx, _)) => &stderr[idx..],
            None => stderr,
        };

        Err(JobError::failed(if tail.is_empty() {
            format!("'{}' exited with {}", self.program, output.status)
        } else {
            format!("'{}' exited with {}: {}", self.program, output.status, tail)
        }))
    }

    fn label(&self) -> &str {
        "CommandJob"
    }
}
