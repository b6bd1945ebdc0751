//! Error taxonomy for one-shot executions.

use providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    /// Configuration problems: provider disabled, executable unresolvable.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The process could not be started at all. Distinct from the command
    /// starting and then failing.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero.
    #[error("command failed with exit code {code}{}", format_stderr(.stderr))]
    CommandFailed { code: i32, stderr: String },

    /// No completion within the configured window; the process was killed.
    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    /// The caller cancelled the request; the process was killed.
    #[error("command was cancelled")]
    Cancelled,

    /// I/O failure while feeding stdin or draining output.
    #[error("subprocess i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
