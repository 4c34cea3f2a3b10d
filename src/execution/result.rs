//! One-shot run results.

use std::time::Duration;

/// Outcome of a one-shot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// Standard output and standard error, interleaved in arrival order.
    pub output: String,
    /// Exit status reported by the remote, if any.
    pub exit_status: Option<u32>,
    /// Wall-clock time from connect to exit.
    pub duration: Duration,
}

impl RunOutput {
    pub fn new(output: String, exit_status: Option<u32>, duration: Duration) -> Self {
        Self {
            output,
            exit_status,
            duration,
        }
    }

    /// Whether the remote reported exit status zero.
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Output lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines()
    }
}
