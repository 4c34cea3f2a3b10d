//! Per-session activity tracking.

use std::time::{Duration, Instant};

/// Activity record of an interactive session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    opened_at: Instant,
    last_activity: Instant,
    /// Last command written to the shell.
    last_command: Option<String>,
    /// Commands whose output was fully drained.
    commands_completed: u64,
    /// Output bytes returned to callers, login banner included.
    bytes_received: u64,
    /// Failures that broke the session (at most one in practice).
    failures: u64,
}

impl SessionContext {
    /// Start tracking a session opened now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            opened_at: now,
            last_activity: now,
            last_command: None,
            commands_completed: 0,
            bytes_received: 0,
            failures: 0,
        }
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn commands_completed(&self) -> u64 {
        self.commands_completed
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Time since the session was opened.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Time since the last write or completed drain.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub(crate) fn record_login(&mut self, banner_len: usize) {
        self.bytes_received += banner_len as u64;
        self.last_activity = Instant::now();
    }

    pub(crate) fn record_sent(&mut self, command: &str) {
        self.last_command = Some(command.to_string());
        self.last_activity = Instant::now();
    }

    pub(crate) fn record_output(&mut self, len: usize) {
        self.commands_completed += 1;
        self.bytes_received += len as u64;
        self.last_activity = Instant::now();
    }

    pub(crate) fn record_failure(&mut self) {
        self.failures += 1;
        self.last_activity = Instant::now();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
