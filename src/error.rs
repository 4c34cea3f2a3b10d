//! Error types for remote-shell.

use std::time::Duration;

use thiserror::Error;

/// Main error type for remote-shell operations.
#[derive(Error, Debug)]
pub enum RemoteShellError {
    /// Connecting or authenticating to the remote host failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection was established but the interactive shell could not be started.
    #[error("session setup failed: {0}")]
    SessionSetup(String),

    /// Writing a command to the remote shell failed.
    #[error("failed to send command: {0}")]
    CommandSend(#[source] std::io::Error),

    /// Reading command output failed with something other than a clean end-of-stream.
    #[error("failed to read command output: {0}")]
    CommandRead(#[source] std::io::Error),

    /// No completion was observed within the configured bound.
    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// A pending drain was cancelled by the caller.
    #[error("command cancelled")]
    Cancelled,

    /// The session was closed.
    #[error("session is closed")]
    SessionClosed,

    /// An earlier failure left the session with unknown stream positions.
    #[error("session {0} is broken and must be closed")]
    SessionBroken(crate::session::SessionId),

    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for remote-shell operations.
pub type Result<T> = std::result::Result<T, RemoteShellError>;

impl RemoteShellError {
    /// Whether this error leaves the session unusable.
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            Self::CommandSend(_) | Self::CommandRead(_) | Self::CommandTimeout(_) | Self::Cancelled
        )
    }
}
