//! Session lifecycle state machine.

/// Lifecycle state of an interactive session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Shell is running and no command is in flight.
    #[default]
    Open,
    /// A command has been written and its output is being drained.
    Busy,
    /// A send, read, timeout or cancellation left the stream positions unknown.
    Broken,
    /// Streams and connection have been released.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Open -> Busy
    /// - Busy -> Open
    /// - Open | Busy -> Broken
    /// - any non-closed state -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Open, Busy)
                | (Busy, Open)
                | (Open, Broken)
                | (Busy, Broken)
                | (Open, Closed)
                | (Busy, Closed)
                | (Broken, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::RemoteShellError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Check if session can accept a command.
    pub fn can_send(&self) -> bool {
        matches!(self, SessionState::Open)
    }
}
