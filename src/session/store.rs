//! Handle table mapping session tokens to live sessions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{Session, SessionId};
use crate::error::RemoteShellError;
use crate::Result;

/// Thread-safe table of open sessions, keyed by their tokens.
///
/// Callers hold only [`SessionId`]s; the table resolves them to the shared
/// session. Lookups clone the `Arc` and release the table lock immediately,
/// so a long-running `send` on one session never blocks access to another.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    /// Create a new empty session store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register an opened session and return its token.
    pub fn insert(&self, session: Session) -> Result<SessionId> {
        let id = session.id();
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RemoteShellError::LockPoisoned)?;

        sessions.insert(id, Arc::new(session));
        Ok(id)
    }

    /// Resolve a token.
    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;

        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteShellError::SessionNotFound(id.to_string()))
    }

    /// Check if a token is registered.
    pub fn contains(&self, id: &SessionId) -> Result<bool> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        Ok(sessions.contains_key(id))
    }

    /// Unregister a token, returning its session.
    pub fn remove(&self, id: &SessionId) -> Result<Arc<Session>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RemoteShellError::LockPoisoned)?;

        sessions
            .remove(id)
            .ok_or_else(|| RemoteShellError::SessionNotFound(id.to_string()))
    }

    /// Unregister every session.
    pub fn drain_all(&self) -> Result<Vec<Arc<Session>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        Ok(sessions.drain().map(|(_, session)| session).collect())
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Registered tokens in ascending order.
    pub fn list_ids(&self) -> Result<Vec<SessionId>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        let mut ids: Vec<SessionId> = sessions.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
