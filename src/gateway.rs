//! Caller-facing API.
//!
//! Embedders (script hosts, the CLI) address sessions by [`SessionId`]
//! tokens and receive every failure as a human-readable message. The typed
//! [`RemoteShellError`](crate::RemoteShellError) taxonomy stays inside the
//! crate.

use std::sync::Arc;

use tracing::debug;

use crate::execution::{self, RunOptions};
use crate::session::{DrainConfig, Session, SessionId, SessionStore};
use crate::transport::{Connector, SshConnector, TransportConfig};

/// Entry point owning the connector, the drain settings and the session table.
pub struct Gateway {
    connector: Arc<dyn Connector>,
    drain: DrainConfig,
    run_options: RunOptions,
    sessions: SessionStore,
}

impl Gateway {
    /// Gateway over SSH with default drain settings.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(SshConnector::new()))
    }

    /// Gateway over an arbitrary transport.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            drain: DrainConfig::default(),
            run_options: RunOptions::default(),
            sessions: SessionStore::new(),
        }
    }

    /// Drain settings for sessions opened from now on.
    pub fn drain_config(mut self, drain: DrainConfig) -> Self {
        self.drain = drain;
        self
    }

    pub fn run_options(mut self, options: RunOptions) -> Self {
        self.run_options = options;
        self
    }

    /// Open an interactive session. Returns its token and the login output.
    pub async fn open(&self, config: &TransportConfig) -> Result<(SessionId, String), String> {
        let (session, banner) = Session::connect(self.connector.as_ref(), config, self.drain)
            .await
            .map_err(|e| e.to_string())?;
        let id = self.sessions.insert(session).map_err(|e| e.to_string())?;
        Ok((id, banner))
    }

    /// Send a command on an open session and return its output.
    pub async fn send(&self, id: &SessionId, command: &str) -> Result<String, String> {
        let session = self.sessions.get(id).map_err(|e| e.to_string())?;
        session.send(command).await.map_err(|e| e.to_string())
    }

    /// Stderr the session has produced so far.
    pub async fn errors(&self, id: &SessionId) -> Result<String, String> {
        let session = self.sessions.get(id).map_err(|e| e.to_string())?;
        session.drain_errors().await.map_err(|e| e.to_string())
    }

    /// Abort the command pending on a session.
    pub fn cancel(&self, id: &SessionId) -> Result<(), String> {
        let session = self.sessions.get(id).map_err(|e| e.to_string())?;
        session.cancel();
        Ok(())
    }

    /// Close a session and forget its token.
    pub async fn close(&self, id: &SessionId) -> Result<(), String> {
        let session = self.sessions.remove(id).map_err(|e| e.to_string())?;
        session.close().await;
        Ok(())
    }

    /// Close every open session.
    pub async fn close_all(&self) {
        match self.sessions.drain_all() {
            Ok(sessions) => {
                debug!("closing {} sessions", sessions.len());
                for session in sessions {
                    session.close().await;
                }
            }
            Err(e) => debug!("cannot close sessions: {}", e),
        }
    }

    /// Run one command on a fresh connection and return its combined output.
    pub async fn run_once(&self, config: &TransportConfig, command: &str) -> Result<String, String> {
        execution::run_once(self.connector.as_ref(), config, command, self.run_options)
            .await
            .map(|out| out.output)
            .map_err(|e| e.to_string())
    }

    /// Tokens of all open sessions.
    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.list_ids().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sessions.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
