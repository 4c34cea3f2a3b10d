//! Interactive remote shell session.

use std::fmt;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DrainConfig, SessionContext, SessionId, SessionState};
use crate::error::RemoteShellError;
use crate::transport::{Connection, Connector, ShellStreams, TransportConfig};
use crate::Result;

/// A live remote shell.
///
/// The session owns its connection and the shell's streams. Every operation
/// takes the session lock, so at most one command is in flight and concurrent
/// callers are served one after another.
pub struct Session {
    id: SessionId,
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    streams: Option<ShellStreams>,
    connection: Option<Box<dyn Connection>>,
    drain: DrainConfig,
    context: SessionContext,
}

impl Session {
    /// Connect with `connector` and open a session on the new connection.
    pub async fn connect(
        connector: &dyn Connector,
        config: &TransportConfig,
        drain: DrainConfig,
    ) -> Result<(Self, String)> {
        let connection = connector.connect(config).await?;
        Self::open(connection, drain).await
    }

    /// Start an interactive shell on an authenticated connection.
    ///
    /// Returns the session and the shell's startup output (possibly empty).
    /// On failure the connection is closed and nothing is written to the
    /// remote.
    pub async fn open(
        mut connection: Box<dyn Connection>,
        drain: DrainConfig,
    ) -> Result<(Self, String)> {
        let mut streams = match connection.new_interactive_session().await {
            Ok(streams) => streams,
            Err(e) => {
                release(connection).await;
                return Err(setup_error(e));
            }
        };

        let cancel = CancellationToken::new();
        let banner = match drain.drain(&mut streams.stdout, &cancel).await {
            Ok(banner) => banner,
            Err(e) => {
                drop(streams);
                release(connection).await;
                return Err(RemoteShellError::SessionSetup(format!(
                    "failed to read login output: {}",
                    e
                )));
            }
        };

        let id = SessionId::next();
        let mut context = SessionContext::new();
        context.record_login(banner.len());
        info!(session = %id, banner_bytes = banner.len(), "session opened");

        let session = Self {
            id,
            cancel,
            inner: Mutex::new(Inner {
                state: SessionState::Open,
                streams: Some(streams),
                connection: Some(connection),
                drain,
                context,
            }),
        };

        Ok((session, String::from_utf8_lossy(&banner).into_owned()))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state. Reports `Busy` while another operation holds the lock.
    pub fn state(&self) -> SessionState {
        self.inner
            .try_lock()
            .map(|inner| inner.state)
            .unwrap_or(SessionState::Busy)
    }

    /// Snapshot of the session's activity record.
    pub async fn context(&self) -> SessionContext {
        self.inner.lock().await.context.clone()
    }

    /// Write `command` followed by a newline and return the output drained
    /// after it.
    ///
    /// # Errors
    ///
    /// - `SessionClosed` / `SessionBroken` without touching the streams
    /// - `CommandSend`, `CommandRead`, `CommandTimeout`, `Cancelled`; each
    ///   leaves the session broken and discards any partial output
    pub async fn send(&self, command: &str) -> Result<String> {
        let mut inner = self.inner.lock().await;

        if !inner.state.can_send() {
            return Err(match inner.state {
                SessionState::Closed => RemoteShellError::SessionClosed,
                _ => RemoteShellError::SessionBroken(self.id),
            });
        }

        if self.cancel.is_cancelled() {
            inner.state.transition_to(SessionState::Broken)?;
            return Err(RemoteShellError::SessionBroken(self.id));
        }

        inner.state.transition_to(SessionState::Busy)?;
        inner.context.record_sent(command);
        debug!(session = %self.id, command, "sending command");

        match inner.exchange(command, &self.cancel).await {
            Ok(output) => {
                inner.state.transition_to(SessionState::Open)?;
                inner.context.record_output(output.len());
                debug!(session = %self.id, bytes = output.len(), "command output drained");
                Ok(String::from_utf8_lossy(&output).into_owned())
            }
            Err(e) if e.breaks_session() => {
                inner.state.transition_to(SessionState::Broken)?;
                inner.context.record_failure();
                warn!(session = %self.id, error = %e, "command failed, session is now broken");
                Err(e)
            }
            Err(e) => {
                inner.state.transition_to(SessionState::Open)?;
                inner.context.record_failure();
                Err(e)
            }
        }
    }

    /// Return whatever the shell has already written to stderr.
    ///
    /// Never waits for new output.
    pub async fn drain_errors(&self) -> Result<String> {
        let mut inner = self.inner.lock().await;
        let streams = inner
            .streams
            .as_mut()
            .ok_or(RemoteShellError::SessionClosed)?;

        let bytes = DrainConfig::available()
            .drain(&mut streams.stderr, &CancellationToken::new())
            .await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Abort a pending command.
    ///
    /// A `send` blocked in its drain returns `Cancelled`; the session is
    /// broken afterwards and only `close` remains useful.
    pub fn cancel(&self) {
        debug!(session = %self.id, "cancel requested");
        self.cancel.cancel();
    }

    /// Release the shell and the connection. Calling it again is a no-op.
    ///
    /// A pending `send` is cancelled first so that closing never waits on
    /// the remote.
    pub async fn close(&self) {
        self.cancel.cancel();
        let mut inner = self.inner.lock().await;

        if inner.state.is_terminal() {
            debug!(session = %self.id, "session already closed");
            return;
        }

        let _ = inner.state.transition_to(SessionState::Closed);
        drop(inner.streams.take());

        if let Some(connection) = inner.connection.take() {
            release(connection).await;
        }

        info!(
            session = %self.id,
            commands = inner.context.commands_completed(),
            "session closed"
        );
    }
}

impl Inner {
    async fn exchange(&mut self, command: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let streams = self
            .streams
            .as_mut()
            .ok_or(RemoteShellError::SessionClosed)?;

        let line = format!("{}\n", command);
        let write = async {
            streams.stdin.write_all(line.as_bytes()).await?;
            streams.stdin.flush().await
        };

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RemoteShellError::Cancelled),
            res = bounded_write(self.drain.command_timeout, write) => res,
        };
        match written {
            Some(res) => res.map_err(RemoteShellError::CommandSend)?,
            None => {
                return Err(RemoteShellError::CommandTimeout(
                    self.drain.command_timeout.unwrap_or_default(),
                ))
            }
        }

        self.drain.drain(&mut streams.stdout, cancel).await
    }
}

async fn bounded_write<F>(
    limit: Option<std::time::Duration>,
    write: F,
) -> Option<std::io::Result<()>>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, write).await.ok(),
        None => Some(write.await),
    }
}

fn setup_error(e: RemoteShellError) -> RemoteShellError {
    match e {
        RemoteShellError::SessionSetup(_) => e,
        other => RemoteShellError::SessionSetup(other.to_string()),
    }
}

async fn release(mut connection: Box<dyn Connection>) {
    if let Err(e) = connection.close().await {
        debug!("error while closing connection: {}", e);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if !inner.state.is_terminal() {
            warn!(session = %self.id, "session dropped without close");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
