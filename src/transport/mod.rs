//! Transport layer.
//!
//! A [`Connector`] establishes an authenticated [`Connection`] to a remote
//! host; the connection can start an interactive shell and hand out its byte
//! streams as [`ShellStreams`]. The session manager only ever talks to these
//! traits, so tests can plug in an in-memory remote.

mod pump;
mod ssh;

pub use ssh::SshConnector;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::Result;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Default bound on connect + handshake + authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Write half handed to the session.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half handed to the session.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Everything needed to reach and authenticate against a remote host.
///
/// Host key verification is a single flag: when `verify_host_strictly` is
/// set the server key must already be present in `known_hosts` (or the
/// user's default known-hosts file); otherwise any key is accepted.
pub struct TransportConfig {
    pub user: String,
    pub secret: SecretString,
    pub host: String,
    pub port: u16,
    pub verify_host_strictly: bool,
    pub known_hosts: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl TransportConfig {
    /// Password login on the default port with strict host verification.
    pub fn new(
        user: impl Into<String>,
        secret: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            secret: SecretString::from(secret.into()),
            host: host.into(),
            port: DEFAULT_PORT,
            verify_host_strictly: true,
            known_hosts: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn verify_host_strictly(mut self, strict: bool) -> Self {
        self.verify_host_strictly = strict;
        self
    }

    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("user", &self.user)
            .field("secret", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("verify_host_strictly", &self.verify_host_strictly)
            .field("known_hosts", &self.known_hosts)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Byte streams of a running remote shell.
pub struct ShellStreams {
    /// Remote standard input.
    pub stdin: BoxedWriter,
    /// Remote standard output.
    pub stdout: BoxedReader,
    /// Remote standard error.
    pub stderr: BoxedReader,
    /// Resolves with the exit status once the remote process reports one.
    /// Dropped without a value if the channel closes without reporting.
    pub exit: oneshot::Receiver<u32>,
}

impl fmt::Debug for ShellStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellStreams").finish_non_exhaustive()
    }
}

/// Establishes authenticated connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate.
    ///
    /// # Errors
    ///
    /// Every failure (resolution, refusal, host key, authentication,
    /// timeout) is reported as `RemoteShellError::Transport`.
    async fn connect(&self, config: &TransportConfig) -> Result<Box<dyn Connection>>;
}

/// An authenticated connection owned by exactly one session or run.
#[async_trait]
pub trait Connection: Send {
    /// Open a channel, start the remote shell and return its streams.
    ///
    /// # Errors
    ///
    /// Returns `RemoteShellError::SessionSetup` on failure.
    async fn new_interactive_session(&mut self) -> Result<ShellStreams>;

    /// Disconnect. Best-effort; callers log and ignore the error.
    async fn close(&mut self) -> Result<()>;
}
