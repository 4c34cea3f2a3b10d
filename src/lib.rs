//! # remote-shell
//!
//! Remote command execution over SSH.
//!
//! This crate keeps interactive shells open on remote hosts and lets callers
//! send commands to them one at a time, returning each command's output. It
//! also offers a one-shot mode that connects, runs a single command, waits
//! for the remote shell to exit, and disconnects.
//!
//! ## Features
//!
//! - **Persistent sessions**: Login once, send many commands, read each output
//! - **Serialized I/O**: Commands on one session never interleave
//! - **Pluggable transport**: SSH by default, any [`Connector`] in tests
//! - **Handle table**: Sessions addressed by opaque [`SessionId`] tokens
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_shell::{Gateway, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     remote_shell::logging::try_init().ok();
//!
//!     let gateway = Gateway::new();
//!     let target = TransportConfig::new("deploy", "secret", "build01.example.com");
//!
//!     let (id, banner) = gateway.open(&target).await?;
//!     print!("{}", banner);
//!
//!     let listing = gateway.send(&id, "ls -la /srv").await?;
//!     print!("{}", listing);
//!
//!     gateway.close(&id).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod gateway;
pub mod logging;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use error::{RemoteShellError, Result};
pub use execution::{run_once, RunOptions, RunOutput};
pub use gateway::Gateway;
pub use session::{
    DrainConfig, DrainStrategy, Session, SessionContext, SessionId, SessionState, SessionStore,
};
pub use transport::{Connection, Connector, ShellStreams, SshConnector, TransportConfig};
