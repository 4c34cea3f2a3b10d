//! One-shot remote execution.
//!
//! Connects, runs a single command followed by `exit`, and waits for the
//! remote shell to terminate before returning the combined output. Process
//! exit is the completion signal here, so no drain heuristic is involved.
//!
//! # Example
//!
//! ```no_run
//! use remote_shell::execution::{run_once, RunOptions};
//! use remote_shell::transport::{SshConnector, TransportConfig};
//!
//! # async fn demo() -> remote_shell::Result<()> {
//! let config = TransportConfig::new("deploy", "secret", "build01.example.com");
//! let out = run_once(&SshConnector::new(), &config, "uname -a", RunOptions::default()).await?;
//! println!("{}", out.output);
//! # Ok(())
//! # }
//! ```

mod result;
mod runner;

pub use result::RunOutput;
pub use runner::{run_once, RunOptions, EXIT_COMMAND};
