//! One-shot command execution.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use super::result::RunOutput;
use crate::error::RemoteShellError;
use crate::transport::{BoxedReader, Connection, Connector, ShellStreams, TransportConfig};
use crate::Result;

/// Line sent after the command so that the remote shell terminates.
pub const EXIT_COMMAND: &str = "exit";

/// Read buffer size for capturing output.
const CAPTURE_BUFFER_SIZE: usize = 4096;

/// Options for a one-shot run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Bound on everything after the connection is established.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Connect, run `command`, wait for the remote shell to exit, disconnect.
///
/// Unlike an interactive session this does not guess when output is
/// complete: stdout and stderr are read to end-of-stream, which only happens
/// once the remote process has terminated.
pub async fn run_once(
    connector: &dyn Connector,
    config: &TransportConfig,
    command: &str,
    options: RunOptions,
) -> Result<RunOutput> {
    let start = Instant::now();
    let mut connection = connector.connect(config).await?;

    let result = match options.timeout {
        Some(limit) => tokio::time::timeout(limit, run_on(connection.as_mut(), command))
            .await
            .unwrap_or(Err(RemoteShellError::CommandTimeout(limit))),
        None => run_on(connection.as_mut(), command).await,
    };

    if let Err(e) = connection.close().await {
        debug!("error while closing connection: {}", e);
    }

    let (output, exit_status) = result?;
    let duration = start.elapsed();
    info!(
        "ran command on {} in {:?} (exit status {:?})",
        config.address(),
        duration,
        exit_status
    );

    Ok(RunOutput::new(
        String::from_utf8_lossy(&output).into_owned(),
        exit_status,
        duration,
    ))
}

async fn run_on(connection: &mut dyn Connection, command: &str) -> Result<(Vec<u8>, Option<u32>)> {
    let ShellStreams {
        mut stdin,
        stdout,
        stderr,
        exit,
    } = connection
        .new_interactive_session()
        .await
        .map_err(|e| match e {
            RemoteShellError::SessionSetup(_) => e,
            other => RemoteShellError::SessionSetup(other.to_string()),
        })?;

    let script = format!("{}\n{}\n", command, EXIT_COMMAND);
    stdin
        .write_all(script.as_bytes())
        .await
        .map_err(RemoteShellError::CommandSend)?;
    stdin.flush().await.map_err(RemoteShellError::CommandSend)?;
    drop(stdin);

    let output = capture(stdout, stderr).await?;
    let exit_status = exit.await.ok();
    debug!("remote shell finished with {} bytes of output", output.len());

    Ok((output, exit_status))
}

/// Read both streams to end-of-stream into one buffer, in arrival order.
async fn capture(mut stdout: BoxedReader, mut stderr: BoxedReader) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut out_buf = [0u8; CAPTURE_BUFFER_SIZE];
    let mut err_buf = [0u8; CAPTURE_BUFFER_SIZE];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                match read.map_err(RemoteShellError::CommandRead)? {
                    0 => out_open = false,
                    n => output.extend_from_slice(&out_buf[..n]),
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                match read.map_err(RemoteShellError::CommandRead)? {
                    0 => err_open = false,
                    n => output.extend_from_slice(&err_buf[..n]),
                }
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options() {
        assert!(RunOptions::default().timeout.is_none());
        assert_eq!(
            RunOptions::default().timeout(Duration::from_secs(9)).timeout,
            Some(Duration::from_secs(9))
        );
    }

    #[tokio::test]
    async fn test_capture_interleaves_both_streams() {
        let stdout: BoxedReader = Box::new(
            tokio_test::io::Builder::new()
                .read(b"out-1\n")
                .wait(Duration::from_millis(40))
                .read(b"out-2\n")
                .build(),
        );
        let stderr: BoxedReader = Box::new(
            tokio_test::io::Builder::new()
                .wait(Duration::from_millis(20))
                .read(b"err-1\n")
                .build(),
        );

        let output = capture(stdout, stderr).await.unwrap();
        assert_eq!(output, b"out-1\nerr-1\nout-2\n");
    }

    #[tokio::test]
    async fn test_capture_read_error() {
        let stdout: BoxedReader = Box::new(
            tokio_test::io::Builder::new()
                .read_error(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                ))
                .build(),
        );
        let stderr: BoxedReader = Box::new(tokio::io::empty());

        let err = capture(stdout, stderr).await.unwrap_err();
        assert!(matches!(err, RemoteShellError::CommandRead(_)));
    }
}
