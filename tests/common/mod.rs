//! In-memory remote shell used by the integration tests.
//!
//! The fake shell understands a handful of commands:
//!
//! - `echo <text>` writes `<text>\n` to stdout
//! - `emit <n> <tag>` writes `n` copies of the byte `<tag>` to stdout
//! - `warn <text>` writes `<text>\n` to stderr
//! - `delay <ms> <text>` waits `ms` milliseconds, then writes `<text>\n`
//! - `hang` writes nothing
//! - `exit [status]` reports the status and hangs up
//!
//! Anything else produces `unknown: <line>` on stderr.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, DuplexStream, ReadBuf};
use tokio::sync::oneshot;

use remote_shell::{
    Connection, Connector, RemoteShellError, Result, ShellStreams, TransportConfig,
};

pub const BANNER: &str = "Last login: Thu Oct 15 09:12:44 2026 from 10.0.0.1\n$ ";
pub const PASSWORD: &str = "letmein";
pub const UNREACHABLE_HOST: &str = "unreachable.invalid";

const PIPE_CAPACITY: usize = 64 * 1024;

/// What the stub observed.
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub shells: AtomicUsize,
    pub closes: AtomicUsize,
    /// Bytes the remote shell received on stdin.
    pub bytes_received: AtomicUsize,
    /// Lines the remote shell executed.
    pub commands: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct StubConnector {
    pub counters: Arc<Counters>,
    fail_setup: bool,
}

impl StubConnector {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_setup: false,
        }
    }

    /// Connections authenticate but refuse to start a shell.
    pub fn failing_setup() -> Self {
        Self {
            fail_setup: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn connect(&self, config: &TransportConfig) -> Result<Box<dyn Connection>> {
        if config.host == UNREACHABLE_HOST {
            return Err(RemoteShellError::Transport(format!(
                "{}: connection refused",
                config.address()
            )));
        }
        if config.secret.expose_secret() != PASSWORD {
            return Err(RemoteShellError::Transport(format!(
                "{}: authentication failed for {}",
                config.address(),
                config.user
            )));
        }

        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            counters: Arc::clone(&self.counters),
            fail_setup: self.fail_setup,
        }))
    }
}

pub fn target() -> TransportConfig {
    TransportConfig::new("deploy", PASSWORD, "stub.local").verify_host_strictly(false)
}

struct StubConnection {
    counters: Arc<Counters>,
    fail_setup: bool,
}

#[async_trait]
impl Connection for StubConnection {
    async fn new_interactive_session(&mut self) -> Result<ShellStreams> {
        if self.fail_setup {
            return Err(RemoteShellError::SessionSetup(
                "shell request rejected".into(),
            ));
        }

        let (stdin, remote_stdin) = tokio::io::duplex(PIPE_CAPACITY);
        let (remote_stdout, stdout) = tokio::io::duplex(PIPE_CAPACITY);
        let (remote_stderr, stderr) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit) = oneshot::channel();

        self.counters.shells.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(fake_shell(
            remote_stdin,
            remote_stdout,
            remote_stderr,
            exit_tx,
            Arc::clone(&self.counters),
        ));

        Ok(ShellStreams {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn fake_shell(
    stdin: DuplexStream,
    mut stdout: DuplexStream,
    mut stderr: DuplexStream,
    exit: oneshot::Sender<u32>,
    counters: Arc<Counters>,
) {
    if stdout.write_all(BANNER.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(stdin).lines();
    let mut status = 0;

    while let Ok(Some(line)) = lines.next_line().await {
        counters
            .bytes_received
            .fetch_add(line.len() + 1, Ordering::SeqCst);
        counters.commands.fetch_add(1, Ordering::SeqCst);

        let (name, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let written = match name {
            "echo" => stdout.write_all(format!("{}\n", rest).as_bytes()).await,
            "emit" => {
                let (count, tag) = rest.split_once(' ').unwrap_or(("0", "x"));
                let count: usize = count.parse().unwrap_or(0);
                let tag = tag.as_bytes().first().copied().unwrap_or(b'x');
                stdout.write_all(&vec![tag; count]).await
            }
            "warn" => stderr.write_all(format!("{}\n", rest).as_bytes()).await,
            "delay" => {
                let (ms, text) = rest.split_once(' ').unwrap_or((rest, ""));
                let ms: u64 = ms.parse().unwrap_or(0);
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                stdout.write_all(format!("{}\n", text).as_bytes()).await
            }
            "hang" => Ok(()),
            "exit" => {
                status = rest.trim().parse().unwrap_or(0);
                break;
            }
            _ => {
                stderr
                    .write_all(format!("unknown: {}\n", line).as_bytes())
                    .await
            }
        };
        if written.is_err() {
            return;
        }
    }

    let _ = exit.send(status);
}

/// Reader that hands out scripted chunks and then never becomes ready.
///
/// `None` in the script stands for a clean end-of-stream.
pub struct ScriptedReader {
    script: std::collections::VecDeque<Option<Vec<u8>>>,
    polls: Arc<AtomicUsize>,
}

impl ScriptedReader {
    pub fn new(script: Vec<Option<Vec<u8>>>) -> (Self, Arc<AtomicUsize>) {
        let polls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script: script.into(),
                polls: Arc::clone(&polls),
            },
            polls,
        )
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(Some(chunk)) => {
                assert!(chunk.len() <= buf.remaining(), "chunk larger than read buffer");
                buf.put_slice(&chunk);
                Poll::Ready(Ok(()))
            }
            Some(None) => Poll::Ready(Ok(())),
            None => Poll::Pending,
        }
    }
}
