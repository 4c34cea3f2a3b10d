//! Channel pump.
//!
//! Bridges a message-oriented remote channel to plain byte pipes: remote
//! stdout and stderr data are written into in-memory pipes the session
//! reads from, and bytes the session writes to stdin are forwarded to the
//! channel. One pump task runs per opened channel.
//!
//! Stderr goes through a bounded queue and its own writer task, so an
//! undrained stderr pipe never holds up stdout. Once both the pipe and the
//! queue are full, further stderr is dropped.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use super::ShellStreams;

/// Capacity of each in-memory pipe.
const PIPE_CAPACITY: usize = 256 * 1024;

/// Size of the stdin forwarding buffer.
const FORWARD_BUFFER_SIZE: usize = 4096;

/// Stderr chunks queued while the stderr pipe is full.
const STDERR_BACKLOG: usize = 1024;

/// Extended data type code of stderr.
pub const STDERR_EXT: u32 = 1;

/// An event received from the remote side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Standard output bytes.
    Data(Vec<u8>),
    /// Extended data; type 1 is stderr.
    ExtendedData(Vec<u8>, u32),
    /// The remote will send no more data.
    Eof,
    /// The remote process exited.
    ExitStatus(u32),
    /// The channel was closed.
    Close,
}

/// The operations the pump needs from a remote channel.
#[async_trait]
pub trait RemoteChannel: Send + 'static {
    /// Next event, or `None` once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Forward stdin bytes.
    async fn send_data(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Signal end of stdin.
    async fn send_eof(&mut self) -> std::io::Result<()>;
}

/// Moves bytes between a [`RemoteChannel`] and the session's pipes.
pub struct ChannelPump<C: RemoteChannel> {
    channel: C,
    stdin: DuplexStream,
    stdout: Option<DuplexStream>,
    stderr: Option<mpsc::Sender<Vec<u8>>>,
    stderr_writer: Option<(mpsc::Receiver<Vec<u8>>, DuplexStream)>,
    exit: Option<oneshot::Sender<u32>>,
    dropped_stderr: usize,
}

impl<C: RemoteChannel> ChannelPump<C> {
    /// Create a pump for `channel` and the streams it feeds.
    pub fn new(channel: C) -> (Self, ShellStreams) {
        let (stdin_local, stdin_remote) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdout_remote, stdout_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_remote, stderr_local) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_tx, stderr_rx) = mpsc::channel(STDERR_BACKLOG);
        let (exit_tx, exit_rx) = oneshot::channel();

        let pump = Self {
            channel,
            stdin: stdin_remote,
            stdout: Some(stdout_remote),
            stderr: Some(stderr_tx),
            stderr_writer: Some((stderr_rx, stderr_remote)),
            exit: Some(exit_tx),
            dropped_stderr: 0,
        };

        let streams = ShellStreams {
            stdin: Box::new(stdin_local),
            stdout: Box::new(stdout_local),
            stderr: Box::new(stderr_local),
            exit: exit_rx,
        };

        (pump, streams)
    }

    /// Run until the channel closes.
    ///
    /// Returns when:
    /// - the remote closes the channel (or the connection goes away)
    /// - forwarding stdin to the remote fails
    pub async fn run(mut self) {
        if let Some((chunks, pipe)) = self.stderr_writer.take() {
            tokio::spawn(write_stderr(chunks, pipe));
        }

        let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
        let mut stdin_open = true;

        loop {
            tokio::select! {
                event = self.channel.next_event() => match event {
                    Some(ChannelEvent::Data(data)) => {
                        trace!("pump: {} bytes of stdout", data.len());
                        Self::deliver(&mut self.stdout, &data, "stdout").await;
                    }
                    Some(ChannelEvent::ExtendedData(data, STDERR_EXT)) => {
                        trace!("pump: {} bytes of stderr", data.len());
                        self.queue_stderr(data);
                    }
                    Some(ChannelEvent::ExtendedData(data, ext)) => {
                        trace!("pump: dropping {} bytes of extended data type {}", data.len(), ext);
                    }
                    Some(ChannelEvent::ExitStatus(code)) => {
                        debug!("pump: remote exited with status {}", code);
                        if let Some(tx) = self.exit.take() {
                            let _ = tx.send(code);
                        }
                    }
                    Some(ChannelEvent::Eof) => {
                        debug!("pump: remote EOF");
                        self.stdout = None;
                        self.stderr = None;
                    }
                    Some(ChannelEvent::Close) | None => {
                        debug!("pump: channel closed");
                        break;
                    }
                },
                read = self.stdin.read(&mut buf), if stdin_open => match read {
                    Ok(0) => {
                        debug!("pump: local stdin closed");
                        stdin_open = false;
                        if let Err(e) = self.channel.send_eof().await {
                            debug!("pump: failed to send EOF: {}", e);
                        }
                    }
                    Ok(n) => {
                        trace!("pump: forwarding {} bytes of stdin", n);
                        if let Err(e) = self.channel.send_data(&buf[..n]).await {
                            error!("pump: failed to forward stdin: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("pump: stdin pipe error: {}", e);
                        stdin_open = false;
                    }
                },
            }
        }

        if self.dropped_stderr > 0 {
            warn!("pump: dropped {} bytes of undrained stderr", self.dropped_stderr);
        }
    }

    async fn deliver(pipe: &mut Option<DuplexStream>, data: &[u8], name: &str) {
        let Some(writer) = pipe.as_mut() else {
            trace!("pump: {} already closed, dropping {} bytes", name, data.len());
            return;
        };
        if writer.write_all(data).await.is_err() {
            debug!("pump: {} reader dropped", name);
            *pipe = None;
        }
    }

    fn queue_stderr(&mut self, data: Vec<u8>) {
        let Some(tx) = self.stderr.as_ref() else {
            trace!("pump: stderr already closed, dropping {} bytes", data.len());
            return;
        };
        match tx.try_send(data) {
            Ok(()) => {}
            Err(TrySendError::Full(data)) => {
                if self.dropped_stderr == 0 {
                    warn!("pump: stderr is not being drained, dropping output");
                }
                self.dropped_stderr += data.len();
            }
            Err(TrySendError::Closed(_)) => {
                debug!("pump: stderr reader dropped");
                self.stderr = None;
            }
        }
    }
}

async fn write_stderr(mut chunks: mpsc::Receiver<Vec<u8>>, mut pipe: DuplexStream) {
    while let Some(chunk) = chunks.recv().await {
        if pipe.write_all(&chunk).await.is_err() {
            debug!("pump: stderr reader dropped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Recorded {
        data: Vec<u8>,
        eof: bool,
    }

    struct FakeChannel {
        events: mpsc::Receiver<ChannelEvent>,
        recorded: Arc<Mutex<Recorded>>,
    }

    #[async_trait]
    impl RemoteChannel for FakeChannel {
        async fn next_event(&mut self) -> Option<ChannelEvent> {
            self.events.recv().await
        }

        async fn send_data(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.recorded.lock().unwrap().data.extend_from_slice(data);
            Ok(())
        }

        async fn send_eof(&mut self) -> std::io::Result<()> {
            self.recorded.lock().unwrap().eof = true;
            Ok(())
        }
    }

    fn fake() -> (
        FakeChannel,
        mpsc::Sender<ChannelEvent>,
        Arc<Mutex<Recorded>>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let channel = FakeChannel {
            events: rx,
            recorded: Arc::clone(&recorded),
        };
        (channel, tx, recorded)
    }

    #[tokio::test]
    async fn test_routes_stdout_and_stderr() {
        let (channel, events, _) = fake();
        let (pump, mut streams) = ChannelPump::new(channel);
        let handle = tokio::spawn(pump.run());

        events.send(ChannelEvent::Data(b"out".to_vec())).await.unwrap();
        events
            .send(ChannelEvent::ExtendedData(b"err".to_vec(), STDERR_EXT))
            .await
            .unwrap();
        events
            .send(ChannelEvent::ExtendedData(b"ignored".to_vec(), 7))
            .await
            .unwrap();
        events.send(ChannelEvent::ExitStatus(3)).await.unwrap();
        events.send(ChannelEvent::Eof).await.unwrap();
        events.send(ChannelEvent::Close).await.unwrap();

        let mut out = Vec::new();
        streams.stdout.read_to_end(&mut out).await.unwrap();
        let mut err = Vec::new();
        streams.stderr.read_to_end(&mut err).await.unwrap();

        assert_eq!(out, b"out");
        assert_eq!(err, b"err");
        assert_eq!(streams.exit.await.unwrap(), 3);

        let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
    }

    #[tokio::test]
    async fn test_full_stderr_does_not_stall_stdout() {
        let (channel, events, _) = fake();
        let (pump, mut streams) = ChannelPump::new(channel);
        let handle = tokio::spawn(pump.run());

        let feeder = tokio::spawn(async move {
            for _ in 0..300 {
                events
                    .send(ChannelEvent::ExtendedData(vec![b'e'; 1024], STDERR_EXT))
                    .await
                    .unwrap();
            }
            events.send(ChannelEvent::Data(b"next\n".to_vec())).await.unwrap();
            events
        });

        let mut out = [0u8; 5];
        tokio::time::timeout(Duration::from_secs(2), streams.stdout.read_exact(&mut out))
            .await
            .expect("stdout stalled behind stderr")
            .unwrap();
        assert_eq!(&out, b"next\n");

        let events = feeder.await.unwrap();
        events.send(ChannelEvent::Eof).await.unwrap();

        let mut err = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), streams.stderr.read_to_end(&mut err))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(err.len(), 300 * 1024);

        events.send(ChannelEvent::Close).await.unwrap();
        let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
    }

    #[tokio::test]
    async fn test_forwards_stdin_and_eof() {
        let (channel, events, recorded) = fake();
        let (pump, mut streams) = ChannelPump::new(channel);
        let handle = tokio::spawn(pump.run());

        streams.stdin.write_all(b"ls -l\n").await.unwrap();
        streams.stdin.flush().await.unwrap();
        drop(streams.stdin);

        for _ in 0..50 {
            if recorded.lock().unwrap().eof {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        {
            let recorded = recorded.lock().unwrap();
            assert_eq!(recorded.data, b"ls -l\n");
            assert!(recorded.eof);
        }

        drop(events);
        let result = tokio::time::timeout(Duration::from_millis(500), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_channel_gone_ends_streams() {
        let (channel, events, _) = fake();
        let (pump, mut streams) = ChannelPump::new(channel);
        let handle = tokio::spawn(pump.run());

        drop(events);

        let mut out = Vec::new();
        streams.stdout.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
        assert!(streams.exit.await.is_err());

        let _ = handle.await;
    }
}
