//! Output draining.
//!
//! The remote shell gives no end-of-response marker, so a command's output
//! is considered complete when a completion heuristic fires:
//!
//! - [`DrainStrategy::ChunkShortfall`]: a read returned fewer bytes than the
//!   chunk size, taken as "the remote paused". Output produced in exact
//!   multiples of the chunk size followed by silence never trips it, so each
//!   read is bounded by `read_timeout`.
//! - [`DrainStrategy::QuietPeriod`]: no byte arrived for the quiet period.
//!   The quiet period only runs between bytes; before the first byte the
//!   drain waits up to `first_output`, so a slow command is not mistaken for
//!   a silent one.
//!
//! Both stop on a clean end-of-stream, and both honour an optional overall
//! deadline (`command_timeout`) and a cancellation token.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::RemoteShellError;
use crate::Result;

/// Default read chunk size (the `C` of the shortfall heuristic).
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default initial capacity of the accumulation buffer.
pub const DEFAULT_INITIAL_CAPACITY: usize = 4096;

/// Default quiet period for [`DrainStrategy::QuietPeriod`].
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(250);

/// Default wait for the first byte under [`DrainStrategy::QuietPeriod`].
pub const DEFAULT_FIRST_OUTPUT: Duration = Duration::from_secs(3);

/// Default bound on a single chunk read under [`DrainStrategy::ChunkShortfall`].
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for draining one command's output.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Rule deciding that the remote has finished producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStrategy {
    /// Stop after a read shorter than the chunk size.
    ChunkShortfall,
    /// Stop once no byte has arrived for the given duration.
    QuietPeriod(Duration),
}

impl Default for DrainStrategy {
    fn default() -> Self {
        Self::QuietPeriod(DEFAULT_QUIET_PERIOD)
    }
}

/// What happens when the current read wait elapses.
#[derive(Debug, Clone, Copy)]
enum Expiry {
    Complete,
    TimedOut(Duration),
}

/// Drain settings for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainConfig {
    pub chunk_size: usize,
    pub initial_capacity: usize,
    pub strategy: DrainStrategy,
    /// Bound on one chunk read (shortfall strategy only).
    pub read_timeout: Option<Duration>,
    /// Wait for the first byte (quiet strategy only). `None` starts the
    /// quiet period at the write.
    pub first_output: Option<Duration>,
    /// Bound on the whole drain.
    pub command_timeout: Option<Duration>,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            strategy: DrainStrategy::default(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            first_output: Some(DEFAULT_FIRST_OUTPUT),
            command_timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

impl DrainConfig {
    /// Reference behaviour: 1024-byte chunks, stop on the first short read.
    pub fn chunk_shortfall() -> Self {
        Self {
            strategy: DrainStrategy::ChunkShortfall,
            ..Self::default()
        }
    }

    /// Stop after `period` without output.
    pub fn quiet_period(period: Duration) -> Self {
        Self {
            strategy: DrainStrategy::QuietPeriod(period),
            ..Self::default()
        }
    }

    /// Collect only what is already buffered, never waiting for more.
    pub fn available() -> Self {
        Self {
            strategy: DrainStrategy::QuietPeriod(Duration::ZERO),
            first_output: None,
            command_timeout: None,
            ..Self::default()
        }
    }

    /// Set the chunk size. Zero is raised to one.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_first_output(mut self, grace: Option<Duration>) -> Self {
        self.first_output = grace;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Read from `reader` until the completion heuristic fires.
    ///
    /// Returns everything read, in order. A clean end-of-stream ends the
    /// drain normally. On any error the bytes read so far are discarded.
    pub async fn drain<R>(&self, reader: &mut R, cancel: &CancellationToken) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let chunk_size = self.chunk_size.max(1);
        let deadline = self.command_timeout.map(|t| (Instant::now() + t, t));
        let mut output = Vec::with_capacity(self.initial_capacity.max(chunk_size));
        let mut chunk = vec![0u8; chunk_size];
        let mut reads = 0usize;

        loop {
            if let Some((at, total)) = deadline {
                if Instant::now() >= at {
                    debug!(bytes = output.len(), "drain deadline reached");
                    return Err(RemoteShellError::CommandTimeout(total));
                }
            }

            let (wait, expiry) = self.next_wait(deadline, !output.is_empty());

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(bytes = output.len(), "drain cancelled");
                    return Err(RemoteShellError::Cancelled);
                }
                res = bounded(wait, reader.read(&mut chunk)) => res,
            };

            match outcome {
                None => match expiry {
                    Expiry::Complete => {
                        trace!(reads, bytes = output.len(), "drain quiet");
                        break;
                    }
                    Expiry::TimedOut(limit) => {
                        debug!(reads, bytes = output.len(), "drain read timed out");
                        return Err(RemoteShellError::CommandTimeout(limit));
                    }
                },
                Some(Ok(0)) => {
                    trace!(reads, bytes = output.len(), "drain reached end of stream");
                    break;
                }
                Some(Ok(n)) => {
                    reads += 1;
                    output.extend_from_slice(&chunk[..n]);
                    trace!(read = n, total = output.len(), "drain chunk");

                    if self.strategy == DrainStrategy::ChunkShortfall && n < chunk_size {
                        break;
                    }
                }
                Some(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Some(Err(e)) => return Err(RemoteShellError::CommandRead(e)),
            }
        }

        debug!(reads, bytes = output.len(), "drain complete");
        Ok(output)
    }

    /// How long the next read may wait, and what its expiry means.
    fn next_wait(
        &self,
        deadline: Option<(Instant, Duration)>,
        started: bool,
    ) -> (Option<Duration>, Expiry) {
        let per_read = match self.strategy {
            DrainStrategy::ChunkShortfall => self
                .read_timeout
                .map(|limit| (limit, Expiry::TimedOut(limit))),
            DrainStrategy::QuietPeriod(period) => match self.first_output {
                Some(grace) if !started => Some((grace.max(period), Expiry::Complete)),
                _ => Some((period, Expiry::Complete)),
            },
        };
        let remaining =
            deadline.map(|(at, total)| (at.saturating_duration_since(Instant::now()), total));

        match (per_read, remaining) {
            (Some((wait, _)), Some((left, total))) if left < wait => {
                (Some(left), Expiry::TimedOut(total))
            }
            (Some((wait, expiry)), _) => (Some(wait), expiry),
            (None, Some((left, total))) => (Some(left), Expiry::TimedOut(total)),
            (None, None) => (None, Expiry::Complete),
        }
    }
}

/// Await `fut`, giving up after `limit` when one is set.
async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_defaults() {
        let cfg = DrainConfig::default();
        assert_eq!(cfg.chunk_size, 1024);
        assert!(cfg.initial_capacity > cfg.chunk_size);
        assert_eq!(cfg.strategy, DrainStrategy::QuietPeriod(DEFAULT_QUIET_PERIOD));
        assert_eq!(cfg.command_timeout, Some(DEFAULT_COMMAND_TIMEOUT));
    }

    #[test]
    fn test_zero_chunk_size_is_raised() {
        assert_eq!(DrainConfig::default().with_chunk_size(0).chunk_size, 1);
    }

    #[test]
    fn test_next_wait_prefers_earlier_deadline() {
        let cfg = DrainConfig::quiet_period(Duration::from_secs(10));
        let deadline = Some((Instant::now() + Duration::from_secs(1), Duration::from_secs(1)));
        let (wait, expiry) = cfg.next_wait(deadline, true);
        assert!(wait.unwrap() <= Duration::from_secs(1));
        assert!(matches!(expiry, Expiry::TimedOut(_)));
    }

    #[test]
    fn test_next_wait_unbounded_shortfall() {
        let cfg = DrainConfig::chunk_shortfall()
            .with_read_timeout(None)
            .with_command_timeout(None);
        let (wait, _) = cfg.next_wait(None, false);
        assert!(wait.is_none());
    }

    #[tokio::test]
    async fn test_shortfall_stops_on_short_read() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        tx.write_all(b"$ ").await.unwrap();

        let cfg = DrainConfig::chunk_shortfall();
        let out = cfg.drain(&mut rx, &CancellationToken::new()).await.unwrap();
        assert_eq!(out, b"$ ");
    }

    #[tokio::test]
    async fn test_eof_is_clean() {
        let mut reader = Cursor::new(b"last words".to_vec());
        let cfg = DrainConfig::quiet_period(Duration::from_secs(5));
        let out = cfg.drain(&mut reader, &CancellationToken::new()).await.unwrap();
        assert_eq!(out, b"last words");
    }

    #[tokio::test]
    async fn test_quiet_period_on_silence_returns_empty() {
        let (_tx, mut rx) = tokio::io::duplex(64);
        let cfg = DrainConfig::quiet_period(Duration::from_millis(20))
            .with_first_output(Some(Duration::from_millis(50)));
        let out = cfg.drain(&mut rx, &CancellationToken::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_next_wait_grace_before_first_byte() {
        let cfg = DrainConfig::quiet_period(Duration::from_millis(250));
        let (wait, expiry) = cfg.next_wait(None, false);
        assert_eq!(wait, Some(DEFAULT_FIRST_OUTPUT));
        assert!(matches!(expiry, Expiry::Complete));

        let (wait, _) = cfg.next_wait(None, true);
        assert_eq!(wait, Some(Duration::from_millis(250)));

        let (wait, _) = cfg.with_first_output(None).next_wait(None, false);
        assert_eq!(wait, Some(Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_quiet_period_waits_for_slow_first_byte() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.write_all(b"slow answer\n").await.unwrap();
            tx
        });

        let cfg = DrainConfig::quiet_period(Duration::from_millis(30));
        let out = cfg.drain(&mut rx, &CancellationToken::new()).await.unwrap();
        assert_eq!(out, b"slow answer\n");

        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_quiet_period_collects_multiple_bursts() {
        let (mut tx, mut rx) = tokio::io::duplex(64 * 1024);
        tx.write_all(&[b'a'; 1024]).await.unwrap();
        tx.write_all(&[b'b'; 3000]).await.unwrap();

        let cfg = DrainConfig::quiet_period(Duration::from_millis(50));
        let out = cfg.drain(&mut rx, &CancellationToken::new()).await.unwrap();
        assert_eq!(out.len(), 4024);
        assert!(out[..1024].iter().all(|&b| b == b'a'));
        assert!(out[1024..].iter().all(|&b| b == b'b'));
    }

    #[tokio::test]
    async fn test_shortfall_read_timeout() {
        let (mut tx, mut rx) = tokio::io::duplex(4096);
        tx.write_all(&[b'x'; 1024]).await.unwrap();

        let cfg = DrainConfig::chunk_shortfall()
            .with_read_timeout(Some(Duration::from_millis(30)));
        let err = cfg
            .drain(&mut rx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RemoteShellError::CommandTimeout(d) if d == Duration::from_millis(30)
        ));
    }

    #[tokio::test]
    async fn test_command_timeout_bounds_endless_output() {
        let (mut tx, mut rx) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            while tx.write_all(b"y\n").await.is_ok() {
                tokio::task::yield_now().await;
            }
        });

        let cfg = DrainConfig::quiet_period(Duration::from_secs(1))
            .with_command_timeout(Some(Duration::from_millis(100)));
        let err = cfg
            .drain(&mut rx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteShellError::CommandTimeout(_)));

        drop(rx);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let (_tx, mut rx) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let cfg = DrainConfig::chunk_shortfall()
            .with_read_timeout(None)
            .with_command_timeout(None);
        let err = cfg.drain(&mut rx, &cancel).await.unwrap_err();
        assert!(matches!(err, RemoteShellError::Cancelled));
    }

    #[tokio::test]
    async fn test_available_returns_buffered_only() {
        let (mut tx, mut rx) = tokio::io::duplex(256);
        tx.write_all(b"warning: foo\n").await.unwrap();

        let out = DrainConfig::available()
            .drain(&mut rx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, b"warning: foo\n");
    }
}
