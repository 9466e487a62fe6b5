use std::{io, time::Duration};

use byteorder::{ByteOrder, NetworkEndian};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{sleep, timeout},
};
use tracing::{debug, trace, warn};

use crate::config::Config;

use super::{
    error::Error,
    wire::{self, Command, WORD},
};

/// Lifecycle of an established link.
///
/// There is no connecting state: while [`super::dial`] is still retrying no
/// `Link` exists yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    /// Terminal. Reached through [`Link::close`] or the first fatal error;
    /// any further I/O fails with [`Error::ConnectionClosed`].
    Closed,
}

/// The framed, retrying transport between coordinator and peer.
///
/// Every operation either transfers exactly what it was asked to or fails
/// the session. Large transfers are split into `chunk_size` pieces, each
/// bounded by `io_timeout`. Would-block, interrupted and timed-out chunks
/// are retried after `retry_delay`, up to `retry_budget` consecutive times.
pub struct Link<S> {
    stream: S,
    state: LinkState,
    chunk_size: usize,
    retry_budget: u32,
    retry_delay: Duration,
    io_timeout: Duration,
}

impl<S> Link<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established stream.
    pub fn new(stream: S, config: &Config) -> Self {
        Self {
            stream,
            state: LinkState::Connected,
            chunk_size: config.chunk_size.max(WORD),
            retry_budget: config.retry_budget,
            retry_delay: config.retry_delay,
            io_timeout: config.io_timeout,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Writes all of `bytes`.
    pub async fn send_exact(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        let result = self.write_chunks(bytes).await;
        result.map_err(|e| self.fail(e))
    }

    /// Fills all of `buf`. The remote closing the stream part way through is
    /// fatal.
    pub async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.ensure_open()?;
        let result = self.read_chunks(buf).await;
        result.map_err(|e| self.fail(e))
    }

    async fn write_chunks(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut sent = 0;
        let mut failures = 0;
        while sent < bytes.len() {
            let end = (sent + self.chunk_size).min(bytes.len());
            match timeout(self.io_timeout, self.stream.write(&bytes[sent..end])).await {
                Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(Ok(n)) => {
                    trace!(n, sent, total = bytes.len(), "wrote chunk");
                    sent += n;
                    failures = 0;
                }
                Ok(Err(e)) if is_transient(e.kind()) => {
                    self.backoff(&mut failures, e.kind()).await?
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => self.backoff(&mut failures, io::ErrorKind::TimedOut).await?,
            }
        }
        loop {
            match timeout(self.io_timeout, self.stream.flush()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if is_transient(e.kind()) => {
                    self.backoff(&mut failures, e.kind()).await?
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => self.backoff(&mut failures, io::ErrorKind::TimedOut).await?,
            }
        }
    }

    async fn read_chunks(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut received = 0;
        let mut failures = 0;
        while received < buf.len() {
            let end = (received + self.chunk_size).min(buf.len());
            match timeout(self.io_timeout, self.stream.read(&mut buf[received..end])).await {
                Ok(Ok(0)) => {
                    return Err(Error::PeerClosed {
                        expected: buf.len(),
                        received,
                    })
                }
                Ok(Ok(n)) => {
                    trace!(n, received, total = buf.len(), "read chunk");
                    received += n;
                    failures = 0;
                }
                Ok(Err(e)) if is_transient(e.kind()) => {
                    self.backoff(&mut failures, e.kind()).await?
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => self.backoff(&mut failures, io::ErrorKind::TimedOut).await?,
            }
        }
        Ok(())
    }

    pub async fn send_command(&mut self, cmd: Command) -> Result<(), Error> {
        debug!(?cmd, "sending command");
        self.send_exact(&cmd.encode()).await
    }

    pub async fn recv_command(&mut self) -> Result<Command, Error> {
        let mut buf = [0u8; WORD];
        self.recv_exact(&mut buf).await?;
        Command::decode(&buf).map_err(|e| self.fail(e))
    }

    /// Like [`Link::recv_command`], but waits for the first byte without a
    /// deadline. Once a command has started arriving the usual timeout and
    /// retry rules apply to the rest of it.
    pub async fn recv_command_idle(&mut self) -> Result<Command, Error> {
        self.ensure_open()?;
        let mut buf = [0u8; WORD];
        let mut failures = 0;
        let first = loop {
            match self.stream.read(&mut buf).await {
                Ok(0) => {
                    return Err(self.fail(Error::PeerClosed {
                        expected: WORD,
                        received: 0,
                    }))
                }
                Ok(n) => break n,
                Err(e) if is_transient(e.kind()) => {
                    if let Err(e) = self.backoff(&mut failures, e.kind()).await {
                        return Err(self.fail(e));
                    }
                }
                Err(e) => return Err(self.fail(e.into())),
            }
        };
        trace!(n = first, "command started");
        if let Err(e) = self.recv_exact(&mut buf[first..]).await {
            return Err(match e {
                Error::PeerClosed { received, .. } => Error::PeerClosed {
                    expected: WORD,
                    received: first + received,
                },
                e => e,
            });
        }
        Command::decode(&buf).map_err(|e| self.fail(e))
    }

    pub async fn send_scalar(&mut self, value: f32) -> Result<(), Error> {
        self.send_exact(&wire::encode_f32(value)).await
    }

    pub async fn recv_scalar(&mut self) -> Result<f32, Error> {
        let mut buf = [0u8; WORD];
        self.recv_exact(&mut buf).await?;
        Ok(wire::decode_f32(&buf))
    }

    /// Sends a length header followed by `values`. Empty arrays cannot be
    /// framed.
    pub async fn send_array(&mut self, values: &[f32]) -> Result<(), Error> {
        let header = wire::encode_len(values.len())?;
        self.send_exact(&header).await?;
        let per_chunk = self.floats_per_chunk();
        let mut scratch = vec![0u8; per_chunk.min(values.len()) * WORD];
        for chunk in values.chunks(per_chunk) {
            let raw = &mut scratch[..chunk.len() * WORD];
            NetworkEndian::write_f32_into(chunk, raw);
            self.send_exact(raw).await?;
        }
        debug!(len = values.len(), "sent array");
        Ok(())
    }

    /// Receives an array of up to `expected_len` values.
    ///
    /// See [`Link::recv_array_into`] for how a differing declared length is
    /// handled; the returned vector holds the kept prefix.
    pub async fn recv_array(&mut self, expected_len: usize) -> Result<Vec<f32>, Error> {
        let mut values = vec![0.0f32; expected_len];
        let kept = self.recv_array_into(&mut values).await?;
        values.truncate(kept);
        Ok(values)
    }

    /// Receives an array into `dst` and returns how many values were
    /// written.
    ///
    /// The declared length is always consumed in full: values beyond
    /// `dst.len()` are read and discarded so the next message starts on a
    /// frame boundary. Any mismatch is logged.
    pub async fn recv_array_into(&mut self, dst: &mut [f32]) -> Result<usize, Error> {
        let mut header = [0u8; WORD];
        self.recv_exact(&mut header).await?;
        let declared = wire::decode_len(&header).map_err(|e| self.fail(e))?;
        let kept = declared.min(dst.len());
        if declared != dst.len() {
            warn!(
                declared,
                expected = dst.len(),
                "array length mismatch, keeping {kept} values"
            );
        }

        let per_chunk = self.floats_per_chunk();
        let mut scratch = vec![0u8; per_chunk.min(declared) * WORD];
        for chunk in dst[..kept].chunks_mut(per_chunk) {
            let raw = &mut scratch[..chunk.len() * WORD];
            self.recv_exact(raw).await?;
            NetworkEndian::read_f32_into(raw, chunk);
        }

        let mut surplus = (declared - kept) * WORD;
        if surplus > 0 {
            debug!(bytes = surplus, "draining surplus array bytes");
        }
        while surplus > 0 {
            let n = surplus.min(scratch.len());
            self.recv_exact(&mut scratch[..n]).await?;
            surplus -= n;
        }
        debug!(len = kept, "received array");
        Ok(kept)
    }

    /// Shuts the stream down. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.state == LinkState::Closed {
            return Ok(());
        }
        self.state = LinkState::Closed;
        debug!("closing link");
        self.stream.shutdown().await?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            LinkState::Closed => Err(Error::ConnectionClosed),
            LinkState::Connected => Ok(()),
        }
    }

    /// Marks the link closed after a fatal error and hands the error back.
    fn fail(&mut self, e: Error) -> Error {
        if self.state != LinkState::Closed {
            debug!(error = %e, "link failed");
            self.state = LinkState::Closed;
        }
        e
    }

    fn floats_per_chunk(&self) -> usize {
        (self.chunk_size / WORD).max(1)
    }

    async fn backoff(&self, failures: &mut u32, kind: io::ErrorKind) -> Result<(), Error> {
        *failures += 1;
        if *failures > self.retry_budget {
            return Err(Error::RetriesExhausted {
                attempts: *failures,
                last: kind,
            });
        }
        debug!(?kind, attempt = *failures, "transient i/o failure, retrying");
        sleep(self.retry_delay).await;
        Ok(())
    }
}

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    use super::{test_support::Flaky, *};

    fn config() -> Config {
        Config::builder()
            .chunk_size(16)
            .retry_budget(5)
            .retry_delay(Duration::from_millis(1))
            .io_timeout(Duration::from_millis(200))
            .build()
    }

    fn pair() -> (Link<DuplexStream>, Link<DuplexStream>) {
        let (a, b) = duplex(1024);
        (Link::new(a, &config()), Link::new(b, &config()))
    }

    #[tokio::test]
    async fn array_round_trip() {
        let (mut tx, mut rx) = pair();
        let values: Vec<f32> = (1..=1000).map(|i| i as f32 * 0.5).collect();
        let expected = values.clone();
        let sender = tokio::spawn(async move {
            tx.send_array(&values).await.unwrap();
            tx
        });
        let received = rx.recv_array(1000).await.unwrap();
        sender.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn surplus_values_are_drained() {
        let (mut tx, mut rx) = pair();
        let values: Vec<f32> = (1..=100).map(|i| i as f32).collect();
        let sender = tokio::spawn(async move {
            tx.send_array(&values).await.unwrap();
            tx.send_command(Command::MaxFast).await.unwrap();
            tx
        });
        let received = rx.recv_array(40).await.unwrap();
        assert_eq!(received, (1..=40).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(rx.recv_command().await.unwrap(), Command::MaxFast);
        sender.await.unwrap();
    }

    #[tokio::test]
    async fn short_array_fills_a_prefix() {
        let (mut tx, mut rx) = pair();
        tx.send_array(&[3.0, 4.0]).await.unwrap();
        tx.send_scalar(9.5).await.unwrap();
        let mut dst = [0.0f32; 5];
        assert_eq!(rx.recv_array_into(&mut dst).await.unwrap(), 2);
        assert_eq!(dst, [3.0, 4.0, 0.0, 0.0, 0.0]);
        assert_eq!(rx.recv_scalar().await.unwrap(), 9.5);
    }

    #[tokio::test]
    async fn non_positive_header_is_rejected() {
        let (mut tx, mut rx) = pair();
        tx.send_exact(&0i32.to_be_bytes()).await.unwrap();
        assert!(matches!(
            rx.recv_array(4).await,
            Err(Error::InvalidLength(0))
        ));
        assert!(matches!(
            tx.send_array(&[]).await,
            Err(Error::InvalidLength(0))
        ));
    }

    #[tokio::test]
    async fn scalars_and_commands() {
        let (mut tx, mut rx) = pair();
        tx.send_command(Command::Sum).await.unwrap();
        tx.send_scalar(-2.25).await.unwrap();
        assert_eq!(rx.recv_command().await.unwrap(), Command::Sum);
        assert_eq!(rx.recv_scalar().await.unwrap(), -2.25);
    }

    #[tokio::test]
    async fn close_mid_message_is_fatal() {
        let (mut raw, b) = duplex(64);
        let mut rx = Link::new(b, &config());
        raw.write_all(&[0, 0]).await.unwrap();
        drop(raw);
        match rx.recv_command().await {
            Err(Error::PeerClosed { expected, received }) => {
                assert_eq!((expected, received), (4, 2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(rx.state(), LinkState::Closed);
        assert!(matches!(
            rx.recv_scalar().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn bad_header_closes_the_link() {
        let (mut tx, mut rx) = pair();
        tx.send_exact(&(-1i32).to_be_bytes()).await.unwrap();
        assert!(matches!(rx.recv_array(2).await, Err(Error::InvalidLength(-1))));
        assert_eq!(rx.state(), LinkState::Closed);
        assert_eq!(tx.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn idle_wait_outlasts_the_timeout() {
        let (a, b) = duplex(64);
        let mut tx = Link::new(a, &config());
        let mut rx = Link::new(b, &config());
        let receiver = tokio::spawn(async move { rx.recv_command_idle().await });
        // Longer than io_timeout times the retry budget.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!receiver.is_finished());
        tx.send_command(Command::Max).await.unwrap();
        assert_eq!(receiver.await.unwrap().unwrap(), Command::Max);
    }

    #[tokio::test]
    async fn idle_wait_still_times_out_a_started_command() {
        let (mut raw, b) = duplex(64);
        let mut rx = Link::new(b, &config());
        raw.write_all(&[0]).await.unwrap();
        assert!(matches!(
            rx.recv_command_idle().await,
            Err(Error::RetriesExhausted {
                last: io::ErrorKind::TimedOut,
                ..
            })
        ));
        drop(raw);
    }

    #[tokio::test]
    async fn hang_up_inside_a_command_is_not_orderly() {
        let (mut raw, b) = duplex(64);
        let mut rx = Link::new(b, &config());
        raw.write_all(&[0, 0, 0]).await.unwrap();
        drop(raw);
        match rx.recv_command_idle().await {
            Err(e @ Error::PeerClosed { .. }) => {
                assert!(!e.is_orderly_close());
                assert!(matches!(
                    e,
                    Error::PeerClosed {
                        expected: 4,
                        received: 3
                    }
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_between_messages_is_orderly() {
        let (a, b) = duplex(64);
        let mut rx = Link::new(b, &config());
        drop(a);
        let err = rx.recv_command().await.unwrap_err();
        assert!(err.is_orderly_close());
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let (a, b) = duplex(1024);
        let mut tx = Link::new(Flaky::new(a, io::ErrorKind::WouldBlock, 3), &config());
        let mut rx = Link::new(Flaky::new(b, io::ErrorKind::Interrupted, 3), &config());
        let values: Vec<f32> = (1..=50).map(|i| i as f32).collect();
        tx.send_array(&values).await.unwrap();
        assert_eq!(rx.recv_array(50).await.unwrap(), values);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let (a, _b) = duplex(1024);
        let mut tx = Link::new(Flaky::new(a, io::ErrorKind::WouldBlock, 10), &config());
        match tx.send_command(Command::Sort).await {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 6);
                assert_eq!(last, io::ErrorKind::WouldBlock);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_a, b) = duplex(64);
        let mut rx = Link::new(b, &config());
        assert!(matches!(
            rx.recv_scalar().await,
            Err(Error::RetriesExhausted {
                last: io::ErrorKind::TimedOut,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn closed_link_refuses_io() {
        let (mut tx, _rx) = pair();
        tx.close().await.unwrap();
        tx.close().await.unwrap();
        assert_eq!(tx.state(), LinkState::Closed);
        assert!(matches!(
            tx.send_scalar(1.0).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
