//! Synthetic in-memory streams.
//!
//! A [`SyntheticStream`] never performs a handshake: whatever its
//! [`SyntheticHandle`] emits simply appears on the stream's read path, and
//! whatever the pipeline writes can be read back from the handle. This is how
//! a pre-recorded response is replayed through the same contract a socket
//! satisfies, for tests or tunneling.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

/// The transport end of a synthetic pair. Hand this to a [`Completer`].
///
/// [`Completer`]: crate::client::broker::Completer
#[derive(Debug)]
#[pin_project]
pub struct SyntheticStream {
    #[pin]
    inner: tokio::io::DuplexStream,
}

impl SyntheticStream {
    /// Create a stream and the handle that scripts it.
    ///
    /// `max_buf_size` bounds how many bytes either side can buffer before the
    /// other side reads them.
    pub fn new(max_buf_size: usize) -> (Self, SyntheticHandle) {
        let (a, b) = tokio::io::duplex(max_buf_size);
        (Self { inner: a }, SyntheticHandle { inner: b })
    }
}

impl AsyncRead for SyntheticStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl AsyncWrite for SyntheticStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// The scripting end of a synthetic pair.
#[derive(Debug)]
pub struct SyntheticHandle {
    inner: tokio::io::DuplexStream,
}

impl SyntheticHandle {
    /// Emit bytes on the stream's read path, as a peer would.
    pub async fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes).await
    }

    /// Read bytes the pipeline has written into the stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    /// Signal end-of-stream to the transport end.
    pub async fn finish(mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
