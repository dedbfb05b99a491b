//! Duplex byte channels a dial callback may hand back.
//!
//! The pipeline never special-cases "is this a real socket": anything that
//! satisfies the [`RawStream`] capability set can be bound as a request's
//! transport. [`TransportHandle`] is the dispatching wrapper over the shapes
//! a callback typically produces.

use std::fmt;

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub mod synthetic;

pub use self::synthetic::{SyntheticHandle, SyntheticStream};

/// The minimal capability set a transport must satisfy: readable, writable,
/// sendable across tasks, and pollable without pinning gymnastics.
///
/// Blanket-implemented; real sockets, TLS streams and in-memory streams all
/// qualify without adapters.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

#[pin_project(project = HandleCoreProjection)]
enum HandleCore {
    /// A real TCP socket.
    Tcp(#[pin] TcpStream),

    /// An in-memory duplex stream.
    Duplex(#[pin] tokio::io::DuplexStream),

    /// A synthetic stream replaying scripted bytes.
    Synthetic(#[pin] SyntheticStream),

    /// Anything else satisfying the capability set, boxed.
    Boxed(#[pin] Box<dyn RawStream>),
}

/// Dispatching wrapper for the stream shapes a dial callback can produce.
///
/// Effectively implements enum-dispatch for [`AsyncRead`] and [`AsyncWrite`]
/// so the adapter and the pipeline consume every transport the same way.
#[pin_project]
pub struct TransportHandle {
    #[pin]
    inner: HandleCore,
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.inner {
            HandleCore::Tcp(_) => "Tcp",
            HandleCore::Duplex(_) => "Duplex",
            HandleCore::Synthetic(_) => "Synthetic",
            HandleCore::Boxed(_) => "Boxed",
        };
        f.debug_tuple("TransportHandle").field(&kind).finish()
    }
}

impl TransportHandle {
    /// Box an arbitrary stream satisfying the capability set.
    pub fn boxed(stream: impl RawStream + 'static) -> Self {
        Self {
            inner: HandleCore::Boxed(Box::new(stream)),
        }
    }
}

macro_rules! dispatch {
    ($driver:ident.$method:ident($($args:expr),*)) => {
        match $driver.project().inner.project() {
            HandleCoreProjection::Tcp(stream) => stream.$method($($args),*),
            HandleCoreProjection::Duplex(stream) => stream.$method($($args),*),
            HandleCoreProjection::Synthetic(stream) => stream.$method($($args),*),
            HandleCoreProjection::Boxed(stream) => stream.$method($($args),*),
        }
    };
}

impl AsyncRead for TransportHandle {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        dispatch!(self.poll_read(cx, buf))
    }
}

impl AsyncWrite for TransportHandle {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        dispatch!(self.poll_write(cx, buf))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        dispatch!(self.poll_flush(cx))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        dispatch!(self.poll_shutdown(cx))
    }
}

impl From<TcpStream> for TransportHandle {
    fn from(stream: TcpStream) -> Self {
        Self {
            inner: HandleCore::Tcp(stream),
        }
    }
}

impl From<tokio::io::DuplexStream> for TransportHandle {
    fn from(stream: tokio::io::DuplexStream) -> Self {
        Self {
            inner: HandleCore::Duplex(stream),
        }
    }
}

impl From<SyntheticStream> for TransportHandle {
    fn from(stream: SyntheticStream) -> Self {
        Self {
            inner: HandleCore::Synthetic(stream),
        }
    }
}

impl From<Box<dyn RawStream>> for TransportHandle {
    fn from(stream: Box<dyn RawStream>) -> Self {
        Self {
            inner: HandleCore::Boxed(stream),
        }
    }
}
