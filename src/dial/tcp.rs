//! TCP dialer for the plain scheme.
//!
//! [`TcpDialer`] is the moral equivalent of the dial body most callers would
//! otherwise write by hand: inject the default port, resolve the host, open
//! a socket. It is also a [`tower::Service`] over [`SharedOptions`] so it can
//! be composed with middleware.

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::trace;

use super::{DialError, SharedOptions};
use crate::stream::TransportHandle;

/// Opens real TCP connections for dial callbacks.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    _priv: (),
}

impl TcpDialer {
    /// Create a new TCP dialer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject the default port if needed, then connect.
    ///
    /// The injected port is written back through the shared handle, so it is
    /// observable by whatever binds the stream afterwards.
    pub async fn dial(&self, options: SharedOptions) -> Result<TcpStream, DialError> {
        let (host, port) = {
            let mut options = options.lock();
            let port = options.ensure_port();
            (options.host.clone(), port)
        };

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        trace!(%host, port, "tcp connected");
        Ok(stream)
    }
}

impl tower::Service<SharedOptions> for TcpDialer {
    type Response = TransportHandle;
    type Error = DialError;
    type Future = BoxFuture<'static, Result<TransportHandle, DialError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, options: SharedOptions) -> Self::Future {
        let dialer = self.clone();
        Box::pin(async move { dialer.dial(options).await.map(TransportHandle::from) })
    }
}
