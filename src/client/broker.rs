//! The pluggable connection broker.
//!
//! A [`ConnectionBroker`] holds a single user-supplied dial callback. For
//! every request it is asked to service it builds a [`SharedOptions`]
//! descriptor, invokes the callback exactly once, and hands back a
//! [`PendingConnection`]: the request's completion sink. The callback settles
//! through its [`Completer`] with exactly one of {stream, error}, whenever it
//! likes - within the same call, on a later tick, or never.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::client::ConnectionRequest;
use crate::dial::{DialError, DialOptions, SharedOptions, TlsOptions};
use crate::stream::TransportHandle;

type DialFn = dyn Fn(&ConnectionRequest, SharedOptions, Completer) + Send + Sync + 'static;

type Outcome = Result<TransportHandle, DialError>;

/// The single point of substitution between "the pipeline wants a transport"
/// and "a transport exists".
#[derive(Clone)]
pub struct ConnectionBroker {
    dial: Arc<DialFn>,
}

impl fmt::Debug for ConnectionBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBroker").finish_non_exhaustive()
    }
}

impl ConnectionBroker {
    /// Create a broker around a dial callback.
    ///
    /// The callback receives the request being serviced, the shared options
    /// descriptor, and the [`Completer`] it must eventually settle.
    pub fn new<F>(dial: F) -> Self
    where
        F: Fn(&ConnectionRequest, SharedOptions, Completer) + Send + Sync + 'static,
    {
        Self {
            dial: Arc::new(dial),
        }
    }

    /// A broker that dials real TCP connections, injecting the scheme's
    /// default port when the request carries none.
    pub fn tcp() -> Self {
        Self::new(|_request, options, completer| {
            let dialer = crate::dial::tcp::TcpDialer::new();
            tokio::spawn(async move {
                match dialer.dial(options).await {
                    Ok(stream) => completer.resolve(stream),
                    Err(error) => completer.reject(error),
                };
            });
        })
    }

    /// A broker that dials TLS-over-TCP connections with the given client
    /// configuration.
    #[cfg(feature = "tls")]
    pub fn tls(config: Arc<rustls::ClientConfig>) -> Self {
        Self::new(move |_request, options, completer| {
            let dialer = crate::dial::tls::TlsDialer::new(config.clone());
            tokio::spawn(async move {
                match dialer.dial(options).await {
                    Ok(stream) => completer.resolve(stream),
                    Err(error) => completer.reject(error),
                };
            });
        })
    }

    /// Service one request: build the options descriptor, invoke the dial
    /// callback exactly once, and return immediately.
    ///
    /// The returned [`PendingConnection`] is the request's completion sink.
    /// It resolves whenever the callback settles; if the callback never
    /// settles, it stays pending - no timeout is imposed here.
    pub fn obtain_connection(&self, request: &ConnectionRequest) -> PendingConnection {
        let options = SharedOptions::new(DialOptions {
            method: request.method().clone(),
            scheme: request.scheme(),
            host: request.host().to_owned(),
            port: request.port(),
            path: request.path().to_owned(),
            headers: request.headers().clone(),
            tls: TlsOptions::default(),
        });

        let (tx, rx) = oneshot::channel();
        let completer = Completer {
            tx: Arc::new(Mutex::new(Some(tx))),
        };

        trace!(host = %request.host(), scheme = %request.scheme(), "dialing");
        (self.dial)(request, options.clone(), completer);

        PendingConnection {
            rx,
            options,
            dial_lost: false,
        }
    }
}

impl tower::Service<ConnectionRequest> for ConnectionBroker {
    type Response = Dialed;
    type Error = DialError;
    type Future = PendingConnection;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ConnectionRequest) -> Self::Future {
        self.obtain_connection(&request)
    }
}

/// The single-shot result channel handed to a dial callback.
///
/// Cloneable, so a callback can move it into a spawned task or share it
/// between racing attempts. Only the first [`resolve`][Completer::resolve] or
/// [`reject`][Completer::reject] across all clones settles the request; later
/// calls are silent no-ops, as is settling after the request was abandoned.
#[derive(Clone)]
pub struct Completer {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Completer {
    /// Deliver the dialed stream.
    ///
    /// Returns `true` if this call settled the request.
    pub fn resolve(&self, stream: impl Into<TransportHandle>) -> bool {
        self.settle(Ok(stream.into()))
    }

    /// Deliver a connection establishment error.
    ///
    /// Returns `true` if this call settled the request.
    pub fn reject(&self, error: impl Into<DialError>) -> bool {
        self.settle(Err(error.into()))
    }

    /// Whether some clone of this completer has already settled.
    pub fn is_settled(&self) -> bool {
        self.tx.lock().is_none()
    }

    fn settle(&self, outcome: Outcome) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            trace!("completion after settle ignored");
            return false;
        };
        match &outcome {
            Ok(stream) => debug!(?stream, "dial resolved"),
            Err(error) => debug!(%error, "dial rejected"),
        }
        // delivery fails only if the request was abandoned meanwhile
        tx.send(outcome).is_ok()
    }
}

/// A successful dial outcome: the stream, plus the options the callback saw
/// (and possibly mutated) while dialing.
#[derive(Debug)]
pub struct Dialed {
    /// The duplex byte channel the callback produced.
    pub stream: TransportHandle,
    /// The shared options, including any mutations made while dialing.
    pub options: SharedOptions,
}

/// The completion sink for one request.
///
/// Resolves when the dial callback settles. A callback that drops its
/// [`Completer`] without settling leaves this future pending forever;
/// callers wanting a bound should wrap it in [`tokio::time::timeout`].
#[derive(Debug)]
pub struct PendingConnection {
    rx: oneshot::Receiver<Outcome>,
    options: SharedOptions,
    // latched when the callback dropped its completer without settling
    dial_lost: bool,
}

impl PendingConnection {
    /// The shared options descriptor for this dial.
    pub fn options(&self) -> &SharedOptions {
        &self.options
    }
}

impl Future for PendingConnection {
    type Output = Result<Dialed, DialError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.dial_lost {
            return Poll::Pending;
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(Ok(stream))) => Poll::Ready(Ok(Dialed {
                stream,
                options: self.options.clone(),
            })),
            Poll::Ready(Ok(Err(error))) => Poll::Ready(Err(error)),
            Poll::Ready(Err(_)) => {
                // The callback dropped its completer without settling. A dial
                // that never completes leaves the request pending, so park
                // here rather than surfacing a synthetic error.
                self.dial_lost = true;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
