//! Dial options and the built-in dialers.
//!
//! A [`DialOptions`] descriptor is built by the broker for every request and
//! handed to the dial callback through a [`SharedOptions`] handle. The handle
//! is shared by identity between the broker, the callback, and the adapter:
//! mutations made while dialing (most importantly default-port injection) are
//! visible downstream, never lost to a copy.

use std::fmt;
use std::sync::Arc;

use http::{HeaderMap, Method};
use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

/// The URI scheme a request was made with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain `http`, standard port 80.
    Http,
    /// Secure `https`, standard port 443.
    Https,
}

impl Scheme {
    /// The standard port for this scheme.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    /// The scheme as it appears in a URI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection establishment failed.
///
/// Always scoped to the request being dialed; a dial error never affects the
/// broker or other in-flight requests. The display output is exactly the
/// message the dial callback supplied.
#[derive(Debug, Error)]
#[error("{inner}")]
pub struct DialError {
    inner: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl DialError {
    /// Wrap any error as a dial failure.
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        Self {
            inner: error.into(),
        }
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl From<std::io::Error> for DialError {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}

impl From<&str> for DialError {
    fn from(message: &str) -> Self {
        Self::new(message.to_owned())
    }
}

impl From<String> for DialError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// TLS-specific extension fields on [`DialOptions`].
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip peer certificate verification.
    ///
    /// Only honored by the dialing side; the broker never sets it. The
    /// verification policy itself stays with the TLS stack.
    pub danger_accept_invalid_certs: bool,
}

/// The mutable descriptor handed to a dial callback.
///
/// A copy of the request's target plus scheme-specific extensions. The
/// callback may mutate fields before opening a transport; because the
/// descriptor travels inside a [`SharedOptions`] handle, those mutations are
/// seen by the adapter when the stream is bound.
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// The request method.
    pub method: Method,
    /// The request scheme.
    pub scheme: Scheme,
    /// Target host, as it appeared in the request URI.
    pub host: String,
    /// Target port. `None` until someone injects the scheme default.
    pub port: Option<u16>,
    /// Request path (with query, if any).
    pub path: String,
    /// A copy of the request headers.
    pub headers: HeaderMap,
    /// TLS extension fields.
    pub tls: TlsOptions,
}

impl DialOptions {
    /// A minimal descriptor for the given scheme and host: `GET /`, no port,
    /// no headers.
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            scheme,
            host: host.into(),
            port: None,
            path: "/".to_owned(),
            headers: HeaderMap::new(),
            tls: TlsOptions::default(),
        }
    }

    /// Inject the scheme's standard port if none is set, returning the port
    /// that is now in effect.
    ///
    /// The built-in dialers call this before opening a transport; custom
    /// callbacks opening their own sockets should do the same.
    pub fn ensure_port(&mut self) -> u16 {
        *self.port.get_or_insert(self.scheme.default_port())
    }

    /// The explicit port, or the scheme default, without mutating.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }
}

/// A [`DialOptions`] shared by handle identity between the broker, the dial
/// callback, and the adapter.
#[derive(Debug, Clone)]
pub struct SharedOptions {
    inner: Arc<Mutex<DialOptions>>,
}

impl SharedOptions {
    /// Wrap a descriptor in a shared handle.
    pub fn new(options: DialOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(options)),
        }
    }

    /// Lock the descriptor for reading or mutation.
    pub fn lock(&self) -> MutexGuard<'_, DialOptions> {
        self.inner.lock()
    }

    /// A point-in-time copy of the descriptor.
    pub fn snapshot(&self) -> DialOptions {
        self.lock().clone()
    }

    /// [`DialOptions::ensure_port`] through the shared handle.
    pub fn ensure_port(&self) -> u16 {
        self.lock().ensure_port()
    }
}
