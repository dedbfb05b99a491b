//! Client-side pipeline: request descriptors and the exchange driver.
//!
//! [`Client`] is the thin driver that connects the pieces: it asks the
//! [`ConnectionBroker`][broker::ConnectionBroker] for a transport, lets the
//! [`ConnectionAdapter`][adapter::ConnectionAdapter] bind whatever stream the
//! dial produced, and runs one request/response exchange over it. All
//! failures are scoped to the request that suffered them.

use bytes::Bytes;
use http::{HeaderMap, Method, Response, Uri};
use thiserror::Error;
use tracing::trace;

use crate::dial::{DialError, Scheme};

pub mod adapter;
pub mod broker;

use self::adapter::ConnectionAdapter;
use self::broker::ConnectionBroker;

/// Client error type. Every variant is scoped to a single request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The dial callback reported that connection establishment failed.
    #[error(transparent)]
    Dial(#[from] DialError),

    /// The peer's response could not be parsed.
    #[error("protocol: {0}")]
    Protocol(#[from] crate::proto::ParseError),

    /// I/O failure on the bound transport.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The request URI is missing a host or is otherwise unusable.
    #[error("invalid request uri: {0}")]
    InvalidUri(String),

    /// The request URI carries a scheme this client cannot dial.
    #[error("unsupported scheme: {0:?}")]
    UnsupportedScheme(String),
}

/// One logical HTTP transaction in need of a transport.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    method: Method,
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl ConnectionRequest {
    /// Build a request from a method and URI.
    ///
    /// The URI must carry a host; a missing scheme is treated as plain HTTP.
    pub fn new(method: Method, uri: Uri) -> Result<Self, Error> {
        let scheme = match uri.scheme_str() {
            Some("http") | None => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => return Err(Error::UnsupportedScheme(other.to_owned())),
        };
        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidUri(uri.to_string()))?
            .to_owned();
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|path| !path.is_empty())
            .unwrap_or("/")
            .to_owned();

        Ok(Self {
            method,
            scheme,
            host,
            port: uri.port_u16(),
            path,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    /// A GET request for the given URI.
    pub fn get(uri: Uri) -> Result<Self, Error> {
        Self::new(Method::GET, uri)
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The target port, if the URI named one.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The request path (with query, if any).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// An HTTP client whose connections come from a pluggable broker.
#[derive(Debug, Clone)]
pub struct Client {
    broker: ConnectionBroker,
    adapter: ConnectionAdapter,
}

impl Client {
    /// Create a client around a broker.
    pub fn new(broker: ConnectionBroker) -> Self {
        Self {
            broker,
            adapter: ConnectionAdapter::new(),
        }
    }

    /// Send a request and await the response.
    ///
    /// Obtains a connection from the broker, binds whatever stream the dial
    /// produced, and drives one exchange. A dial callback that never settles
    /// leaves this future pending.
    pub async fn request(&self, request: ConnectionRequest) -> Result<Response<Bytes>, Error> {
        trace!(method = %request.method(), host = %request.host(), path = %request.path(), "request");
        let dialed = self.broker.obtain_connection(&request).await?;
        let bound = self.adapter.bind(&request, dialed);
        bound.send_request(&request).await
    }

    /// Make a GET request to the given URI.
    pub async fn get(&self, uri: Uri) -> Result<Response<Bytes>, Error> {
        self.request(ConnectionRequest::get(uri)?).await
    }
}
