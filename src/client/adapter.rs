//! Binds a dialed stream as a request's transport.
//!
//! The adapter makes no assumption that the stream is a genuine network
//! socket - only that it satisfies the duplex byte channel contract. It also
//! owns the connection-policy defaults: with no reuse policy in this crate,
//! every request is sent `Connection: close` unless the caller overrode it.

use bytes::Bytes;
use http::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, HOST};
use http::{HeaderMap, Response};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::client::broker::Dialed;
use crate::client::{ConnectionRequest, Error};
use crate::dial::SharedOptions;
use crate::proto;
use crate::stream::TransportHandle;

/// Normalizes an arbitrary dialed stream into a request transport.
#[derive(Debug, Clone, Default)]
pub struct ConnectionAdapter {
    _priv: (),
}

impl ConnectionAdapter {
    /// Create a new adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the dialed stream as the request's transport.
    pub fn bind(&self, request: &ConnectionRequest, dialed: Dialed) -> BoundTransport {
        trace!(
            host = %request.host(),
            port = dialed.options.lock().port_or_default(),
            "transport bound"
        );
        BoundTransport {
            stream: dialed.stream,
            options: dialed.options,
        }
    }
}

/// A stream wired up as the transport for a single request.
#[derive(Debug)]
pub struct BoundTransport {
    stream: TransportHandle,
    options: SharedOptions,
}

impl BoundTransport {
    /// The shared options the dial callback saw, mutations included.
    pub fn options(&self) -> &SharedOptions {
        &self.options
    }

    /// Drive one request/response exchange over the bound stream.
    ///
    /// Consumes the transport: without a reuse policy the connection is
    /// closed once the response has been read.
    pub async fn send_request(
        mut self,
        request: &ConnectionRequest,
    ) -> Result<Response<Bytes>, Error> {
        let headers = self.request_headers(request)?;
        let head = proto::encode_request_head(request.method(), request.path(), &headers);

        self.stream.write_all(&head).await?;
        if !request.body().is_empty() {
            self.stream.write_all(request.body()).await?;
        }
        self.stream.flush().await?;
        debug!(path = %request.path(), "request written, awaiting response");

        let response = proto::read_response(&mut self.stream).await?;
        debug!(status = %response.status(), "response complete");
        Ok(response)
    }

    /// The request's headers plus the defaults the pipeline owes the wire:
    /// `Host`, `Connection: close` (no reuse policy here), and
    /// `Content-Length` for non-empty bodies. Caller-supplied headers always
    /// win.
    fn request_headers(&self, request: &ConnectionRequest) -> Result<HeaderMap, Error> {
        let mut headers = request.headers().clone();

        if !headers.contains_key(HOST) {
            let host = match request.port() {
                Some(port) if port != request.scheme().default_port() => {
                    format!("{}:{port}", request.host())
                }
                _ => request.host().to_owned(),
            };
            let value = HeaderValue::from_str(&host)
                .map_err(|_| Error::InvalidUri(format!("host {host:?} is not a header value")))?;
            headers.insert(HOST, value);
        }

        if !headers.contains_key(CONNECTION) {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        if !request.body().is_empty() && !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body().len()));
        }

        Ok(headers)
    }
}
