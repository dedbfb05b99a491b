//! Pluggable connection brokering for HTTP clients.
//!
//! `patchcord` intercepts the point where an HTTP client would open a TCP or
//! TLS connection and hands connection establishment to a user-supplied dial
//! callback instead. The callback receives the outgoing request, a shared
//! mutable [`DialOptions`] descriptor, and a single-shot [`Completer`], and
//! must eventually settle with either an error or a duplex byte stream. The
//! stream - a real socket, a TLS stream, or a purely synthetic in-memory
//! stream - then carries one request/response exchange.
//!
//! Three layers are available:
//!
//! 1. The [`Client`], which drives a whole exchange: obtain a connection from
//!    the broker, bind the dialed stream, write the request and parse the
//!    response.
//! 2. The [`ConnectionBroker`], which owns the dial callback and maps its
//!    single-shot outcome onto a request's completion sink, regardless of
//!    whether the callback settles synchronously, on a later tick, or never.
//! 3. The [`stream`] and [`dial`] modules, which provide the stream shapes a
//!    callback may hand back and the built-in TCP/TLS dialers.
//!
//! # Example
//!
//! ```no_run
//! use patchcord::{Client, ConnectionBroker};
//! use patchcord::dial::tcp::TcpDialer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let broker = ConnectionBroker::new(|_request, options, completer| {
//!     let dialer = TcpDialer::new();
//!     tokio::spawn(async move {
//!         match dialer.dial(options).await {
//!             Ok(stream) => completer.resolve(stream),
//!             Err(error) => completer.reject(error),
//!         };
//!     });
//! });
//!
//! let client = Client::new(broker);
//! let response = client.get("http://example.com/".parse()?).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod client;
pub mod dial;
pub mod proto;
pub mod stream;

pub use self::client::adapter::{BoundTransport, ConnectionAdapter};
pub use self::client::broker::{Completer, ConnectionBroker, Dialed, PendingConnection};
pub use self::client::{Client, ConnectionRequest, Error};
pub use self::dial::{DialError, DialOptions, Scheme, SharedOptions, TlsOptions};
pub use self::stream::{RawStream, SyntheticHandle, SyntheticStream, TransportHandle};
