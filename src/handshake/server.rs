//! Server-side upgrade of an HTTP request into a WebSocket connection.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use http::{header, HeaderName, Method, Request, StatusCode, Version};
use httparse::Status;
use log::*;
use url::Url;

use super::derive_accept_key;
use crate::error::{Error, Result};
use crate::protocol::frame::coding::CloseCode;
use crate::protocol::{Connection, ConnectionConfig, Role};

/// Smallest accepted handshake deadline.
const MIN_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Limit the number of header lines when parsing a raw request.
const MAX_HEADERS: usize = 124;

/// Access to the raw byte stream beneath an HTTP response.
///
/// The embedding HTTP server implements this for its response writer; the
/// upgrader uses it to take over the connection once the request has been
/// validated. Giving up the stream means the embedder stops writing to it
/// entirely — the WebSocket connection owns it from then on.
pub trait Hijack {
    /// The duplex stream speaking to the peer.
    type Stream: Read + Write;

    /// Give up the HTTP response and yield the raw stream.
    fn hijack(self) -> io::Result<Self::Stream>;
}

/// Callback invoked with the HTTP status and reason of a rejected
/// handshake, before the error is returned. The embedder writes its HTTP
/// error response here.
pub type OnError = Box<dyn Fn(StatusCode, &str) + Send + Sync>;

/// Predicate deciding whether a request's origin is acceptable.
pub type CheckOrigin = Box<dyn Fn(&Request<()>) -> bool + Send + Sync>;

/// Upgrades HTTP/1.1 requests into WebSocket connections.
///
/// Every value is an independent configuration; [`Upgrader::new`] returns
/// fresh defaults rather than sharing a global one.
///
/// # Example
/// ```no_run
/// # use miniws::Upgrader;
/// # fn handle<W: miniws::Hijack>(request: http::Request<()>, writer: W) -> miniws::Result<()> {
/// let upgrader = Upgrader::new()
///     .read_buffer_size(128 * 1024)
///     .check_origin(|_| true);
/// let conn = upgrader.upgrade(&request, writer)?;
/// # Ok(())
/// # }
/// ```
pub struct Upgrader {
    /// Deadline for the whole handshake, at least one second.
    handshake_timeout: Duration,
    /// Read buffer capacity handed to the connection.
    read_buffer_size: usize,
    /// Write buffer capacity handed to the connection.
    write_buffer_size: usize,
    /// Rejection callback.
    on_error: OnError,
    /// Origin policy.
    check_origin: CheckOrigin,
    /// Compression level. Accepted for configuration compatibility but not
    /// applied: this core negotiates no extensions.
    compress_level: i32,
}

impl Default for Upgrader {
    fn default() -> Self {
        Upgrader {
            handshake_timeout: MIN_HANDSHAKE_TIMEOUT,
            read_buffer_size: 65_535,
            write_buffer_size: 65_535,
            on_error: Box::new(default_on_error),
            check_origin: Box::new(default_check_origin),
            compress_level: 0,
        }
    }
}

impl Upgrader {
    /// Create an upgrader with default configuration.
    pub fn new() -> Self {
        <_>::default()
    }

    /// Set the handshake deadline. Values below one second are raised to
    /// one second.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout.max(MIN_HANDSHAKE_TIMEOUT);
        self
    }

    /// Set the read buffer capacity for upgraded connections.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the write buffer capacity for upgraded connections.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the callback invoked when a handshake is rejected.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(StatusCode, &str) + Send + Sync + 'static,
    {
        self.on_error = Box::new(on_error);
        self
    }

    /// Set the origin policy.
    pub fn check_origin<F>(mut self, check_origin: F) -> Self
    where
        F: Fn(&Request<()>) -> bool + Send + Sync + 'static,
    {
        self.check_origin = Box::new(check_origin);
        self
    }

    /// Set the compression level. Stored but inert: no extension is
    /// negotiated by this core.
    pub fn compress_level(mut self, level: i32) -> Self {
        self.compress_level = level;
        self
    }

    /// The configured compression level. Not applied by this core.
    pub fn compression_level(&self) -> i32 {
        self.compress_level
    }

    /// Validate `request`, take over the byte stream and establish a
    /// server-role [`Connection`].
    ///
    /// Validation failures invoke the configured error callback with the
    /// HTTP status the embedder should answer with, then return
    /// [`Error::HandshakeRejected`]. On success the `101 Switching
    /// Protocols` response has been written and flushed and the returned
    /// connection is `Connected`.
    pub fn upgrade<W: Hijack>(&self, request: &Request<()>, writer: W) -> Result<Connection<W::Stream>> {
        let start = Instant::now();

        if !header_contains_token(request, header::CONNECTION, "upgrade") {
            return self.reject(
                StatusCode::BAD_REQUEST,
                "'Connection' header does not contain 'Upgrade'",
            );
        }

        if !header_contains_token(request, header::UPGRADE, "websocket") {
            return self.reject(
                StatusCode::BAD_REQUEST,
                "'Upgrade' header does not contain 'websocket'",
            );
        }

        if request.method() != Method::GET {
            return self.reject(StatusCode::METHOD_NOT_ALLOWED, "request method is not GET");
        }

        if !header_is(request, header::SEC_WEBSOCKET_VERSION, "13") {
            return self.reject(
                StatusCode::UPGRADE_REQUIRED,
                "'Sec-WebSocket-Version' is not 13",
            );
        }

        if !(self.check_origin)(request) {
            return self.reject(StatusCode::FORBIDDEN, "origin not allowed");
        }

        let key = match request.headers().get(header::SEC_WEBSOCKET_KEY) {
            Some(key) if key.len() == 24 => key.as_bytes(),
            _ => {
                return self.reject(
                    StatusCode::BAD_REQUEST,
                    "'Sec-WebSocket-Key' missing or not a 24-character nonce",
                );
            }
        };
        let accept = derive_accept_key(key);

        let mut stream = match writer.hijack() {
            Ok(stream) => stream,
            Err(err) => {
                debug!("could not hijack the http connection: {}", err);
                return self.reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "could not take over the http connection",
                );
            }
        };

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Connection: upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            accept
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;

        let config = ConnectionConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size);
        let mut conn = Connection::connecting(stream, Role::Server, config);
        conn.mark_connected();

        if start.elapsed() > self.handshake_timeout {
            debug!("handshake deadline exceeded, dropping the connection");
            // 1006 never goes on the wire: the stream is simply released.
            let _ = conn.close(CloseCode::Abnormal);
            return Err(Error::HandshakeTimedOut);
        }

        debug!("handshake done, connection established");
        Ok(conn)
    }

    fn reject<T>(&self, status: StatusCode, reason: &'static str) -> Result<T> {
        debug!("handshake rejected: {} ({})", status, reason);
        (self.on_error)(status, reason);
        Err(Error::HandshakeRejected { status, reason: reason.into() })
    }
}

/// Default rejection callback: log and leave the response to the embedder.
fn default_on_error(status: StatusCode, reason: &str) {
    debug!("upgrade failed: {} ({})", status, reason);
}

/// Default origin policy: accept requests without an `Origin` header, or
/// whose origin scheme and host match the request.
fn default_check_origin(request: &Request<()>) -> bool {
    let Some(value) = request.headers().get(header::ORIGIN) else {
        return true;
    };
    let Some(origin) = value.to_str().ok().and_then(|v| Url::parse(v).ok()) else {
        return false;
    };

    if let Some(scheme) = request.uri().scheme_str() {
        if origin.scheme() != scheme {
            return false;
        }
    }

    let request_host = request
        .headers()
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .or_else(|| request.uri().host());
    match (origin.host_str(), request_host) {
        (Some(origin_host), Some(request_host)) => {
            // The Host header may carry a port; compare both spellings.
            let origin_authority = match origin.port() {
                Some(port) => format!("{}:{}", origin_host, port),
                None => origin_host.to_string(),
            };
            origin_authority == request_host || origin_host == request_host
        }
        _ => false,
    }
}

/// Check whether any comma-separated value of `name` equals `token`,
/// case-insensitively.
fn header_contains_token(request: &Request<()>, name: HeaderName, token: &str) -> bool {
    request.headers().get_all(name).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    })
}

/// Check whether any value of `name` equals `expected` exactly.
fn header_is(request: &Request<()>, name: HeaderName, expected: &str) -> bool {
    request
        .headers()
        .get_all(name)
        .iter()
        .any(|value| value.to_str().map(|v| v.trim() == expected).unwrap_or(false))
}

/// Parse a raw HTTP request head into an [`http::Request`], for embedders
/// that hold bytes rather than a parsed request.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete head,
/// and the parsed request together with its length in bytes otherwise.
pub fn parse_request(buf: &[u8]) -> Result<Option<(usize, Request<()>)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Request::new(&mut headers);
    match raw.parse(buf)? {
        Status::Partial => Ok(None),
        Status::Complete(size) => {
            let mut builder = Request::builder().version(Version::HTTP_11);
            if let Some(method) = raw.method {
                builder = builder.method(method);
            }
            if let Some(path) = raw.path {
                builder = builder.uri(path);
            }
            for header in raw.headers.iter() {
                builder = builder.header(header.name, header.value);
            }
            Ok(Some((size, builder.body(())?)))
        }
    }
}
