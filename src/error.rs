//! Error handling.

use std::borrow::Cow;
use std::{io, str, string};

use http::StatusCode;
use thiserror::Error;

/// Result type of all WebSocket library calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Possible WebSocket errors.
#[derive(Error, Debug)]
pub enum Error {
    /// The connection is closed and the byte stream has been released.
    ///
    /// Returned both for operations attempted after closure and as the
    /// end-of-stream signal once a close handshake completes.
    #[error("connection closed")]
    ConnectionClosed,
    /// The byte stream ended in the middle of a frame.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// Input-output error on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The peer violated the framing protocol.
    ///
    /// A close frame with code 1002 is sent before this surfaces.
    #[error("websocket protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// A message exceeded the configured size ceiling.
    ///
    /// A close frame with code 1009 is sent before this surfaces.
    #[error("message too large: {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// The configured ceiling.
        limit: usize,
    },
    /// A text message did not carry valid UTF-8.
    ///
    /// A close frame with code 1007 is sent before this surfaces.
    #[error("utf-8 encoding error: {0}")]
    Utf8(#[from] str::Utf8Error),
    /// The upgrade request failed validation.
    ///
    /// The configured error callback has already run with the same status
    /// and reason, so the embedder has written the HTTP error response.
    #[error("handshake rejected: {status} ({reason})")]
    HandshakeRejected {
        /// HTTP status the embedder was told to answer with.
        status: StatusCode,
        /// Human-readable cause of the rejection.
        reason: Cow<'static, str>,
    },
    /// The handshake deadline elapsed before the connection was ready.
    #[error("handshake timed out")]
    HandshakeTimedOut,
    /// Malformed HTTP produced while assembling a request.
    #[error("http error: {0}")]
    HttpFormat(#[from] http::Error),
}

impl From<string::FromUtf8Error> for Error {
    fn from(err: string::FromUtf8Error) -> Self {
        Error::Utf8(err.utf8_error())
    }
}

impl From<httparse::Error> for Error {
    fn from(err: httparse::Error) -> Self {
        Error::Protocol(ProtocolError::HttparseError(err))
    }
}

/// Indicates the specific cause of a protocol error.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Reserved bits in the frame header are non-zero.
    #[error("reserved bits are non-zero")]
    NonZeroReservedBits,
    /// Encountered an opcode from one of the reserved ranges.
    #[error("encountered invalid opcode: {0}")]
    InvalidOpcode(u8),
    /// Control frames must have a payload of 125 bytes or less.
    #[error("control frame too big (payload must be 125 bytes or less)")]
    ControlFrameTooBig,
    /// Control frames must not be fragmented.
    #[error("fragmented control frame")]
    FragmentedControlFrame,
    /// The server must close the connection when an unmasked frame is received.
    #[error("received an unmasked frame from the client")]
    UnmaskedFrameFromClient,
    /// The client must close the connection when a masked frame is received.
    #[error("received a masked frame from the server")]
    MaskedFrameFromServer,
    /// The 64-bit extended payload length has its high bit set.
    #[error("64-bit payload length has the reserved high bit set")]
    InvalidLength,
    /// Received a continuation frame despite there being nothing to continue.
    #[error("continuation frame but nothing to continue")]
    UnexpectedContinuation,
    /// Received a new data frame while waiting for more fragments.
    #[error("expected a continuation frame, got a new data frame")]
    ExpectedContinuation,
    /// The payload of a close frame is invalid.
    #[error("invalid close frame payload")]
    InvalidCloseSequence,
    /// Wrapper around a [`httparse::Error`] value.
    #[error("httparse error: {0}")]
    HttparseError(httparse::Error),
}
