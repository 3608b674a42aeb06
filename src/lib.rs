//! Lightweight WebSocket server core for Rust.
//!
//! This crate implements the two halves of RFC 6455 that every WebSocket
//! server needs and nothing more: the opening handshake that upgrades an
//! HTTP/1.1 request into a raw duplex byte stream, and the frame-level
//! codec that drives that stream afterwards — parsing inbound frames,
//! reassembling fragmented messages, answering control frames, fragmenting
//! and serializing outbound messages, and closing the connection with
//! well-defined close codes.
//!
//! The embedding HTTP server stays in charge of sockets and request
//! parsing: it hands the [`Upgrader`] a parsed [`http::Request`] together
//! with a response writer that can yield the underlying stream (the
//! [`Hijack`] trait), and receives a ready [`Connection`] back.
//!
//! ```no_run
//! use miniws::{CloseCode, Upgrader};
//! # fn serve<W: miniws::Hijack>(request: http::Request<()>, writer: W) -> miniws::Result<()> {
//! let upgrader = Upgrader::new();
//! let mut conn = upgrader.upgrade(&request, writer)?;
//!
//! let (_kind, payload) = conn.receive()?;
//! conn.send_binary(&payload)?;
//! conn.close(CloseCode::Normal)?;
//! # Ok(())
//! # }
//! ```
//!
//! Extension negotiation, subprotocols, compression and keepalive timers
//! are out of scope.

#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use,
    unused_mut,
    unused_imports,
    unused_import_braces
)]

pub mod error;
pub mod handshake;
pub mod protocol;

mod buffer;

pub use crate::error::{Error, ProtocolError, Result};
pub use crate::handshake::server::{Hijack, Upgrader};
pub use crate::protocol::{
    frame::coding::CloseCode, Connection, ConnectionConfig, ConnectionState, MessageKind, Role,
};
