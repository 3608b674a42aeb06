//! Generic WebSocket connection: message engine and lifecycle.

pub mod frame;

mod message;

pub use self::message::MessageKind;

use std::io::{Read, Write};

use log::*;

use self::frame::coding::{CloseCode, Control, Data, OpCode};
use self::frame::{Frame, FrameCodec};
use self::message::MessageAssembler;
use crate::buffer::clamp_buffer_size;
use crate::error::{Error, ProtocolError, Result};

/// Indicates a client or server role of the websocket.
///
/// The role decides masking: a client masks every outbound frame with a
/// fresh key and rejects masked inbound frames, a server does the
/// opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This socket is a server.
    Server,
    /// This socket is a client.
    Client,
}

/// Lifecycle state of a connection.
///
/// States only ever move forward: `Connecting → Connected → Closing →
/// Closed`. `Closed` is terminal; operations attempted there fail with
/// [`Error::ConnectionClosed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// The handshake has not completed yet.
    Connecting,
    /// The connection is established and messages flow.
    Connected,
    /// A close path has been taken; the close frame is on its way out.
    Closing,
    /// The byte stream has been released.
    Closed,
}

/// The configuration for a WebSocket connection.
///
/// # Example
/// ```
/// # use miniws::ConnectionConfig;
/// let config = ConnectionConfig::default()
///     .read_buffer_size(128 * 1024)
///     .max_message_size(1024 * 1024);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Read buffer capacity. Values outside `[65_535, 655_350]` fall back
    /// to the minimum.
    pub read_buffer_size: usize,
    /// Write buffer capacity, clamped like `read_buffer_size`.
    pub write_buffer_size: usize,
    /// Hard ceiling on a single message payload, sent or received.
    /// The default is 2 MiB.
    pub max_message_size: usize,
    /// Fragment size for outbound messages too large for one frame.
    /// The default is 65 535 bytes.
    pub shard_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            read_buffer_size: 65_535,
            write_buffer_size: 65_535,
            max_message_size: 2 << 20,
            shard_size: 65_535,
        }
    }
}

impl ConnectionConfig {
    /// Set [`Self::read_buffer_size`].
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    /// Set [`Self::write_buffer_size`].
    pub fn write_buffer_size(mut self, write_buffer_size: usize) -> Self {
        self.write_buffer_size = write_buffer_size;
        self
    }

    /// Set [`Self::max_message_size`].
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Set [`Self::shard_size`].
    pub fn shard_size(mut self, shard_size: usize) -> Self {
        self.shard_size = shard_size;
        self
    }

    /// Bring every field into its supported range.
    fn clamped(self) -> Self {
        ConnectionConfig {
            read_buffer_size: clamp_buffer_size(self.read_buffer_size),
            write_buffer_size: clamp_buffer_size(self.write_buffer_size),
            max_message_size: self.max_message_size,
            shard_size: self.shard_size.max(1),
        }
    }
}

/// A WebSocket connection over a duplex byte stream.
///
/// This is the type the [`Upgrader`](crate::Upgrader) hands back once the
/// handshake is done. Messages are sent with [`send_text`](Self::send_text)
/// and [`send_binary`](Self::send_binary) and received with
/// [`receive`](Self::receive); the receive loop answers pings and completes
/// close handshakes on its own.
///
/// A connection is not internally synchronized: every operation takes
/// `&mut self`, which serializes readers and writers at compile time.
#[derive(Debug)]
pub struct Connection<S> {
    /// The underlying byte stream; `None` once released.
    stream: Option<S>,
    /// Frame encoder/decoder with the read and write buffers.
    codec: FrameCodec,
    role: Role,
    state: ConnectionState,
    config: ConnectionConfig,
    /// A message mid-reassembly while the peer fragments.
    incomplete: Option<MessageAssembler>,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap a raw stream into a connection without performing a handshake.
    ///
    /// The stream must already speak WebSocket on both ends; the returned
    /// connection starts out `Connected`. Use the
    /// [`Upgrader`](crate::Upgrader) when an opening handshake is needed.
    pub fn from_raw_stream(stream: S, role: Role, config: ConnectionConfig) -> Self {
        let mut conn = Self::connecting(stream, role, config);
        conn.mark_connected();
        conn
    }

    /// Create a connection in state `Connecting`, for the upgrader.
    pub(crate) fn connecting(stream: S, role: Role, config: ConnectionConfig) -> Self {
        let config = config.clamped();
        Connection {
            stream: Some(stream),
            codec: FrameCodec::new(config.read_buffer_size, config.write_buffer_size),
            role,
            state: ConnectionState::Connecting,
            config,
            incomplete: None,
        }
    }

    /// The role this endpoint plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration the connection runs with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns a shared reference to the inner stream, unless it has been
    /// released.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Returns a mutable reference to the inner stream, unless it has been
    /// released.
    pub fn get_mut(&mut self) -> Option<&mut S> {
        self.stream.as_mut()
    }

    /// Record a successful handshake.
    pub(crate) fn mark_connected(&mut self) {
        self.advance(ConnectionState::Connected);
    }

    /// The single guarded lifecycle update. States never move backwards.
    fn advance(&mut self, next: ConnectionState) {
        debug_assert!(self.state <= next, "connection lifecycle must be monotonic");
        if self.state < next {
            trace!("connection state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Send a text message, fragmenting it if necessary.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send_message(OpCode::Data(Data::Text), text.as_bytes())
    }

    /// Send a binary message, fragmenting it if necessary.
    pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send_message(OpCode::Data(Data::Binary), data)
    }

    /// Receive the next complete message.
    ///
    /// Control frames interleaved with the message fragments are handled
    /// on the way: pings are answered with pongs, pongs are accepted as
    /// liveness signals, and a close frame completes the close handshake
    /// before [`Error::ConnectionClosed`] signals the end of the stream.
    pub fn receive(&mut self) -> Result<(MessageKind, Vec<u8>)> {
        self.check_connected()?;
        match self.receive_message() {
            Ok(message) => Ok(message),
            Err(err) => {
                let code = match &err {
                    Error::Protocol(_) => Some(CloseCode::Protocol),
                    Error::MessageTooLarge { .. } => Some(CloseCode::Size),
                    Error::Utf8(_) => Some(CloseCode::Invalid),
                    _ => None,
                };
                Err(self.fail(code, err))
            }
        }
    }

    /// Send a ping control frame.
    ///
    /// A failure here surfaces to the caller but does not close the
    /// connection.
    pub fn ping(&mut self) -> Result<()> {
        self.check_connected()?;
        self.send_frame(Frame::ping(b"ping".to_vec()))
    }

    /// Send a pong control frame carrying `payload`.
    ///
    /// A failure here surfaces to the caller but does not close the
    /// connection.
    pub fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.check_connected()?;
        self.send_frame(Frame::pong(payload.to_vec()))
    }

    /// Close the connection with the given code.
    ///
    /// Sends a close frame carrying the canonical reason for `code`,
    /// advances the lifecycle through `Closing` to `Closed` and releases
    /// the stream. Codes that must not appear on the wire
    /// ([`CloseCode::Abnormal`] and unknown codes) release the stream
    /// without emitting a frame.
    pub fn close(&mut self, code: CloseCode) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        debug!("closing connection with code {:?}", code);
        self.advance(ConnectionState::Closing);
        let sent = if code.is_allowed() { self.send_frame(Frame::close(code)) } else { Ok(()) };
        self.release();
        sent
    }

    /// Close with code 1000, normal closure.
    pub fn close_normal(&mut self) -> Result<()> {
        self.close(CloseCode::Normal)
    }

    /// Close with code 1001, endpoint going away.
    pub fn close_going_away(&mut self) -> Result<()> {
        self.close(CloseCode::Away)
    }

    /// Close with code 1002, protocol error.
    pub fn close_protocol_error(&mut self) -> Result<()> {
        self.close(CloseCode::Protocol)
    }

    /// Close with code 1003, unacceptable data.
    pub fn close_unacceptable(&mut self) -> Result<()> {
        self.close(CloseCode::Unsupported)
    }

    /// Close with code 1007, payload inconsistent with the message type.
    pub fn close_invalid_payload(&mut self) -> Result<()> {
        self.close(CloseCode::Invalid)
    }

    /// Close with code 1009, message too large.
    pub fn close_too_large(&mut self) -> Result<()> {
        self.close(CloseCode::Size)
    }

    /// Close with code 1011, internal error.
    pub fn close_internal_error(&mut self) -> Result<()> {
        self.close(CloseCode::Error)
    }

    /// Size check, then a single frame or a run of fragments.
    fn send_message(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        self.check_connected()?;

        if payload.len() > self.config.max_message_size {
            let err = Error::MessageTooLarge {
                size: payload.len(),
                limit: self.config.max_message_size,
            };
            return Err(self.fail(Some(CloseCode::Size), err));
        }

        let result = if payload.len() <= self.config.shard_size {
            self.send_frame(Frame::message(payload.to_vec(), opcode, true))
        } else {
            self.send_fragmented(opcode, payload)
        };
        result.map_err(|err| self.fail(None, err))
    }

    /// Emit a fragmented message: the first frame carries the data opcode,
    /// every further frame is a continuation, only the last has `fin` set.
    fn send_fragmented(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        debug!("fragmenting {} byte message into {} byte shards", payload.len(), self.config.shard_size);
        let mut chunks = payload.chunks(self.config.shard_size).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let last = chunks.peek().is_none();
            let opcode = if first { opcode } else { OpCode::Data(Data::Continue) };
            self.send_frame(Frame::message(chunk.to_vec(), opcode, last))?;
            first = false;
        }
        Ok(())
    }

    /// Mask (in client role), serialize and flush a single frame.
    fn send_frame(&mut self, mut frame: Frame) -> Result<()> {
        if self.role == Role::Client {
            frame.set_random_mask();
        }
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        self.codec.write_frame(stream, frame)
    }

    /// Read frames until a complete message has been assembled.
    fn receive_message(&mut self) -> Result<(MessageKind, Vec<u8>)> {
        loop {
            let frame = {
                let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
                self.codec.read_frame(stream, self.role)?
            };

            let frame = match self.dispatch_control(frame)? {
                Some(data_frame) => data_frame,
                None => continue,
            };

            let fin = frame.is_final();
            match frame.opcode() {
                OpCode::Data(Data::Continue) => {
                    let Some(assembler) = self.incomplete.as_mut() else {
                        return Err(Error::Protocol(ProtocolError::UnexpectedContinuation));
                    };
                    assembler.extend(frame.payload(), self.config.max_message_size)?;
                }
                OpCode::Data(Data::Text | Data::Binary) if self.incomplete.is_some() => {
                    return Err(Error::Protocol(ProtocolError::ExpectedContinuation));
                }
                OpCode::Data(data) => {
                    let kind = match data {
                        Data::Text => MessageKind::Text,
                        _ => MessageKind::Binary,
                    };
                    let mut assembler = MessageAssembler::new(kind);
                    assembler.extend(frame.payload(), self.config.max_message_size)?;
                    self.incomplete = Some(assembler);
                }
                OpCode::Control(_) => unreachable!("control frames are dispatched above"),
            }

            if fin {
                if let Some(assembler) = self.incomplete.take() {
                    return assembler.complete();
                }
            }
        }
    }

    /// Handle a control frame observed inside the read loop.
    ///
    /// Data frames pass through untouched. A ping is answered immediately
    /// with a pong echoing its payload; a pong needs no reply; a close
    /// frame completes the close handshake and surfaces
    /// [`Error::ConnectionClosed`].
    fn dispatch_control(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let control = match frame.opcode() {
            OpCode::Control(control) => control,
            OpCode::Data(_) => return Ok(Some(frame)),
        };
        match control {
            Control::Ping => {
                debug!("replying to ping with a {} byte pong", frame.payload().len());
                self.send_frame(Frame::pong(frame.into_payload()))?;
            }
            Control::Pong => {
                trace!("pong received");
            }
            Control::Close => {
                let close = frame.into_close()?;
                self.close_acknowledge(close.map(|(code, _)| code))?;
                return Err(Error::ConnectionClosed);
            }
            Control::Reserved(code) => {
                return Err(Error::Protocol(ProtocolError::InvalidOpcode(code)));
            }
        }
        Ok(None)
    }

    /// Reply to a peer close frame and finish the lifecycle.
    ///
    /// The reply echoes the peer's code, or 1000 when the peer gave none.
    /// Codes outside the wire vocabulary echo as a protocol error.
    fn close_acknowledge(&mut self, peer_code: Option<CloseCode>) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Ok(());
        }
        self.advance(ConnectionState::Closing);
        let echo = match peer_code {
            Some(code) if code.is_allowed() => code,
            Some(_) => CloseCode::Protocol,
            None => CloseCode::Normal,
        };
        debug!("close frame received, replying with {:?}", echo);
        let sent = self.send_frame(Frame::close(echo));
        self.release();
        sent
    }

    /// Error epilogue: best-effort close frame, then stream release.
    ///
    /// Every failing send or receive funnels through here so the
    /// connection always ends up `Closed` with the stream released.
    fn fail(&mut self, code: Option<CloseCode>, err: Error) -> Error {
        if let Some(code) = code {
            if self.state == ConnectionState::Connected {
                self.advance(ConnectionState::Closing);
                if let Some(stream) = self.stream.as_mut() {
                    let _ = self.codec.write_frame(stream, Frame::close(code));
                }
            }
        }
        self.release();
        err
    }

    /// Drop the byte stream and finish the lifecycle.
    fn release(&mut self) {
        self.stream = None;
        self.advance(ConnectionState::Closed);
    }

    fn check_connected(&self) -> Result<()> {
        match self.state {
            ConnectionState::Connected => Ok(()),
            _ => Err(Error::ConnectionClosed),
        }
    }
}
