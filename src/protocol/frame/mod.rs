//! Utilities to work with raw WebSocket frames.

pub mod coding;

#[allow(clippy::module_inception)]
mod frame;
mod mask;

pub use self::frame::{Frame, FrameHeader};

use std::io::{Read, Write};

use byteorder::{ByteOrder, NetworkEndian};
use log::*;

use self::frame::MAX_CONTROL_PAYLOAD;
use crate::buffer::InputBuffer;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::Role;

/// Payload bytes requested from the stream in one step.
///
/// Bounded chunks keep the 64-bit remaining counter from ever being
/// narrowed into a single machine-word read request.
const READ_CHUNK_SIZE: usize = 65_535;

/// High bit of the 64-bit extended payload length, which must be zero.
const LENGTH_HIGH_BIT: u64 = 1 << 63;

/// An encoder and decoder of WebSocket frames over a buffered stream.
///
/// Decoding follows a strict peeking discipline: every phase peeks the
/// exact number of bytes it needs from the [`InputBuffer`] and commits
/// them only once the peek succeeded, so a stream that runs short never
/// ends up partially consumed.
#[derive(Debug)]
pub(crate) struct FrameCodec {
    /// Buffer for bytes read off the stream.
    in_buffer: InputBuffer,
    /// Staging buffer for serialized frames on their way out.
    out_buffer: Vec<u8>,
}

impl FrameCodec {
    /// Create a codec with the given buffer capacities.
    pub(crate) fn new(read_buffer_size: usize, write_buffer_size: usize) -> Self {
        FrameCodec {
            in_buffer: InputBuffer::with_capacity(read_buffer_size),
            out_buffer: Vec::with_capacity(write_buffer_size),
        }
    }

    /// Decode a single frame from the stream.
    ///
    /// `role` selects the masking expectation: a server requires inbound
    /// frames to be masked, a client requires them to be unmasked. The
    /// returned frame is already unmasked.
    pub(crate) fn read_frame<S: Read>(&mut self, stream: &mut S, role: Role) -> Result<Frame> {
        // Fixed header bytes.
        let head = self.in_buffer.peek(stream, 2)?;
        let header = FrameHeader::unpack([head[0], head[1]]);
        self.in_buffer.consume(2);
        trace!("parsed frame header {:?}", header);

        // Extended payload length.
        let length: u64 = match header.len7 {
            126 => {
                let ext = self.in_buffer.peek(stream, 2)?;
                let length = NetworkEndian::read_u16(ext) as u64;
                self.in_buffer.consume(2);
                length
            }
            127 => {
                let ext = self.in_buffer.peek(stream, 8)?;
                let length = NetworkEndian::read_u64(ext);
                self.in_buffer.consume(8);
                if length & LENGTH_HIGH_BIT != 0 {
                    return Err(Error::Protocol(ProtocolError::InvalidLength));
                }
                length
            }
            n => n as u64,
        };

        // Masking key, big-endian byte order of the 32-bit value.
        let mask = if header.masked {
            let raw = self.in_buffer.peek(stream, 4)?;
            let key = [raw[0], raw[1], raw[2], raw[3]];
            self.in_buffer.consume(4);
            Some(key)
        } else {
            None
        };

        // Header validation.
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::Protocol(ProtocolError::NonZeroReservedBits));
        }
        if header.opcode.is_reserved() {
            return Err(Error::Protocol(ProtocolError::InvalidOpcode(header.opcode.into())));
        }
        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::Protocol(ProtocolError::FragmentedControlFrame));
            }
            if length > MAX_CONTROL_PAYLOAD as u64 {
                return Err(Error::Protocol(ProtocolError::ControlFrameTooBig));
            }
        }
        match role {
            Role::Server if !header.masked => {
                return Err(Error::Protocol(ProtocolError::UnmaskedFrameFromClient));
            }
            Role::Client if header.masked => {
                return Err(Error::Protocol(ProtocolError::MaskedFrameFromServer));
            }
            _ => {}
        }

        // Payload, in bounded chunks.
        let mut payload = Vec::with_capacity(length.min(READ_CHUNK_SIZE as u64) as usize);
        let mut remaining = length;
        while remaining > 0 {
            let chunk = remaining.min(READ_CHUNK_SIZE as u64) as usize;
            self.in_buffer.peek(stream, chunk)?;
            payload.extend_from_slice(&self.in_buffer.consume(chunk));
            remaining -= chunk as u64;
        }

        let mut frame = Frame::from_parts(header, mask, payload);
        frame.remove_mask();
        trace!("received frame {}", frame);
        Ok(frame)
    }

    /// Serialize a frame, write it out and flush the stream.
    pub(crate) fn write_frame<S: Write>(&mut self, stream: &mut S, frame: Frame) -> Result<()> {
        trace!("writing frame {}", frame);
        frame.format(&mut self.out_buffer)?;
        while !self.out_buffer.is_empty() {
            let written = stream.write(&self.out_buffer)?;
            if written == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset while sending",
                )));
            }
            self.out_buffer.drain(0..written);
        }
        stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::coding::{Control, Data, OpCode};
    use super::*;

    use std::io::Cursor;

    fn roundtrip(opcode: OpCode, masked: bool, size: usize) {
        let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let mut frame = match opcode {
            OpCode::Data(_) => Frame::message(payload.clone(), opcode, size % 2 == 0),
            OpCode::Control(Control::Ping) => Frame::ping(payload.clone()),
            OpCode::Control(Control::Pong) => Frame::pong(payload.clone()),
            _ => unreachable!(),
        };
        if masked {
            frame.set_random_mask();
        }
        let fin = frame.is_final();

        let mut codec = FrameCodec::new(65_535, 65_535);
        let mut wire = Vec::new();
        codec.write_frame(&mut wire, frame).unwrap();

        // A masked frame decodes at the server, an unmasked one at the client.
        let role = if masked { Role::Server } else { Role::Client };
        let mut stream = Cursor::new(wire);
        let decoded = codec.read_frame(&mut stream, role).unwrap();

        assert_eq!(decoded.opcode(), opcode);
        assert_eq!(decoded.is_final(), fin);
        assert_eq!(decoded.payload(), &payload[..]);
        assert!(!decoded.is_masked(), "payloads are unmasked during decode");
    }

    #[test]
    fn data_frame_roundtrip() {
        for opcode in
            [OpCode::Data(Data::Text), OpCode::Data(Data::Binary), OpCode::Data(Data::Continue)]
        {
            for masked in [false, true] {
                for size in [0, 1, 125, 126, 127, 65_535, 65_536, 1_048_576] {
                    roundtrip(opcode, masked, size);
                }
            }
        }
    }

    #[test]
    fn control_frame_roundtrip() {
        for opcode in [OpCode::Control(Control::Ping), OpCode::Control(Control::Pong)] {
            for masked in [false, true] {
                for size in [0, 1, 125] {
                    roundtrip(opcode, masked, size);
                }
            }
        }
    }

    #[test]
    fn close_frame_roundtrip() {
        use super::coding::CloseCode;

        for (masked, role) in [(false, Role::Client), (true, Role::Server)] {
            let mut frame = Frame::close(CloseCode::Away);
            if masked {
                frame.set_random_mask();
            }

            let mut codec = FrameCodec::new(65_535, 65_535);
            let mut wire = Vec::new();
            codec.write_frame(&mut wire, frame).unwrap();

            let decoded = codec.read_frame(&mut Cursor::new(wire), role).unwrap();
            assert_eq!(decoded.opcode(), OpCode::Control(Control::Close));
            let (code, reason) = decoded.into_close().unwrap().unwrap();
            assert_eq!(code, CloseCode::Away);
            assert_eq!(reason, CloseCode::Away.reason());
        }
    }

    #[test]
    fn rejects_length_with_high_bit_set() {
        let mut wire = vec![0x82, 0xFF];
        wire.extend_from_slice(&(1u64 << 63 | 5).to_be_bytes());
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::InvalidLength))
        ));
    }

    #[test]
    fn rejects_reserved_bits() {
        // rsv2 set on a masked text frame.
        let wire = vec![0xA1, 0x80, 0, 0, 0, 0];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::NonZeroReservedBits))
        ));
    }

    #[test]
    fn rejects_reserved_opcode() {
        let wire = vec![0x83, 0x80, 0, 0, 0, 0];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::InvalidOpcode(3)))
        ));
    }

    #[test]
    fn server_rejects_unmasked_frame() {
        let wire = vec![0x81, 0x02, 0x68, 0x69];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::UnmaskedFrameFromClient))
        ));
    }

    #[test]
    fn client_rejects_masked_frame() {
        let wire = vec![0x81, 0x82, 0x37, 0xFA, 0x21, 0x3D, 0x5F, 0x93];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Client),
            Err(Error::Protocol(ProtocolError::MaskedFrameFromServer))
        ));
    }

    #[test]
    fn rejects_oversize_control_frame() {
        let mut wire = vec![0x89, 0xFE, 0x00, 0x80];
        wire.extend_from_slice(&[0u8; 4]);
        wire.extend_from_slice(&[0u8; 128]);
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::ControlFrameTooBig))
        ));
    }

    #[test]
    fn rejects_fragmented_control_frame() {
        let wire = vec![0x09, 0x80, 0, 0, 0, 0];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::Protocol(ProtocolError::FragmentedControlFrame))
        ));
    }

    #[test]
    fn eof_mid_frame() {
        // Header promises two payload bytes, stream carries one.
        let wire = vec![0x82, 0x82, 0, 0, 0, 0, 0x01];
        let mut codec = FrameCodec::new(65_535, 65_535);
        assert!(matches!(
            codec.read_frame(&mut Cursor::new(wire), Role::Server),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn unmasks_during_decode() {
        let wire = vec![0x81, 0x82, 0x37, 0xFA, 0x21, 0x3D, 0x5F, 0x93];
        let mut codec = FrameCodec::new(65_535, 65_535);
        let frame = codec.read_frame(&mut Cursor::new(wire), Role::Server).unwrap();
        assert_eq!(frame.payload(), b"hi");
        assert!(!frame.is_masked());
    }
}
