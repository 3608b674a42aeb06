//! Frame opcodes and close codes.

use std::fmt;

/// WebSocket message opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Data (text or binary) opcode.
    Data(Data),
    /// Control opcode.
    Control(Control),
}

/// Data opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Data {
    /// 0x0 denotes a continuation frame.
    Continue,
    /// 0x1 denotes a text frame.
    Text,
    /// 0x2 denotes a binary frame.
    Binary,
    /// 0x3-0x7 are reserved for further non-control frames.
    Reserved(u8),
}

/// Control opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// 0x8 denotes a connection close.
    Close,
    /// 0x9 denotes a ping.
    Ping,
    /// 0xA denotes a pong.
    Pong,
    /// 0xB-0xF are reserved for further control frames.
    Reserved(u8),
}

impl OpCode {
    /// Whether the opcode is a control opcode.
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Control(_))
    }

    /// Whether the opcode comes from one of the reserved ranges.
    pub fn is_reserved(self) -> bool {
        matches!(self, OpCode::Data(Data::Reserved(_)) | OpCode::Control(Control::Reserved(_)))
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Data::Continue => write!(f, "CONTINUE"),
            Data::Text => write!(f, "TEXT"),
            Data::Binary => write!(f, "BINARY"),
            Data::Reserved(x) => write!(f, "RESERVED_DATA_{}", x),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Control::Close => write!(f, "CLOSE"),
            Control::Ping => write!(f, "PING"),
            Control::Pong => write!(f, "PONG"),
            Control::Reserved(x) => write!(f, "RESERVED_CONTROL_{}", x),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OpCode::Data(d) => d.fmt(f),
            OpCode::Control(c) => c.fmt(f),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(code: OpCode) -> Self {
        match code {
            OpCode::Data(Data::Continue) => 0,
            OpCode::Data(Data::Text) => 1,
            OpCode::Data(Data::Binary) => 2,
            OpCode::Data(Data::Reserved(i)) => i,
            OpCode::Control(Control::Close) => 8,
            OpCode::Control(Control::Ping) => 9,
            OpCode::Control(Control::Pong) => 10,
            OpCode::Control(Control::Reserved(i)) => i,
        }
    }
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> OpCode {
        match byte {
            0 => OpCode::Data(Data::Continue),
            1 => OpCode::Data(Data::Text),
            2 => OpCode::Data(Data::Binary),
            i @ 3..=7 => OpCode::Data(Data::Reserved(i)),
            8 => OpCode::Control(Control::Close),
            9 => OpCode::Control(Control::Ping),
            10 => OpCode::Control(Control::Pong),
            i @ 11..=15 => OpCode::Control(Control::Reserved(i)),
            _ => panic!("bug: opcode out of the 4-bit range: {}", byte),
        }
    }
}

/// Status code of a close frame, drawn from the fixed vocabulary of
/// RFC 6455 section 7.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000 indicates a normal closure.
    Normal,
    /// 1001 indicates that an endpoint is going away, such as a server
    /// shutting down or a browser leaving the page.
    Away,
    /// 1002 indicates termination due to a protocol error.
    Protocol,
    /// 1003 indicates termination because a type of data was received that
    /// the endpoint cannot accept.
    Unsupported,
    /// 1006 indicates an abnormal closure. This code is an internal
    /// sentinel: it designates a connection dropped without a close frame
    /// and must never appear on the wire.
    Abnormal,
    /// 1007 indicates termination because a message carried data that was
    /// inconsistent with its type.
    Invalid,
    /// 1009 indicates termination because a message was too big to process.
    Size,
    /// 1011 indicates that the server encountered an unexpected condition.
    Error,
    /// Any status code outside the supported vocabulary.
    Other(u16),
}

impl CloseCode {
    /// The canonical human-readable reason carried in close frames that use
    /// this code.
    pub fn reason(self) -> &'static str {
        match self {
            CloseCode::Normal => "normal",
            CloseCode::Away => "going away",
            CloseCode::Protocol => "protocol error",
            CloseCode::Unsupported => "unacceptable data",
            CloseCode::Abnormal => "abnormal",
            CloseCode::Invalid => "inconsistent message type",
            CloseCode::Size => "message too large",
            CloseCode::Error => "internal error",
            CloseCode::Other(_) => "",
        }
    }

    /// Whether the code may be emitted in a close frame.
    pub fn is_allowed(self) -> bool {
        !matches!(self, CloseCode::Abnormal | CloseCode::Other(_))
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Size => 1009,
            CloseCode::Error => 1011,
            CloseCode::Other(code) => code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> CloseCode {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::Invalid,
            1009 => CloseCode::Size,
            1011 => CloseCode::Error,
            code => CloseCode::Other(code),
        }
    }
}
