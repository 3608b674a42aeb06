//! End-to-end message flows over an in-memory stream.

use std::cell::RefCell;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

use miniws::{CloseCode, Connection, ConnectionState, Error, MessageKind, Role};

/// Handle on everything the connection wrote, alive even after the
/// connection releases its stream.
type Written = Rc<RefCell<Vec<u8>>>;

/// A duplex stream over in-memory buffers.
struct MockStream {
    input: Cursor<Vec<u8>>,
    output: Written,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn server(input: Vec<u8>) -> (Connection<MockStream>, Written) {
    let written = Written::default();
    let stream = MockStream { input: Cursor::new(input), output: written.clone() };
    (Connection::from_raw_stream(stream, Role::Server, <_>::default()), written)
}

#[test]
fn echo_short_text() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Masked text frame "hi" with key 0x37FA213D: 68 69 masks to 5F 93.
    let input = vec![0x81, 0x82, 0x37, 0xFA, 0x21, 0x3D, 0x5F, 0x93];
    let (mut conn, written) = server(input);

    let (kind, payload) = conn.receive().unwrap();
    assert_eq!(kind, MessageKind::Text);
    assert_eq!(payload, b"hi");

    conn.send_text("hi").unwrap();
    assert_eq!(*written.borrow(), vec![0x81, 0x02, 0x68, 0x69]);
}

#[test]
fn ping_is_answered_with_pong() {
    // Ping "abc" masked with a zero key, followed by a text frame so the
    // receive loop has a message to return.
    let input = vec![
        0x89, 0x83, 0x00, 0x00, 0x00, 0x00, 0x61, 0x62, 0x63, // ping "abc"
        0x81, 0x82, 0x00, 0x00, 0x00, 0x00, b'o', b'k', // text "ok"
    ];
    let (mut conn, written) = server(input);

    let (kind, payload) = conn.receive().unwrap();
    assert_eq!(kind, MessageKind::Text);
    assert_eq!(payload, b"ok");

    // The pong went out before the message was returned, echoing the ping
    // payload byte for byte.
    assert_eq!(*written.borrow(), vec![0x8A, 0x03, 0x61, 0x62, 0x63]);
}

#[test]
fn fragmented_send_of_seventy_thousand_bytes() {
    let payload: Vec<u8> = (0..70_000u32).map(|i| i as u8).collect();
    let (mut conn, written) = server(Vec::new());
    conn.send_binary(&payload).unwrap();

    let wire = written.borrow();

    // Frame 1: fin=0, binary, 16-bit length 65535.
    assert_eq!(&wire[..4], &[0x02, 126, 0xFF, 0xFF]);
    let first = &wire[4..4 + 65_535];
    assert_eq!(first, &payload[..65_535]);

    // Frame 2: fin=1, continuation, 16-bit length 4465.
    let rest = &wire[4 + 65_535..];
    assert_eq!(&rest[..4], &[0x80, 126, 0x11, 0x71]);
    let second = &rest[4..];
    assert_eq!(second, &payload[65_535..]);
    assert_eq!(second.len(), 4_465);
}

#[test]
fn graceful_close() {
    let (mut conn, written) = server(Vec::new());
    assert_eq!(conn.state(), ConnectionState::Connected);

    conn.close(CloseCode::Normal).unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);

    let reason = CloseCode::Normal.reason().as_bytes();
    let mut expected = vec![0x88, (2 + reason.len()) as u8, 0x03, 0xE8];
    expected.extend_from_slice(reason);
    assert_eq!(*written.borrow(), expected);

    assert!(matches!(conn.send_text("late"), Err(Error::ConnectionClosed)));
}

#[test]
fn oversize_message_is_rejected_with_close_1009() {
    let (mut conn, written) = server(Vec::new());
    let big = "a".repeat(3 << 20);

    let err = conn.send_text(&big).unwrap_err();
    assert!(matches!(err, Error::MessageTooLarge { size, limit } if size == 3 << 20 && limit == 2 << 20));
    assert_eq!(conn.state(), ConnectionState::Closed);

    // A close frame with code 1009 went out before the error surfaced.
    let wire = written.borrow();
    assert_eq!(&wire[..4], &[0x88, (2 + CloseCode::Size.reason().len()) as u8, 0x03, 0xF1]);
}

#[test]
fn invalid_utf8_text_is_rejected_with_close_1007() {
    // Masked text frame carrying a stray continuation byte.
    let input = vec![0x81, 0x81, 0x00, 0x00, 0x00, 0x00, 0xFF];
    let (mut conn, written) = server(input);

    assert!(matches!(conn.receive(), Err(Error::Utf8(_))));
    assert_eq!(conn.state(), ConnectionState::Closed);

    let wire = written.borrow();
    assert_eq!(&wire[..4], &[0x88, (2 + CloseCode::Invalid.reason().len()) as u8, 0x03, 0xEF]);
}

#[test]
fn eof_mid_frame_surfaces_without_a_close_frame() {
    // Header promises two payload bytes, the stream ends after one.
    let input = vec![0x81, 0x82, 0x00, 0x00, 0x00, 0x00, b'h'];
    let (mut conn, written) = server(input);

    assert!(matches!(conn.receive(), Err(Error::UnexpectedEof)));
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(written.borrow().is_empty());
}

#[test]
fn client_role_masks_outbound_frames() {
    let written = Written::default();
    let stream = MockStream { input: Cursor::new(Vec::new()), output: written.clone() };
    let mut conn = Connection::from_raw_stream(stream, Role::Client, <_>::default());

    conn.send_text("hello").unwrap();

    let wire = written.borrow();
    assert_eq!(wire[0], 0x81);
    assert_eq!(wire[1], 0x80 | 5, "mask bit set with a 7-bit length");
    let key = [wire[2], wire[3], wire[4], wire[5]];
    let unmasked: Vec<u8> =
        wire[6..].iter().enumerate().map(|(i, byte)| byte ^ key[i % 4]).collect();
    assert_eq!(unmasked, b"hello");
}
