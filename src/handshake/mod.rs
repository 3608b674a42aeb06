//! WebSocket opening handshake.

pub mod server;

use sha1::{Digest, Sha1};

/// GUID concatenated with the client key when deriving the accept token
/// (RFC 6455 section 1.3).
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Turn a `Sec-WebSocket-Key` into a `Sec-WebSocket-Accept`.
pub fn derive_accept_key(key: &[u8]) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key);
    sha1.update(WS_GUID);
    base64::encode(sha1.finalize())
}
