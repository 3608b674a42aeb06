//! Buffered byte-stream plumbing for the frame codec.

use std::io::Read;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Smallest supported read/write buffer capacity.
pub(crate) const MIN_BUFFER_SIZE: usize = 65_535;

/// Largest supported read/write buffer capacity.
pub(crate) const MAX_BUFFER_SIZE: usize = 65_535 * 10;

/// Clamp a requested buffer capacity into the supported range.
/// Out-of-range requests fall back to the minimum.
pub(crate) fn clamp_buffer_size(requested: usize) -> usize {
    if (MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&requested) {
        requested
    } else {
        MIN_BUFFER_SIZE
    }
}

/// A FIFO read buffer with peek-then-commit semantics.
///
/// Decoding proceeds in phases that each need an exact number of bytes.
/// [`peek`](Self::peek) blocks until that many bytes are buffered without
/// consuming anything, so a phase that cannot be satisfied leaves the
/// stream position untouched; [`consume`](Self::consume) commits the bytes
/// once the phase has succeeded.
#[derive(Debug)]
pub(crate) struct InputBuffer {
    buf: BytesMut,
}

impl InputBuffer {
    /// Create an empty buffer with the given capacity.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        InputBuffer { buf: BytesMut::with_capacity(capacity) }
    }

    /// Make at least `n` bytes available without consuming them.
    ///
    /// Returns [`Error::UnexpectedEof`] if the stream ends first.
    pub(crate) fn peek<S: Read>(&mut self, stream: &mut S, n: usize) -> Result<&[u8]> {
        while self.buf.len() < n {
            if self.read_from(stream)? == 0 {
                return Err(Error::UnexpectedEof);
            }
        }
        Ok(&self.buf[..n])
    }

    /// Commit `n` previously peeked bytes.
    pub(crate) fn consume(&mut self, n: usize) -> Bytes {
        debug_assert!(n <= self.buf.len(), "consume of bytes that were never peeked");
        self.buf.split_to(n).freeze()
    }

    /// Read once from the stream into spare capacity.
    fn read_from<S: Read>(&mut self, stream: &mut S) -> Result<usize> {
        let len = self.buf.len();
        if self.buf.capacity() == len {
            self.buf.reserve(MIN_BUFFER_SIZE);
        }
        self.buf.resize(self.buf.capacity(), 0);
        let size = stream.read(&mut self.buf[len..]);
        self.buf.truncate(len + size.as_ref().copied().unwrap_or(0));
        Ok(size?)
    }
}
