//! Reassembly of fragmented messages.

use std::str;

use crate::error::{Error, Result};

/// The data kind of a complete message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A UTF-8 text message.
    Text,
    /// A binary message.
    Binary,
}

/// A message being reassembled from fragments.
///
/// The first data frame of a message seeds the assembler with the message
/// kind; continuation frames append until the final fragment arrives.
#[derive(Debug)]
pub(crate) struct MessageAssembler {
    kind: MessageKind,
    buf: Vec<u8>,
}

impl MessageAssembler {
    pub(crate) fn new(kind: MessageKind) -> Self {
        MessageAssembler { kind, buf: Vec::new() }
    }

    /// Append a fragment payload, enforcing the message size ceiling.
    pub(crate) fn extend(&mut self, fragment: &[u8], limit: usize) -> Result<()> {
        // Be careful about integer overflows here.
        if self.buf.len() > limit || fragment.len() > limit - self.buf.len() {
            return Err(Error::MessageTooLarge {
                size: self.buf.len().saturating_add(fragment.len()),
                limit,
            });
        }
        self.buf.extend_from_slice(fragment);
        Ok(())
    }

    /// Finish reassembly. Text messages must be valid UTF-8.
    pub(crate) fn complete(self) -> Result<(MessageKind, Vec<u8>)> {
        if self.kind == MessageKind::Text {
            str::from_utf8(&self.buf)?;
        }
        Ok((self.kind, self.buf))
    }
}
