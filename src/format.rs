use std::fmt;

use crate::constants::MQ_FORMAT_LENGTH;
use crate::error::WireError;
use crate::wire::{pack_fixed_string, unpack_fixed_string};

/// An 8-byte message format tag (MQMD.Format and the envelope Format fields).
///
/// Tags are compared byte for byte, padding included, which is how the queue
/// manager compares them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format([u8; MQ_FORMAT_LENGTH]);

impl Format {
    /// No format name: the body is opaque application data.
    pub const NONE: Format = Format(*b"        ");
    /// Plain character data.
    pub const STRING: Format = Format(*b"MQSTR   ");
    /// Rules and formatting header, version 2 (structured properties envelope).
    pub const RF_HEADER_2: Format = Format(*b"MQHRF2  ");
    /// Dead-letter header.
    pub const DEAD_LETTER_HEADER: Format = Format(*b"MQDEAD  ");

    /// Build a tag from a name of at most eight bytes.
    pub fn new(name: &str) -> Result<Self, WireError> {
        let mut buf = [0u8; MQ_FORMAT_LENGTH];
        pack_fixed_string(&mut buf, Some(name), false)?;
        Ok(Format(buf))
    }

    /// Take the tag from the first eight bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let field = bytes.get(..MQ_FORMAT_LENGTH).ok_or(WireError::Underflow {
            needed: MQ_FORMAT_LENGTH,
            available: bytes.len(),
        })?;
        let mut buf = [0u8; MQ_FORMAT_LENGTH];
        buf.copy_from_slice(field);
        Ok(Format(buf))
    }

    pub fn as_bytes(&self) -> &[u8; MQ_FORMAT_LENGTH] {
        &self.0
    }

    /// Trimmed name, or `None` for a blank tag.
    pub fn name(&self) -> Option<String> {
        unpack_fixed_string(&self.0)
    }

    /// True for formats that wrap another payload.
    pub fn is_envelope(&self) -> bool {
        *self == Format::RF_HEADER_2 || *self == Format::DEAD_LETTER_HEADER
    }
}

impl Default for Format {
    fn default() -> Self {
        Format::NONE
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(&name),
            None => f.write_str("MQFMT_NONE"),
        }
    }
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Format({:?})", String::from_utf8_lossy(&self.0))
    }
}
