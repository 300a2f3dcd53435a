//! Field-level helpers for MQI structures.
//!
//! MQI structures are made of fixed-width, space padded character fields,
//! 32-bit integers whose byte order follows the message encoding, and a few
//! variable-length string descriptors (`CharV`). Everything that packs or
//! unpacks those shapes lives here so the structure code above stays declarative.

use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::constants::{MQCCSI_APPL, MQENC_INTEGER_MASK, MQENC_INTEGER_NORMAL};
use crate::error::WireError;

/// Size of the scratch buffer allocated for output-only `CharV` fields.
pub const CHARV_OUTPUT_BUFFER_SIZE: usize = 10240;

/// Left-justify `value` into the fixed-width field `buf`, padding with spaces.
///
/// Each character takes one byte, so anything above U+00FF is rejected with
/// [`WireError::Unrepresentable`]. A `None` value pads the whole field. When
/// the value is wider than the field the call fails with
/// [`WireError::LengthViolation`] unless `truncate` is set, in which case the
/// excess characters are dropped. The field is never NUL terminated.
pub fn pack_fixed_string(
    buf: &mut [u8],
    value: Option<&str>,
    truncate: bool,
) -> Result<(), WireError> {
    let value = value.unwrap_or_default();
    let length = value.chars().count();
    if length > buf.len() && !truncate {
        return Err(WireError::LengthViolation {
            width: buf.len(),
            length,
        });
    }
    let mut n = 0;
    for (slot, ch) in buf.iter_mut().zip(value.chars()) {
        *slot = u8::try_from(ch).map_err(|_| WireError::Unrepresentable { ch })?;
        n += 1;
    }
    fill_buffer(&mut buf[n..], b' ');
    Ok(())
}

/// Set every byte of `buf` to `fill`.
pub fn fill_buffer(buf: &mut [u8], fill: u8) {
    buf.fill(fill);
}

/// Read a fixed-width character field.
///
/// Trailing whitespace is trimmed first and the result is then cut at the
/// first NUL, so `"AB\0CD   "` yields `"AB"`. Empty or blank fields read as
/// `None`.
pub fn unpack_fixed_string(buf: &[u8]) -> Option<String> {
    let s: String = buf.iter().map(|&b| b as char).collect();
    let trimmed = s.trim_end();
    let cut = match trimmed.find('\0') {
        Some(nul) => &trimmed[..nul],
        None => trimmed,
    };
    if cut.is_empty() {
        None
    } else {
        Some(cut.to_string())
    }
}

/// Variable-length string descriptor (MQCHARV).
///
/// `ptr` owns the referenced bytes; `length` counts the string bytes and never
/// includes the terminator that `buf_size` accounts for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharV {
    pub ptr: Option<Vec<u8>>,
    pub offset: usize,
    pub buf_size: usize,
    pub length: usize,
    pub ccsid: i32,
}

impl Default for CharV {
    fn default() -> Self {
        Self {
            ptr: None,
            offset: 0,
            buf_size: 0,
            length: 0,
            ccsid: MQCCSI_APPL,
        }
    }
}

impl CharV {
    /// Bytes currently described (`length` bytes from `offset`).
    pub fn as_bytes(&self) -> &[u8] {
        match &self.ptr {
            Some(buf) => {
                let start = self.offset.min(buf.len());
                let end = (self.offset + self.length).min(buf.len());
                &buf[start..end]
            }
            None => &[],
        }
    }
}

/// Store `value` in `desc` as UTF-8 followed by one NUL byte.
///
/// With no value, `allocate_for_output` reserves a
/// [`CHARV_OUTPUT_BUFFER_SIZE`] byte buffer for the callee to fill; otherwise
/// the descriptor is left pointing at nothing.
pub fn pack_variable_string(desc: &mut CharV, value: Option<&str>, allocate_for_output: bool) {
    match value {
        Some(s) => {
            let mut buf = Vec::with_capacity(s.len() + 1);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
            desc.buf_size = buf.len();
            desc.length = buf.len() - 1;
            desc.offset = 0;
            desc.ptr = Some(buf);
        }
        None if allocate_for_output => {
            desc.ptr = Some(vec![0u8; CHARV_OUTPUT_BUFFER_SIZE]);
            desc.offset = 0;
            desc.buf_size = CHARV_OUTPUT_BUFFER_SIZE;
            desc.length = 0;
        }
        None => {
            desc.ptr = None;
            desc.offset = 0;
            desc.buf_size = 0;
            desc.length = 0;
        }
    }
}

/// Read the string held by `desc` and release its buffer.
///
/// Bytes from the first embedded NUL onward are zeroed before decoding, so
/// nothing that followed a terminator leaks into the result. A descriptor with
/// no buffer or a zero length reads as `None` and has its length fields reset.
pub fn unpack_variable_string(desc: &mut CharV) -> Option<String> {
    if desc.ptr.is_some() && desc.length > 0 {
        let mut bytes = desc.as_bytes().to_vec();
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes[nul..].fill(0);
        }
        desc.ptr = None;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        desc.ptr = None;
        desc.length = 0;
        desc.buf_size = 0;
        None
    }
}

/// Loosely typed option input, as read from configuration or the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Int(i32),
    List(Vec<FlagValue>),
    Text(String),
}

/// Collapse an option value into its integer form.
///
/// An integer is returned as-is and a list of integers is ORed together.
/// Anything else, including a list holding a non-integer, is rejected with
/// [`WireError::InvalidType`] naming `field`.
pub fn flags_to_integer(field: &str, value: &FlagValue) -> Result<i32, WireError> {
    let invalid = || WireError::InvalidType {
        field: field.to_string(),
    };
    match value {
        FlagValue::Int(v) => Ok(*v),
        FlagValue::List(items) => items.iter().try_fold(0i32, |acc, item| match item {
            FlagValue::Int(v) => Ok(acc | *v),
            _ => Err(invalid()),
        }),
        FlagValue::Text(_) => Err(invalid()),
    }
}

/// Reverse of [`flags_to_integer`], shaped like the original input.
///
/// When the original was a list, `value` is split into its set bits among the
/// low 32 (bit 0 first). Flags whose value is zero cannot be recovered.
pub fn integer_to_flags(field: &str, original: Option<&FlagValue>, value: i32) -> FlagValue {
    match original {
        Some(FlagValue::List(_)) => {
            let bits = value as u32;
            let flags: Vec<FlagValue> = (0..32)
                .map(|i| 1u32 << i)
                .filter(|bit| bits & bit != 0)
                .map(|bit| FlagValue::Int(bit as i32))
                .collect();
            trace!(field, value, count = flags.len(), "decomposed flags");
            FlagValue::List(flags)
        }
        _ => FlagValue::Int(value),
    }
}

/// True when `encoding` declares big-endian ("normal") integers.
pub fn is_big_endian(encoding: i32) -> bool {
    encoding & MQENC_INTEGER_MASK == MQENC_INTEGER_NORMAL
}

/// Append a 32-bit integer in the byte order `encoding` declares.
pub fn put_i32(dst: &mut BytesMut, value: i32, encoding: i32) {
    if is_big_endian(encoding) {
        dst.put_i32(value);
    } else {
        dst.put_i32_le(value);
    }
}

/// Append a fixed-width character field.
pub fn put_fixed_string(
    dst: &mut BytesMut,
    value: Option<&str>,
    width: usize,
    truncate: bool,
) -> Result<(), WireError> {
    let mut field = vec![0u8; width];
    pack_fixed_string(&mut field, value, truncate)?;
    dst.put_slice(&field);
    Ok(())
}

/// Cursor over a byte slice that reads MQI fields in a given encoding.
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], encoding: i32) -> Self {
        Self {
            data,
            pos: 0,
            big_endian: is_big_endian(encoding),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Borrow the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Underflow {
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn i32(&mut self) -> Result<i32, WireError> {
        let mut field = self.take(4)?;
        Ok(if self.big_endian {
            field.get_i32()
        } else {
            field.get_i32_le()
        })
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        self.i32().map(|v| v as u32)
    }

    pub fn fixed_string(&mut self, width: usize) -> Result<Option<String>, WireError> {
        self.take(width).map(unpack_fixed_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MQENC_INTEGER_NORMAL, MQENC_NATIVE};

    #[test]
    fn pack_pads_with_spaces() {
        let mut buf = [0u8; 8];
        pack_fixed_string(&mut buf, Some("MQSTR"), false).expect("pack");
        assert_eq!(&buf, b"MQSTR   ");
    }

    #[test]
    fn pack_none_blanks_field() {
        let mut buf = [b'x'; 4];
        pack_fixed_string(&mut buf, None, false).expect("pack");
        assert_eq!(&buf, b"    ");
    }

    #[test]
    fn reader_honours_encoding() {
        let data = [0x00, 0x00, 0x00, 0x2A];
        let mut be = FieldReader::new(&data, MQENC_INTEGER_NORMAL);
        assert_eq!(be.i32().unwrap(), 42);

        let mut le = FieldReader::new(&data, MQENC_NATIVE);
        assert_eq!(le.i32().unwrap(), 0x2A00_0000);
    }

    #[test]
    fn reader_underflow_reports_sizes() {
        let data = [1u8, 2];
        let mut r = FieldReader::new(&data, MQENC_NATIVE);
        assert_eq!(
            r.i32(),
            Err(WireError::Underflow {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn put_i32_round_trips_through_reader() {
        let mut dst = BytesMut::new();
        put_i32(&mut dst, -7, MQENC_NATIVE);
        put_i32(&mut dst, 1208, MQENC_INTEGER_NORMAL);
        let mut r = FieldReader::new(&dst[..4], MQENC_NATIVE);
        assert_eq!(r.i32().unwrap(), -7);
        let mut r = FieldReader::new(&dst[4..], MQENC_INTEGER_NORMAL);
        assert_eq!(r.i32().unwrap(), 1208);
    }
}
