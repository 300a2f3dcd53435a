//! Envelope parsing and format dispatch.
//!
//! A retrieved message may start with one or more self-describing headers
//! (RFH2 properties, dead-letter header). Each header carries its own length
//! and the format, encoding and character set of what follows it. [`dispatch`]
//! walks that chain until it reaches a non-envelope format and hands the
//! remaining bytes to the body decoder.
//!
//! Integer fields of a header use the encoding declared by the layer that
//! encloses it: the message descriptor for the first header, the previous
//! header's `Encoding` field for the ones after it.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::body::{DecodedBody, decode_body};
use crate::constants::*;
use crate::descriptor::MessageDescriptor;
use crate::error::{FormatError, Reason, WireError};
use crate::format::Format;
use crate::wire::{FieldReader, put_fixed_string, put_i32};

/// Deepest chain of envelopes [`unwrap_envelopes`] will follow.
pub const MAX_ENVELOPE_DEPTH: usize = 8;

const RFH2: &str = "RFH2";
const DLH: &str = "DLH";

fn check_struc_id(
    header: &'static str,
    found: &[u8],
    expected: &[u8; 4],
) -> Result<(), FormatError> {
    if found == expected {
        Ok(())
    } else {
        Err(FormatError::BadStrucId {
            header,
            found: String::from_utf8_lossy(found).into_owned(),
        })
    }
}

fn truncated(header: &'static str, needed: usize, available: usize) -> FormatError {
    FormatError::Truncated {
        header,
        needed,
        available,
    }
}

/// Rules and formatting header, version 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfh2 {
    /// Total header length, fixed part plus every folder
    pub struc_length: usize,
    pub encoding: i32,
    pub ccsid: i32,
    /// Format of the data after the header
    pub format: Format,
    pub flags: i32,
    pub name_value_ccsid: i32,
    /// Folder contents with padding removed, in wire order
    pub folders: Vec<String>,
}

impl Rfh2 {
    /// Empty header announcing `format` for the data that follows.
    pub fn new(format: Format) -> Self {
        Self {
            struc_length: MQRFH_STRUC_LENGTH_FIXED_2,
            encoding: MQENC_NATIVE,
            ccsid: MQCCSI_INHERIT,
            format,
            flags: 0,
            name_value_ccsid: CCSID_UTF8,
            folders: Vec::new(),
        }
    }

    /// Append a folder such as `<usr><k>v</k></usr>`.
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folders.push(folder.into());
        self.struc_length = self.encoded_len();
        self
    }

    fn encoded_len(&self) -> usize {
        MQRFH_STRUC_LENGTH_FIXED_2
            + self
                .folders
                .iter()
                .map(|f| 4 + padded(f.len()))
                .sum::<usize>()
    }

    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8], encoding: i32) -> Result<Self, FormatError> {
        if data.len() < MQRFH_STRUC_LENGTH_FIXED_2 {
            return Err(truncated(RFH2, MQRFH_STRUC_LENGTH_FIXED_2, data.len()));
        }
        let mut r = FieldReader::new(data, encoding);
        check_struc_id(RFH2, r.take(4)?, MQRFH_STRUC_ID)?;
        let _version = r.i32()?;
        let struc_length = r.i32()?;
        if struc_length < MQRFH_STRUC_LENGTH_FIXED_2 as i32 {
            return Err(FormatError::BadStrucLength {
                header: RFH2,
                length: struc_length as i64,
            });
        }
        let struc_length = struc_length as usize;
        if struc_length > data.len() {
            return Err(truncated(RFH2, struc_length, data.len()));
        }
        let mut header = Rfh2 {
            struc_length,
            encoding: r.i32()?,
            ccsid: r.i32()?,
            format: Format::from_bytes(r.take(MQ_FORMAT_LENGTH)?)?,
            flags: r.i32()?,
            name_value_ccsid: r.i32()?,
            folders: Vec::new(),
        };

        let mut nv = FieldReader::new(&data[MQRFH_STRUC_LENGTH_FIXED_2..struc_length], encoding);
        while nv.remaining() > 0 {
            let length = nv.i32().map_err(|_| {
                FormatError::MalformedProperties("dangling bytes after last folder".into())
            })?;
            if length < 0 || length as usize > nv.remaining() {
                return Err(FormatError::MalformedProperties(format!(
                    "folder length {} exceeds the {} bytes left in the header",
                    length,
                    nv.remaining()
                )));
            }
            let raw = nv.take(length as usize)?;
            let text = String::from_utf8_lossy(raw);
            header
                .folders
                .push(text.trim_end_matches([' ', '\0']).to_string());
        }
        Ok(header)
    }

    /// Serialize the header, recomputing `StrucLength` from the folders.
    pub fn encode(&self, dst: &mut BytesMut, encoding: i32) -> Result<(), WireError> {
        dst.put_slice(MQRFH_STRUC_ID);
        put_i32(dst, MQRFH_VERSION_2, encoding);
        put_i32(dst, self.encoded_len() as i32, encoding);
        put_i32(dst, self.encoding, encoding);
        put_i32(dst, self.ccsid, encoding);
        dst.put_slice(self.format.as_bytes());
        put_i32(dst, self.flags, encoding);
        put_i32(dst, self.name_value_ccsid, encoding);
        for folder in &self.folders {
            let len = padded(folder.len());
            put_i32(dst, len as i32, encoding);
            dst.put_slice(folder.as_bytes());
            dst.put_bytes(b' ', len - folder.len());
        }
        Ok(())
    }

    /// Every leaf element of every folder.
    pub fn properties(&self) -> Result<Vec<Property>, FormatError> {
        let mut out = Vec::new();
        for folder in &self.folders {
            out.extend(parse_folder(folder)?);
        }
        Ok(out)
    }
}

/// Folder data is padded with spaces to a multiple of four bytes.
fn padded(len: usize) -> usize {
    len.div_ceil(4) * 4
}

/// One name/value pair from an RFH2 folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Folder the element sits in (`usr`, `jms`, `mcd`, ...)
    pub folder: String,
    /// Dotted path below the folder for nested elements
    pub name: String,
    /// `dt` attribute, `None` means string
    pub dt: Option<String>,
    pub value: String,
}

/// Parse one folder into its leaf properties.
///
/// `<usr><a dt='i4'>1</a><g><b>x</b></g></usr>` yields `usr/a` (type `i4`)
/// and `usr/g.b`. Empty elements yield an empty value.
pub fn parse_folder(folder: &str) -> Result<Vec<Property>, FormatError> {
    let mut p = FolderParser {
        s: folder.trim(),
        pos: 0,
    };
    let root = p.open_tag()?;
    let mut out = Vec::new();
    if !root.self_closing {
        let mut path = Vec::new();
        p.content(&root, root.name, &mut path, &mut out)?;
    }
    if !p.rest().trim().is_empty() {
        return Err(malformed(format!(
            "unexpected data after folder <{}>",
            root.name
        )));
    }
    Ok(out)
}

fn malformed(msg: impl Into<String>) -> FormatError {
    FormatError::MalformedProperties(msg.into())
}

struct Tag<'a> {
    name: &'a str,
    dt: Option<String>,
    self_closing: bool,
}

struct FolderParser<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> FolderParser<'a> {
    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn open_tag(&mut self) -> Result<Tag<'a>, FormatError> {
        self.skip_ws();
        if !self.rest().starts_with('<') {
            return Err(malformed("expected '<'"));
        }
        self.pos += 1;
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .ok_or_else(|| malformed("unterminated tag"))?;
        let name = &rest[..end];
        if name.is_empty() {
            return Err(malformed("empty element name"));
        }
        self.pos += end;

        let mut dt = None;
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.starts_with("/>") {
                self.pos += 2;
                return Ok(Tag {
                    name,
                    dt,
                    self_closing: true,
                });
            }
            if rest.starts_with('>') {
                self.pos += 1;
                return Ok(Tag {
                    name,
                    dt,
                    self_closing: false,
                });
            }
            let (attr, value) = self.attribute()?;
            if attr == "dt" {
                dt = Some(value);
            }
        }
    }

    fn attribute(&mut self) -> Result<(&'a str, String), FormatError> {
        let rest = self.rest();
        let eq = rest
            .find('=')
            .ok_or_else(|| malformed("attribute without value"))?;
        let attr = rest[..eq].trim();
        self.pos += eq + 1;
        self.skip_ws();
        let rest = self.rest();
        let quote = rest
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| malformed(format!("unquoted value for attribute '{}'", attr)))?;
        let close = rest[1..]
            .find(quote)
            .ok_or_else(|| malformed(format!("unterminated value for attribute '{}'", attr)))?;
        let value = unescape(&rest[1..1 + close])?;
        self.pos += close + 2;
        Ok((attr, value))
    }

    fn close_tag(&mut self, name: &str) -> Result<(), FormatError> {
        let rest = self.rest();
        let end = rest
            .find('>')
            .ok_or_else(|| malformed("unterminated closing tag"))?;
        let found = rest[2..end].trim();
        if found != name {
            return Err(malformed(format!(
                "closing tag </{}> does not match <{}>",
                found, name
            )));
        }
        self.pos += end + 1;
        Ok(())
    }

    /// Consume everything up to and including `</tag.name>`.
    fn content(
        &mut self,
        tag: &Tag<'a>,
        folder: &str,
        path: &mut Vec<&'a str>,
        out: &mut Vec<Property>,
    ) -> Result<(), FormatError> {
        let text_start = self.pos;
        let mut has_children = false;
        loop {
            let lt = self
                .rest()
                .find('<')
                .ok_or_else(|| malformed(format!("element <{}> is not closed", tag.name)))?;
            if self.rest()[lt..].starts_with("</") {
                let text = &self.s[text_start..self.pos + lt];
                self.pos += lt;
                self.close_tag(tag.name)?;
                if !has_children && !path.is_empty() {
                    out.push(Property {
                        folder: folder.to_string(),
                        name: path.join("."),
                        dt: tag.dt.clone(),
                        value: unescape(text)?,
                    });
                }
                return Ok(());
            }
            self.pos += lt;
            has_children = true;
            let child = self.open_tag()?;
            path.push(child.name);
            if child.self_closing {
                out.push(Property {
                    folder: folder.to_string(),
                    name: path.join("."),
                    dt: child.dt.clone(),
                    value: String::new(),
                });
            } else {
                self.content(&child, folder, path, out)?;
            }
            path.pop();
        }
    }
}

fn unescape(text: &str) -> Result<String, FormatError> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let semi = rest[amp..]
            .find(';')
            .ok_or_else(|| malformed("unterminated entity"))?;
        let entity = &rest[amp + 1..amp + semi];
        let ch = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| malformed(format!("unknown entity &{};", entity)))?
            }
        };
        out.push(ch);
        rest = &rest[amp + semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Dead-letter header (MQDLH, version 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterHeader {
    /// Why the message could not be delivered
    pub reason: Reason,
    pub dest_q_name: Option<String>,
    pub dest_q_mgr_name: Option<String>,
    pub encoding: i32,
    pub ccsid: i32,
    /// Format of the original message
    pub format: Format,
    pub put_appl_type: i32,
    pub put_appl_name: Option<String>,
    pub put_date: Option<String>,
    pub put_time: Option<String>,
}

impl DeadLetterHeader {
    pub fn new(reason: Reason, dest_q_name: &str, format: Format) -> Self {
        Self {
            reason,
            dest_q_name: Some(dest_q_name.to_string()),
            dest_q_mgr_name: None,
            encoding: MQENC_NATIVE,
            ccsid: CCSID_UTF8,
            format,
            put_appl_type: 0,
            put_appl_name: None,
            put_date: None,
            put_time: None,
        }
    }

    /// The header always occupies this many bytes.
    pub fn struc_length(&self) -> usize {
        MQDLH_STRUC_LENGTH
    }

    pub fn parse(data: &[u8], encoding: i32) -> Result<Self, FormatError> {
        if data.len() < MQDLH_STRUC_LENGTH {
            return Err(truncated(DLH, MQDLH_STRUC_LENGTH, data.len()));
        }
        let mut r = FieldReader::new(data, encoding);
        check_struc_id(DLH, r.take(4)?, MQDLH_STRUC_ID)?;
        let _version = r.i32()?;
        Ok(DeadLetterHeader {
            reason: Reason(r.i32()?),
            dest_q_name: r.fixed_string(MQ_Q_NAME_LENGTH)?,
            dest_q_mgr_name: r.fixed_string(MQ_Q_MGR_NAME_LENGTH)?,
            encoding: r.i32()?,
            ccsid: r.i32()?,
            format: Format::from_bytes(r.take(MQ_FORMAT_LENGTH)?)?,
            put_appl_type: r.i32()?,
            put_appl_name: r.fixed_string(MQ_PUT_APPL_NAME_LENGTH)?,
            put_date: r.fixed_string(MQ_PUT_DATE_LENGTH)?,
            put_time: r.fixed_string(MQ_PUT_TIME_LENGTH)?,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut, encoding: i32) -> Result<(), WireError> {
        dst.put_slice(MQDLH_STRUC_ID);
        put_i32(dst, MQDLH_VERSION_1, encoding);
        put_i32(dst, self.reason.0, encoding);
        put_fixed_string(dst, self.dest_q_name.as_deref(), MQ_Q_NAME_LENGTH, false)?;
        put_fixed_string(dst, self.dest_q_mgr_name.as_deref(), MQ_Q_MGR_NAME_LENGTH, false)?;
        put_i32(dst, self.encoding, encoding);
        put_i32(dst, self.ccsid, encoding);
        dst.put_slice(self.format.as_bytes());
        put_i32(dst, self.put_appl_type, encoding);
        put_fixed_string(dst, self.put_appl_name.as_deref(), MQ_PUT_APPL_NAME_LENGTH, true)?;
        put_fixed_string(dst, self.put_date.as_deref(), MQ_PUT_DATE_LENGTH, false)?;
        put_fixed_string(dst, self.put_time.as_deref(), MQ_PUT_TIME_LENGTH, false)?;
        Ok(())
    }
}

/// A header removed from the front of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Rfh2(Rfh2),
    DeadLetter(DeadLetterHeader),
}

impl Envelope {
    pub fn struc_length(&self) -> usize {
        match self {
            Envelope::Rfh2(h) => h.struc_length,
            Envelope::DeadLetter(h) => h.struc_length(),
        }
    }

    /// Format of the data following this header.
    pub fn format(&self) -> Format {
        match self {
            Envelope::Rfh2(h) => h.format,
            Envelope::DeadLetter(h) => h.format,
        }
    }

    pub fn encoding(&self) -> i32 {
        match self {
            Envelope::Rfh2(h) => h.encoding,
            Envelope::DeadLetter(h) => h.encoding,
        }
    }

    pub fn ccsid(&self) -> i32 {
        match self {
            Envelope::Rfh2(h) => h.ccsid,
            Envelope::DeadLetter(h) => h.ccsid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Rfh2(_) => RFH2,
            Envelope::DeadLetter(_) => DLH,
        }
    }
}

/// Result of stripping every envelope from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped<'a> {
    pub envelopes: Vec<Envelope>,
    /// Format of `body`
    pub format: Format,
    pub encoding: i32,
    pub ccsid: i32,
    pub body: &'a [u8],
}

/// Remove envelopes from `data` until a non-envelope format is reached.
///
/// A message without envelopes comes back untouched with the descriptor's
/// format. Chains deeper than [`MAX_ENVELOPE_DEPTH`] are rejected.
pub fn unwrap_envelopes<'a>(
    descriptor: &MessageDescriptor,
    data: &'a [u8],
) -> Result<Unwrapped<'a>, FormatError> {
    let mut envelopes = Vec::new();
    let mut format = descriptor.format;
    let mut encoding = descriptor.encoding;
    let mut ccsid = descriptor.ccsid;
    let mut rest = data;

    while format.is_envelope() {
        if envelopes.len() == MAX_ENVELOPE_DEPTH {
            return Err(FormatError::TooManyEnvelopes(MAX_ENVELOPE_DEPTH));
        }
        let envelope = if format == Format::RF_HEADER_2 {
            Envelope::Rfh2(Rfh2::parse(rest, encoding)?)
        } else {
            Envelope::DeadLetter(DeadLetterHeader::parse(rest, encoding)?)
        };
        let len = envelope.struc_length();
        debug!(
            header = envelope.kind(),
            struc_length = len,
            inner = %envelope.format(),
            "stripped envelope"
        );
        rest = &rest[len..];
        format = envelope.format();
        encoding = envelope.encoding();
        if envelope.ccsid() != MQCCSI_INHERIT {
            ccsid = envelope.ccsid();
        }
        envelopes.push(envelope);
    }

    Ok(Unwrapped {
        envelopes,
        format,
        encoding,
        ccsid,
        body: rest,
    })
}

/// A retrieved message after envelope dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub descriptor: MessageDescriptor,
    pub envelopes: Vec<Envelope>,
    pub body: DecodedBody,
}

impl DecodedMessage {
    /// Properties from every RFH2 envelope, outermost first.
    pub fn properties(&self) -> Result<Vec<Property>, FormatError> {
        let mut out = Vec::new();
        for envelope in &self.envelopes {
            if let Envelope::Rfh2(h) = envelope {
                out.extend(h.properties()?);
            }
        }
        Ok(out)
    }

    /// The dead-letter header, if the message was routed to a DLQ.
    pub fn dead_letter(&self) -> Option<&DeadLetterHeader> {
        self.envelopes.iter().find_map(|e| match e {
            Envelope::DeadLetter(h) => Some(h),
            Envelope::Rfh2(_) => None,
        })
    }
}

/// Inspect the descriptor's format, strip envelopes and decode the body.
pub fn dispatch(
    descriptor: &MessageDescriptor,
    data: &[u8],
) -> Result<DecodedMessage, FormatError> {
    let unwrapped = unwrap_envelopes(descriptor, data)?;
    Ok(DecodedMessage {
        descriptor: descriptor.clone(),
        body: decode_body(unwrapped.format, unwrapped.ccsid, unwrapped.body),
        envelopes: unwrapped.envelopes,
    })
}
