//! Body decoding: the final byte range of a message plus its resolved format.
//!
//! Only `MQSTR` payloads are rendered as text. The character set comes from
//! the innermost descriptor or envelope, which is what the queue manager
//! reports after conversion. Decoding is a pure function of the bytes and the
//! CCSID, so nothing is shared between messages.

use crate::constants::{CCSID_ASCII, CCSID_EBCDIC_US, CCSID_ISO_8859_1};
use crate::format::Format;

/// EBCDIC code page 1140: code page 037 with the euro sign at 0x9F.
pub const CCSID_EBCDIC_US_EURO: i32 = 1140;

const CCSID_PC_437: i32 = 437;
const CCSID_PC_850: i32 = 850;

/// CP037 to Latin-1 code points.
const CP037_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0xA2, 0x2E, 0x3C, 0x28, 0x2B, 0x7C,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x21, 0x24, 0x2A, 0x29, 0x3B, 0xAC,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0x5E, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0x5B, 0x5D, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

/// Payload left after every envelope has been removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub format: Format,
    pub ccsid: i32,
    pub data: Vec<u8>,
}

/// What a body looks like once rendered for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Character data. `lossy` is set when bytes had to be replaced.
    Text { text: String, lossy: bool },
    /// Anything that is not `MQSTR`; only its size is reported.
    Binary { length: usize },
}

/// Wrap the final byte range of a message.
pub fn decode_body(format: Format, ccsid: i32, data: &[u8]) -> DecodedBody {
    DecodedBody {
        format,
        ccsid,
        data: data.to_vec(),
    }
}

impl DecodedBody {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_text(&self) -> bool {
        self.format == Format::STRING
    }

    pub fn render(&self) -> Rendered {
        if self.is_text() {
            let (text, lossy) = decode_text(&self.data, self.ccsid);
            Rendered::Text { text, lossy }
        } else {
            Rendered::Binary {
                length: self.data.len(),
            }
        }
    }
}

/// Decode `bytes` in character set `ccsid`.
///
/// Returns the text and whether any byte was replaced with U+FFFD. Unknown
/// character sets are read as UTF-8.
pub fn decode_text(bytes: &[u8], ccsid: i32) -> (String, bool) {
    match ccsid {
        CCSID_ISO_8859_1 => (bytes.iter().map(|&b| b as char).collect(), false),
        CCSID_ASCII | CCSID_PC_437 | CCSID_PC_850 => {
            let mut lossy = false;
            let text = bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        b as char
                    } else {
                        lossy = true;
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect();
            (text, lossy)
        }
        CCSID_EBCDIC_US => (bytes.iter().map(|&b| ebcdic_char(b, false)).collect(), false),
        CCSID_EBCDIC_US_EURO => (bytes.iter().map(|&b| ebcdic_char(b, true)).collect(), false),
        // 1208, the manager default and anything unrecognised
        _ => utf8_lossy(bytes),
    }
}

fn ebcdic_char(b: u8, euro: bool) -> char {
    if euro && b == 0x9F {
        '\u{20AC}'
    } else {
        char::from(CP037_TO_LATIN1[b as usize])
    }
}

fn utf8_lossy(bytes: &[u8]) -> (String, bool) {
    match std::str::from_utf8(bytes) {
        Ok(s) => (s.to_string(), false),
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CCSID_UTF8;

    #[test]
    fn string_format_renders_text() {
        let body = decode_body(Format::STRING, CCSID_UTF8, "héllo".as_bytes());
        assert_eq!(
            body.render(),
            Rendered::Text {
                text: "héllo".into(),
                lossy: false
            }
        );
    }

    #[test]
    fn other_formats_are_binary() {
        let body = decode_body(Format::NONE, CCSID_UTF8, &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(body.render(), Rendered::Binary { length: 4 });
    }

    #[test]
    fn ebcdic_hello() {
        let (text, lossy) = decode_text(&[0xC8, 0x85, 0x93, 0x93, 0x96], CCSID_EBCDIC_US);
        assert_eq!(text, "Hello");
        assert!(!lossy);
        assert_eq!(decode_text(&[0x9F], CCSID_EBCDIC_US_EURO).0, "€");
        assert_eq!(decode_text(&[0x9F], CCSID_EBCDIC_US).0, "\u{A4}");
    }

    #[test]
    fn invalid_utf8_is_marked_lossy() {
        let (text, lossy) = decode_text(&[b'o', b'k', 0xff], CCSID_UTF8);
        assert!(lossy);
        assert!(text.starts_with("ok"));
        assert!(text.ends_with('\u{FFFD}'));
    }

    #[test]
    fn latin1_and_ascii() {
        assert_eq!(decode_text(&[0x63, 0x61, 0x66, 0xE9], CCSID_ISO_8859_1).0, "café");
        let (text, lossy) = decode_text(&[0x63, 0xE9], CCSID_ASCII);
        assert_eq!(text, "c\u{FFFD}");
        assert!(lossy);
    }
}
