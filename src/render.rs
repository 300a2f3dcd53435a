//! Console rendering of decoded messages.

use std::io::{self, Write};

use crate::body::Rendered;
use crate::header::{DecodedMessage, Envelope};

pub const BANNER_START: &str = "*** New message ***";
pub const BANNER_END: &str = "*******************";

/// Write `message` the way the consumer prints it.
///
/// Envelopes and RFH2 properties come first, one line each, then the body:
/// text bodies between the two banners, anything else as a one-line size
/// report. Properties that cannot be parsed are reported instead of listed.
pub fn render_message<W: Write>(out: &mut W, message: &DecodedMessage) -> io::Result<()> {
    for envelope in &message.envelopes {
        match envelope {
            Envelope::Rfh2(h) => writeln!(
                out,
                "RFH2 header: length={} format={} ccsid={} folders={}",
                h.struc_length,
                h.format,
                h.ccsid,
                h.folders.len()
            )?,
            Envelope::DeadLetter(h) => writeln!(
                out,
                "DLH header: reason={} dest={} format={}",
                h.reason,
                h.dest_q_name.as_deref().unwrap_or("-"),
                h.format
            )?,
        }
    }
    match message.properties() {
        Ok(props) => {
            for p in props {
                match &p.dt {
                    Some(dt) => writeln!(
                        out,
                        "property {}.{} ({}) = {}",
                        p.folder, p.name, dt, p.value
                    )?,
                    None => writeln!(out, "property {}.{} = {}", p.folder, p.name, p.value)?,
                }
            }
        }
        Err(e) => writeln!(out, "properties unreadable: {}", e)?,
    }

    match message.body.render() {
        Rendered::Text { text, lossy } => {
            writeln!(out, "{}", BANNER_START)?;
            writeln!(out, "message len={}", message.body.len())?;
            writeln!(out, "{}", text)?;
            if lossy {
                writeln!(out, "(some bytes were not valid in ccsid {})", message.body.ccsid)?;
            }
            writeln!(out, "{}", BANNER_END)?;
        }
        Rendered::Binary { length } => {
            writeln!(out, "binary message: {} bytes (format {})", length, message.body.format)?;
        }
    }
    Ok(())
}
