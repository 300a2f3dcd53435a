//! Envelope stripping: RFH2, dead-letter headers and chains of both.

use bytes::BytesMut;
use iridium_mq::constants::{
    CCSID_EBCDIC_US, CCSID_UTF8, MQCCSI_INHERIT, MQDLH_STRUC_LENGTH, MQENC_INTEGER_NORMAL,
    MQENC_NATIVE,
};
use iridium_mq::header::{MAX_ENVELOPE_DEPTH, unwrap_envelopes};
use iridium_mq::{
    DeadLetterHeader, Envelope, Format, FormatError, MessageDescriptor, Reason, Rfh2, dispatch,
};

fn rfh2_bytes(header: &Rfh2, encoding: i32) -> BytesMut {
    let mut dst = BytesMut::new();
    header.encode(&mut dst, encoding).unwrap();
    dst
}

fn md(format: Format, encoding: i32, ccsid: i32) -> MessageDescriptor {
    MessageDescriptor::default()
        .with_format(format)
        .with_encoding(encoding)
        .with_ccsid(ccsid)
}

// =============================================================================
// RFH2
// =============================================================================

#[test]
fn body_starts_at_struc_length() {
    let header = Rfh2::new(Format::STRING)
        .with_folder("<mcd><Msd>jms_text</Msd></mcd>")
        .with_folder("<usr><region>emea</region></usr>");
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    let struc_length = data.len();
    data.extend_from_slice(b"0123456789");

    let out = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    assert_eq!(out.envelopes.len(), 1);
    assert_eq!(out.envelopes[0].struc_length(), struc_length);
    assert_eq!(out.body, b"0123456789");
    assert_eq!(out.format, Format::STRING);
}

#[test]
fn header_integers_follow_descriptor_encoding() {
    let header = Rfh2::new(Format::STRING).with_folder("<usr><a>1</a></usr>");
    let mut data = rfh2_bytes(&header, MQENC_INTEGER_NORMAL);
    data.extend_from_slice(b"big-endian");

    let out = unwrap_envelopes(
        &md(Format::RF_HEADER_2, MQENC_INTEGER_NORMAL, CCSID_UTF8),
        &data,
    )
    .unwrap();
    assert_eq!(out.body, b"big-endian");

    // Read with the wrong byte order the length field is nonsense
    let err = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data)
        .unwrap_err();
    assert!(matches!(
        err,
        FormatError::Truncated { .. } | FormatError::BadStrucLength { .. }
    ));
}

#[test]
fn inherited_ccsid_keeps_descriptor_value() {
    let header = Rfh2 {
        ccsid: MQCCSI_INHERIT,
        ..Rfh2::new(Format::STRING)
    };
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    data.extend_from_slice(b"hi");
    let out = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    assert_eq!(out.ccsid, CCSID_UTF8);
}

#[test]
fn header_ccsid_applies_to_body() {
    let header = Rfh2 {
        ccsid: CCSID_EBCDIC_US,
        ..Rfh2::new(Format::STRING)
    };
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    // "Hi" in EBCDIC
    data.extend_from_slice(&[0xC8, 0x89]);
    let msg = dispatch(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    assert_eq!(msg.body.ccsid, CCSID_EBCDIC_US);
    assert_eq!(msg.body.data, vec![0xC8, 0x89]);
}

#[test]
fn properties_are_listed_per_folder() {
    let header = Rfh2::new(Format::STRING)
        .with_folder("<usr><region>emea</region><retries dt='i4'>3</retries></usr>")
        .with_folder("<jms><Dst>queue:///ORDERS</Dst></jms>");
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    data.extend_from_slice(b"{}");

    let msg = dispatch(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    let props = msg.properties().unwrap();
    let names: Vec<String> = props
        .iter()
        .map(|p| format!("{}.{}", p.folder, p.name))
        .collect();
    assert_eq!(names, vec!["usr.region", "usr.retries", "jms.Dst"]);
    assert_eq!(props[1].dt.as_deref(), Some("i4"));
    assert_eq!(props[2].value, "queue:///ORDERS");
}

#[test]
fn malformed_folder_does_not_hide_the_body() {
    let header = Rfh2::new(Format::STRING).with_folder("<usr><a>1</usr>");
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    data.extend_from_slice(b"body");

    let msg = dispatch(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    assert_eq!(msg.body.data, b"body");
    assert!(matches!(
        msg.properties(),
        Err(FormatError::MalformedProperties(_))
    ));
}

#[test]
fn folder_length_past_header_is_malformed() {
    let header = Rfh2::new(Format::STRING).with_folder("<usr></usr>");
    let mut data = rfh2_bytes(&header, MQENC_NATIVE);
    // Folder length field sits right after the 36 byte fixed part
    data[36..40].copy_from_slice(&400i32.to_le_bytes());
    let err = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data)
        .unwrap_err();
    assert!(matches!(err, FormatError::MalformedProperties(_)));
}

#[test]
fn short_rfh2_is_truncated() {
    let err = unwrap_envelopes(
        &md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8),
        b"RFH \x02\x00\x00\x00",
    )
    .unwrap_err();
    assert_eq!(
        err,
        FormatError::Truncated {
            header: "RFH2",
            needed: 36,
            available: 8
        }
    );
}

// =============================================================================
// Dead-letter header
// =============================================================================

#[test]
fn dead_letter_header_is_reported() {
    let dlh = DeadLetterHeader::new(Reason::UNKNOWN_OBJECT_NAME, "ORDERS.IN", Format::STRING);
    let mut data = BytesMut::new();
    dlh.encode(&mut data, MQENC_NATIVE).unwrap();
    data.extend_from_slice(b"undeliverable");

    let msg = dispatch(
        &md(Format::DEAD_LETTER_HEADER, MQENC_NATIVE, CCSID_UTF8),
        &data,
    )
    .unwrap();
    let found = msg.dead_letter().expect("dead-letter header");
    assert_eq!(found.reason, Reason::UNKNOWN_OBJECT_NAME);
    assert_eq!(found.dest_q_name.as_deref(), Some("ORDERS.IN"));
    assert_eq!(msg.body.data, b"undeliverable");
    assert!(msg.body.is_text());
}

#[test]
fn short_dead_letter_header_is_truncated() {
    let data = vec![0u8; 100];
    let err = unwrap_envelopes(
        &md(Format::DEAD_LETTER_HEADER, MQENC_NATIVE, CCSID_UTF8),
        &data,
    )
    .unwrap_err();
    assert_eq!(
        err,
        FormatError::Truncated {
            header: "DLH",
            needed: MQDLH_STRUC_LENGTH,
            available: 100
        }
    );
}

#[test]
fn wrong_struc_id_is_rejected() {
    let mut data = vec![b' '; MQDLH_STRUC_LENGTH];
    data[..4].copy_from_slice(b"MD  ");
    let err = unwrap_envelopes(
        &md(Format::DEAD_LETTER_HEADER, MQENC_NATIVE, CCSID_UTF8),
        &data,
    )
    .unwrap_err();
    assert!(matches!(err, FormatError::BadStrucId { header: "DLH", .. }));
}

// =============================================================================
// Chains
// =============================================================================

#[test]
fn rfh2_wrapping_dead_letter_header() {
    // Outer header big-endian, announces a little-endian DLH
    let rfh = Rfh2 {
        encoding: MQENC_NATIVE,
        ..Rfh2::new(Format::DEAD_LETTER_HEADER).with_folder("<usr><hop>1</hop></usr>")
    };
    let dlh = DeadLetterHeader::new(Reason::NOT_AUTHORIZED, "PAYROLL", Format::STRING);

    let mut data = rfh2_bytes(&rfh, MQENC_INTEGER_NORMAL);
    dlh.encode(&mut data, MQENC_NATIVE).unwrap();
    data.extend_from_slice(b"inner");

    let msg = dispatch(
        &md(Format::RF_HEADER_2, MQENC_INTEGER_NORMAL, CCSID_UTF8),
        &data,
    )
    .unwrap();
    assert_eq!(msg.envelopes.len(), 2);
    assert!(matches!(msg.envelopes[0], Envelope::Rfh2(_)));
    assert!(matches!(msg.envelopes[1], Envelope::DeadLetter(_)));
    assert_eq!(msg.dead_letter().map(|h| h.reason), Some(Reason::NOT_AUTHORIZED));
    assert_eq!(msg.properties().unwrap().len(), 1);
    assert_eq!(msg.body.data, b"inner");
    assert_eq!(msg.body.format, Format::STRING);
}

fn chain(depth: usize) -> BytesMut {
    let mut data = BytesMut::new();
    for i in 0..depth {
        let inner = if i + 1 == depth {
            Format::STRING
        } else {
            Format::RF_HEADER_2
        };
        Rfh2::new(inner).encode(&mut data, MQENC_NATIVE).unwrap();
    }
    data.extend_from_slice(b"end");
    data
}

#[test]
fn chain_at_depth_limit_is_unwrapped() {
    let data = chain(MAX_ENVELOPE_DEPTH);
    let out = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data).unwrap();
    assert_eq!(out.envelopes.len(), MAX_ENVELOPE_DEPTH);
    assert_eq!(out.body, b"end");
}

#[test]
fn chain_past_depth_limit_is_rejected() {
    let data = chain(MAX_ENVELOPE_DEPTH + 1);
    let err = unwrap_envelopes(&md(Format::RF_HEADER_2, MQENC_NATIVE, CCSID_UTF8), &data)
        .unwrap_err();
    assert_eq!(err, FormatError::TooManyEnvelopes(MAX_ENVELOPE_DEPTH));
}
