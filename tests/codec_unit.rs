//! Bridge codec framing: split reads, batched frames and malformed input.

use bytes::{BufMut, Bytes, BytesMut};
use iridium_mq::codec::{Reply, ReplyBody, Request};
use iridium_mq::constants::{CCSID_UTF8, MQCNO_CLIENT_BINDING, MQSCA_REQUIRED};
use iridium_mq::{BridgeFrame, CompletionCode, Format, MessageDescriptor, MqiCodec, Reason};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::codec::{Decoder, Encoder};

fn sample_frames() -> Vec<BridgeFrame> {
    let md = MessageDescriptor::default()
        .with_format(Format::STRING)
        .with_ccsid(CCSID_UTF8);
    vec![
        BridgeFrame::Request(Request::Connect {
            qmgr_name: "QM1".into(),
            options: MQCNO_CLIENT_BINDING,
            channel_name: Some("DEV.APP.SVRCONN".into()),
            connection_name: Some("mq.example.com(1414)".into()),
            cipher_spec: Some("ANY_TLS12_OR_HIGHER".into()),
            client_auth: MQSCA_REQUIRED,
            user_id: Some("app".into()),
            password: Some("pässword".into()),
        }),
        BridgeFrame::Reply(Reply::ok(ReplyBody::Connect { hconn: 7 })),
        BridgeFrame::Request(Request::Get {
            hconn: 7,
            hobj: 9,
            options: 0x6004,
            wait_interval: 0,
            buffer_length: 1024,
        }),
        BridgeFrame::Reply(Reply::failed(
            Reason::NO_MSG_AVAILABLE,
            ReplyBody::Get {
                descriptor: Box::default(),
                data_length: 0,
                data: Bytes::new(),
            },
        )),
        BridgeFrame::Reply(Reply::ok(ReplyBody::Get {
            descriptor: Box::new(md),
            data_length: 11,
            data: Bytes::from_static(b"hello world"),
        })),
        BridgeFrame::Request(Request::Close { hconn: 7, hobj: 9 }),
        BridgeFrame::Reply(Reply::ok(ReplyBody::Close)),
        BridgeFrame::Request(Request::Disconnect { hconn: 7 }),
        BridgeFrame::Reply(Reply::ok(ReplyBody::Disconnect)),
    ]
}

fn encode_all(frames: &[BridgeFrame]) -> BytesMut {
    let mut codec = MqiCodec::new();
    let mut dst = BytesMut::new();
    for frame in frames {
        codec.encode(frame.clone(), &mut dst).unwrap();
    }
    dst
}

// =============================================================================
// Framing
// =============================================================================

#[test]
fn batched_frames_decode_in_order() {
    let frames = sample_frames();
    let mut buf = encode_all(&frames);
    let mut codec = MqiCodec::new();
    let mut decoded = Vec::new();
    while let Some(frame) = codec.decode(&mut buf).unwrap() {
        decoded.push(frame);
    }
    assert_eq!(decoded, frames);
    assert!(buf.is_empty());
}

#[test]
fn random_chunking_yields_same_frames() {
    let frames = sample_frames();
    let wire = encode_all(&frames);
    let mut rng = StdRng::seed_from_u64(0xB41D6E);

    for _ in 0..50 {
        let mut codec = MqiCodec::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        while offset < wire.len() {
            let step = rng.gen_range(1..=64).min(wire.len() - offset);
            buf.extend_from_slice(&wire[offset..offset + step]);
            offset += step;
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }
        assert_eq!(decoded, frames);
    }
}

#[test]
fn truncation_reply_keeps_full_length() {
    let reply = Reply {
        completion: CompletionCode::Warning,
        reason: Reason::TRUNCATED_MSG_ACCEPTED,
        body: ReplyBody::Get {
            descriptor: Box::default(),
            data_length: 5000,
            data: Bytes::from(vec![b'z'; 1024]),
        },
    };
    let mut buf = encode_all(&[BridgeFrame::Reply(reply.clone())]);
    match MqiCodec::new().decode(&mut buf).unwrap() {
        Some(BridgeFrame::Reply(back)) => {
            assert_eq!(back, reply);
            assert!(matches!(
                back.body,
                ReplyBody::Get { data_length: 5000, ref data, .. } if data.len() == 1024
            ));
        }
        other => panic!("expected a reply, got {:?}", other),
    }
}

#[test]
fn absent_credentials_stay_absent() {
    let req = Request::Connect {
        qmgr_name: "QM1".into(),
        options: MQCNO_CLIENT_BINDING,
        channel_name: None,
        connection_name: None,
        cipher_spec: None,
        client_auth: 1,
        user_id: None,
        password: None,
    };
    let mut buf = encode_all(&[BridgeFrame::Request(req.clone())]);
    assert_eq!(
        MqiCodec::new().decode(&mut buf).unwrap(),
        Some(BridgeFrame::Request(req))
    );
}

// =============================================================================
// Malformed input
// =============================================================================

#[test]
fn zero_length_frame_is_rejected() {
    let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
    assert!(MqiCodec::new().decode(&mut buf).is_err());
}

#[test]
fn length_prefix_alone_waits() {
    let mut buf = BytesMut::new();
    buf.put_u32(16);
    buf.put_u8(0x85);
    assert_eq!(MqiCodec::new().decode(&mut buf).unwrap(), None);
    assert_eq!(buf.len(), 5);
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut buf = BytesMut::new();
    // Disconnect reply: completion, reason, then one stray byte
    buf.put_u32(1 + 8 + 1);
    buf.put_u8(0x85);
    buf.put_i32(0);
    buf.put_i32(0);
    buf.put_u8(0xEE);
    let err = MqiCodec::new().decode(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn short_payload_is_rejected() {
    let mut buf = BytesMut::new();
    // Get request missing its last field
    buf.put_u32(1 + 16);
    buf.put_u8(0x03);
    buf.put_u32(1);
    buf.put_u32(2);
    buf.put_i32(0);
    buf.put_i32(0);
    let err = MqiCodec::new().decode(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
