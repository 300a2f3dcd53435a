use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::constants::*;
use crate::descriptor::{MQMD_LENGTH_1, MessageDescriptor};
use crate::error::{CompletionCode, Reason, WireError};
use crate::wire::{
    CharV, FieldReader, pack_variable_string, put_fixed_string, unpack_variable_string,
};

/// Largest frame accepted in either direction (length prefix excluded).
pub const MAX_FRAME_LENGTH: usize = 128 * 1024 * 1024;

/// Integer encoding used for every field on the bridge.
pub const BRIDGE_ENCODING: i32 = MQENC_INTEGER_NORMAL;

const OP_CONNECT: u8 = 0x01;
const OP_OPEN: u8 = 0x02;
const OP_GET: u8 = 0x03;
const OP_CLOSE: u8 = 0x04;
const OP_DISCONNECT: u8 = 0x05;
const REPLY_BIT: u8 = 0x80;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn wire_to_io(e: WireError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e)
}

/// A call sent to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Connect {
        qmgr_name: String,
        options: i32,
        channel_name: Option<String>,
        connection_name: Option<String>,
        cipher_spec: Option<String>,
        client_auth: i32,
        user_id: Option<String>,
        password: Option<String>,
    },
    Open {
        hconn: u32,
        object_type: i32,
        object_name: String,
        options: i32,
    },
    Get {
        hconn: u32,
        hobj: u32,
        options: i32,
        wait_interval: i32,
        buffer_length: u32,
    },
    Close {
        hconn: u32,
        hobj: u32,
    },
    Disconnect {
        hconn: u32,
    },
}

impl Request {
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Connect { .. } => OP_CONNECT,
            Request::Open { .. } => OP_OPEN,
            Request::Get { .. } => OP_GET,
            Request::Close { .. } => OP_CLOSE,
            Request::Disconnect { .. } => OP_DISCONNECT,
        }
    }
}

/// Operation-specific part of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    Connect {
        hconn: u32,
    },
    Open {
        hobj: u32,
    },
    /// `data` holds at most the requested buffer length; `data_length` is
    /// the full message length, which is larger when truncated.
    Get {
        descriptor: Box<MessageDescriptor>,
        data_length: u32,
        data: Bytes,
    },
    Close,
    Disconnect,
}

/// Outcome of one bridge call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub completion: CompletionCode,
    pub reason: Reason,
    pub body: ReplyBody,
}

impl Reply {
    pub fn opcode(&self) -> u8 {
        REPLY_BIT
            | match self.body {
                ReplyBody::Connect { .. } => OP_CONNECT,
                ReplyBody::Open { .. } => OP_OPEN,
                ReplyBody::Get { .. } => OP_GET,
                ReplyBody::Close => OP_CLOSE,
                ReplyBody::Disconnect => OP_DISCONNECT,
            }
    }

    pub fn ok(body: ReplyBody) -> Self {
        Self {
            completion: CompletionCode::Ok,
            reason: Reason::NONE,
            body,
        }
    }

    pub fn failed(reason: Reason, body: ReplyBody) -> Self {
        Self {
            completion: CompletionCode::Failed,
            reason,
            body,
        }
    }
}

/// Items produced or consumed by [`MqiCodec`].
///
/// The codec is symmetric: a client encodes requests and decodes replies, a
/// bridge (or a test double) does the opposite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeFrame {
    Request(Request),
    Reply(Reply),
}

/// `tokio_util` codec for the bridge protocol.
///
/// Each frame is a big-endian `u32` length (excluding itself), a one byte
/// opcode and an opcode-specific payload. Reply opcodes are the request
/// opcode with the high bit set.
#[derive(Debug, Default)]
pub struct MqiCodec {}

impl MqiCodec {
    pub fn new() -> Self {
        Self {}
    }
}

fn put_charv(dst: &mut BytesMut, value: Option<&str>) {
    let mut desc = CharV::default();
    pack_variable_string(&mut desc, value, false);
    dst.put_i32(desc.ccsid);
    dst.put_u32(desc.length as u32);
    dst.put_slice(desc.as_bytes());
}

fn read_charv(r: &mut FieldReader<'_>) -> Result<Option<String>, WireError> {
    let ccsid = r.i32()?;
    let length = r.u32()? as usize;
    let mut buf = r.take(length)?.to_vec();
    buf.push(0);
    let mut desc = CharV {
        buf_size: buf.len(),
        ptr: Some(buf),
        offset: 0,
        length,
        ccsid,
    };
    Ok(unpack_variable_string(&mut desc))
}

fn encode_request(req: &Request, dst: &mut BytesMut) -> Result<(), WireError> {
    match req {
        Request::Connect {
            qmgr_name,
            options,
            channel_name,
            connection_name,
            cipher_spec,
            client_auth,
            user_id,
            password,
        } => {
            put_fixed_string(dst, Some(qmgr_name.as_str()), MQ_Q_MGR_NAME_LENGTH, false)?;
            dst.put_i32(*options);
            put_fixed_string(dst, channel_name.as_deref(), MQ_CHANNEL_NAME_LENGTH, false)?;
            put_fixed_string(dst, connection_name.as_deref(), MQ_CONN_NAME_LENGTH, false)?;
            put_fixed_string(dst, cipher_spec.as_deref(), MQ_SSL_CIPHER_SPEC_LENGTH, false)?;
            dst.put_i32(*client_auth);
            put_charv(dst, user_id.as_deref());
            put_charv(dst, password.as_deref());
        }
        Request::Open {
            hconn,
            object_type,
            object_name,
            options,
        } => {
            dst.put_u32(*hconn);
            dst.put_i32(*object_type);
            put_fixed_string(dst, Some(object_name.as_str()), MQ_Q_NAME_LENGTH, false)?;
            dst.put_i32(*options);
        }
        Request::Get {
            hconn,
            hobj,
            options,
            wait_interval,
            buffer_length,
        } => {
            dst.put_u32(*hconn);
            dst.put_u32(*hobj);
            dst.put_i32(*options);
            dst.put_i32(*wait_interval);
            dst.put_u32(*buffer_length);
        }
        Request::Close { hconn, hobj } => {
            dst.put_u32(*hconn);
            dst.put_u32(*hobj);
        }
        Request::Disconnect { hconn } => dst.put_u32(*hconn),
    }
    Ok(())
}

fn decode_request(op: u8, r: &mut FieldReader<'_>) -> Result<Request, WireError> {
    let req = match op {
        OP_CONNECT => Request::Connect {
            qmgr_name: r.fixed_string(MQ_Q_MGR_NAME_LENGTH)?.unwrap_or_default(),
            options: r.i32()?,
            channel_name: r.fixed_string(MQ_CHANNEL_NAME_LENGTH)?,
            connection_name: r.fixed_string(MQ_CONN_NAME_LENGTH)?,
            cipher_spec: r.fixed_string(MQ_SSL_CIPHER_SPEC_LENGTH)?,
            client_auth: r.i32()?,
            user_id: read_charv(r)?,
            password: read_charv(r)?,
        },
        OP_OPEN => Request::Open {
            hconn: r.u32()?,
            object_type: r.i32()?,
            object_name: r.fixed_string(MQ_Q_NAME_LENGTH)?.unwrap_or_default(),
            options: r.i32()?,
        },
        OP_GET => Request::Get {
            hconn: r.u32()?,
            hobj: r.u32()?,
            options: r.i32()?,
            wait_interval: r.i32()?,
            buffer_length: r.u32()?,
        },
        OP_CLOSE => Request::Close {
            hconn: r.u32()?,
            hobj: r.u32()?,
        },
        OP_DISCONNECT => Request::Disconnect { hconn: r.u32()? },
        _ => {
            return Err(WireError::InvalidType {
                field: format!("opcode 0x{:02x}", op),
            });
        }
    };
    Ok(req)
}

fn encode_reply(reply: &Reply, dst: &mut BytesMut) -> Result<(), WireError> {
    dst.put_i32(reply.completion.as_i32());
    dst.put_i32(reply.reason.0);
    match &reply.body {
        ReplyBody::Connect { hconn } => dst.put_u32(*hconn),
        ReplyBody::Open { hobj } => dst.put_u32(*hobj),
        ReplyBody::Get {
            descriptor,
            data_length,
            data,
        } => {
            descriptor.encode(dst, BRIDGE_ENCODING)?;
            dst.put_u32(*data_length);
            dst.put_u32(data.len() as u32);
            dst.put_slice(data);
        }
        ReplyBody::Close | ReplyBody::Disconnect => {}
    }
    Ok(())
}

fn decode_reply(op: u8, r: &mut FieldReader<'_>) -> Result<Reply, WireError> {
    let completion = CompletionCode::from_i32(r.i32()?);
    let reason = Reason(r.i32()?);
    let body = match op {
        OP_CONNECT => ReplyBody::Connect { hconn: r.u32()? },
        OP_OPEN => ReplyBody::Open { hobj: r.u32()? },
        OP_GET => {
            let descriptor = MessageDescriptor::decode(r.take(MQMD_LENGTH_1)?, BRIDGE_ENCODING)?;
            let data_length = r.u32()?;
            let returned = r.u32()? as usize;
            ReplyBody::Get {
                descriptor: Box::new(descriptor),
                data_length,
                data: Bytes::copy_from_slice(r.take(returned)?),
            }
        }
        OP_CLOSE => ReplyBody::Close,
        OP_DISCONNECT => ReplyBody::Disconnect,
        _ => {
            return Err(WireError::InvalidType {
                field: format!("opcode 0x{:02x}", op),
            });
        }
    };
    Ok(Reply {
        completion,
        reason,
        body,
    })
}

impl Decoder for MqiCodec {
    type Item = BridgeFrame;
    type Error = io::Error;

    /// Decode one complete frame from `src`, or return `Ok(None)` and leave
    /// `src` untouched until more bytes arrive.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len == 0 || len > MAX_FRAME_LENGTH {
            return Err(invalid_data(format!("invalid frame length {}", len)));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        let mut frame = src.split_to(4 + len);
        frame.advance(4);
        let op = frame.get_u8();
        let base = op & !REPLY_BIT;
        if !(OP_CONNECT..=OP_DISCONNECT).contains(&base) {
            return Err(invalid_data(format!("unknown opcode 0x{:02x}", op)));
        }
        let mut r = FieldReader::new(&frame, BRIDGE_ENCODING);
        let item = if op & REPLY_BIT != 0 {
            decode_reply(base, &mut r).map(BridgeFrame::Reply)
        } else {
            decode_request(base, &mut r).map(BridgeFrame::Request)
        }
        .map_err(|e| invalid_data(format!("malformed frame 0x{:02x}: {}", op, e)))?;
        if r.remaining() != 0 {
            return Err(invalid_data(format!(
                "{} trailing bytes in frame 0x{:02x}",
                r.remaining(),
                op
            )));
        }
        Ok(Some(item))
    }
}

impl Encoder<BridgeFrame> for MqiCodec {
    type Error = io::Error;

    fn encode(&mut self, item: BridgeFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        dst.put_u32(0);
        let written = match &item {
            BridgeFrame::Request(req) => {
                dst.put_u8(req.opcode());
                encode_request(req, dst)
            }
            BridgeFrame::Reply(reply) => {
                dst.put_u8(reply.opcode());
                encode_reply(reply, dst)
            }
        };
        if let Err(e) = written {
            dst.truncate(start);
            return Err(wire_to_io(e));
        }
        let len = dst.len() - start - 4;
        if len > MAX_FRAME_LENGTH {
            dst.truncate(start);
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {} bytes exceeds limit", len),
            ));
        }
        dst[start..start + 4].copy_from_slice(&(len as u32).to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;

    fn encode(item: BridgeFrame) -> BytesMut {
        let mut dst = BytesMut::new();
        MqiCodec::new().encode(item, &mut dst).unwrap();
        dst
    }

    #[test]
    fn connect_credentials_travel_as_charv() {
        let req = Request::Connect {
            qmgr_name: "QM1".into(),
            options: MQCNO_CLIENT_BINDING,
            channel_name: Some("APP.SVRCONN".into()),
            connection_name: Some("localhost(1414)".into()),
            cipher_spec: None,
            client_auth: MQSCA_OPTIONAL,
            user_id: Some("app".into()),
            password: None,
        };
        let mut buf = encode(BridgeFrame::Request(req.clone()));
        let out = MqiCodec::new().decode(&mut buf).unwrap();
        assert_eq!(out, Some(BridgeFrame::Request(req)));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let reply = Reply::ok(ReplyBody::Get {
            descriptor: Box::new(MessageDescriptor::default().with_format(Format::STRING)),
            data_length: 5,
            data: Bytes::from_static(b"hello"),
        });
        let full = encode(BridgeFrame::Reply(reply.clone()));
        let mut codec = MqiCodec::new();
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&full[full.len() - 1..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(BridgeFrame::Reply(reply)));
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 1, 0x7f][..]);
        let err = MqiCodec::new().decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LENGTH as u32 + 1);
        assert!(MqiCodec::new().decode(&mut buf).is_err());
    }

    #[test]
    fn overlong_queue_name_fails_to_encode() {
        let req = Request::Open {
            hconn: 1,
            object_type: MQOT_Q,
            object_name: "Q".repeat(49),
            options: MQOO_INPUT_AS_Q_DEF,
        };
        let mut dst = BytesMut::new();
        let err = MqiCodec::new()
            .encode(BridgeFrame::Request(req), &mut dst)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(dst.is_empty());
    }
}
