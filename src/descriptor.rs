use bytes::{BufMut, BytesMut};

use crate::constants::*;
use crate::error::WireError;
use crate::format::Format;
use crate::wire::{FieldReader, put_fixed_string, put_i32};

/// Encoded size of a version 1 message descriptor.
pub const MQMD_LENGTH_1: usize = 324;

/// Metadata returned with each message (MQMD, version 1 fields).
///
/// A fresh descriptor is passed to every get; the queue manager fills it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub report: i32,
    pub msg_type: i32,
    pub expiry: i32,
    pub feedback: i32,
    /// Numeric encoding of the message data
    pub encoding: i32,
    /// Character set of the message data
    pub ccsid: i32,
    /// Structural type of the message data
    pub format: Format,
    pub priority: i32,
    pub persistence: i32,
    pub msg_id: [u8; MQ_MSG_ID_LENGTH],
    pub correl_id: [u8; MQ_CORREL_ID_LENGTH],
    pub backout_count: i32,
    pub reply_to_q: Option<String>,
    pub reply_to_qmgr: Option<String>,
    pub user_identifier: Option<String>,
    pub accounting_token: [u8; MQ_ACCOUNTING_TOKEN_LENGTH],
    pub appl_identity_data: Option<String>,
    pub put_appl_type: i32,
    pub put_appl_name: Option<String>,
    pub put_date: Option<String>,
    pub put_time: Option<String>,
    pub appl_origin_data: Option<String>,
}

impl Default for MessageDescriptor {
    fn default() -> Self {
        Self {
            report: 0,
            msg_type: MQMT_DATAGRAM,
            expiry: MQEI_UNLIMITED,
            feedback: 0,
            encoding: MQENC_NATIVE,
            ccsid: MQCCSI_Q_MGR,
            format: Format::NONE,
            priority: MQPRI_PRIORITY_AS_Q_DEF,
            persistence: MQPER_PERSISTENCE_AS_Q_DEF,
            msg_id: [0; MQ_MSG_ID_LENGTH],
            correl_id: [0; MQ_CORREL_ID_LENGTH],
            backout_count: 0,
            reply_to_q: None,
            reply_to_qmgr: None,
            user_identifier: None,
            accounting_token: [0; MQ_ACCOUNTING_TOKEN_LENGTH],
            appl_identity_data: None,
            put_appl_type: 0,
            put_appl_name: None,
            put_date: None,
            put_time: None,
            appl_origin_data: None,
        }
    }
}

impl MessageDescriptor {
    /// Set the format tag (builder style).
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the character set of the data (builder style).
    pub fn with_ccsid(mut self, ccsid: i32) -> Self {
        self.ccsid = ccsid;
        self
    }

    /// Set the numeric encoding of the data (builder style).
    pub fn with_encoding(mut self, encoding: i32) -> Self {
        self.encoding = encoding;
        self
    }

    /// Message id rendered as lowercase hex.
    pub fn msg_id_hex(&self) -> String {
        self.msg_id.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Append the MQMD version 1 layout to `dst`, integers in `encoding`.
    pub fn encode(&self, dst: &mut BytesMut, encoding: i32) -> Result<(), WireError> {
        dst.put_slice(MQMD_STRUC_ID);
        for v in [
            MQMD_VERSION_1,
            self.report,
            self.msg_type,
            self.expiry,
            self.feedback,
            self.encoding,
            self.ccsid,
        ] {
            put_i32(dst, v, encoding);
        }
        dst.put_slice(self.format.as_bytes());
        put_i32(dst, self.priority, encoding);
        put_i32(dst, self.persistence, encoding);
        dst.put_slice(&self.msg_id);
        dst.put_slice(&self.correl_id);
        put_i32(dst, self.backout_count, encoding);
        put_fixed_string(dst, self.reply_to_q.as_deref(), MQ_Q_NAME_LENGTH, false)?;
        put_fixed_string(dst, self.reply_to_qmgr.as_deref(), MQ_Q_MGR_NAME_LENGTH, false)?;
        put_fixed_string(dst, self.user_identifier.as_deref(), MQ_USER_ID_LENGTH, false)?;
        dst.put_slice(&self.accounting_token);
        put_fixed_string(
            dst,
            self.appl_identity_data.as_deref(),
            MQ_APPL_IDENTITY_DATA_LENGTH,
            false,
        )?;
        put_i32(dst, self.put_appl_type, encoding);
        put_fixed_string(dst, self.put_appl_name.as_deref(), MQ_PUT_APPL_NAME_LENGTH, true)?;
        put_fixed_string(dst, self.put_date.as_deref(), MQ_PUT_DATE_LENGTH, false)?;
        put_fixed_string(dst, self.put_time.as_deref(), MQ_PUT_TIME_LENGTH, false)?;
        put_fixed_string(
            dst,
            self.appl_origin_data.as_deref(),
            MQ_APPL_ORIGIN_DATA_LENGTH,
            false,
        )?;
        Ok(())
    }

    /// Parse a version 1 MQMD from the start of `data`.
    pub fn decode(data: &[u8], encoding: i32) -> Result<Self, WireError> {
        let mut r = FieldReader::new(data, encoding);
        r.take(4)?; // StrucId
        r.i32()?; // Version
        let mut md = MessageDescriptor {
            report: r.i32()?,
            msg_type: r.i32()?,
            expiry: r.i32()?,
            feedback: r.i32()?,
            encoding: r.i32()?,
            ccsid: r.i32()?,
            format: Format::from_bytes(r.take(MQ_FORMAT_LENGTH)?)?,
            priority: r.i32()?,
            persistence: r.i32()?,
            ..MessageDescriptor::default()
        };
        md.msg_id.copy_from_slice(r.take(MQ_MSG_ID_LENGTH)?);
        md.correl_id.copy_from_slice(r.take(MQ_CORREL_ID_LENGTH)?);
        md.backout_count = r.i32()?;
        md.reply_to_q = r.fixed_string(MQ_Q_NAME_LENGTH)?;
        md.reply_to_qmgr = r.fixed_string(MQ_Q_MGR_NAME_LENGTH)?;
        md.user_identifier = r.fixed_string(MQ_USER_ID_LENGTH)?;
        md.accounting_token
            .copy_from_slice(r.take(MQ_ACCOUNTING_TOKEN_LENGTH)?);
        md.appl_identity_data = r.fixed_string(MQ_APPL_IDENTITY_DATA_LENGTH)?;
        md.put_appl_type = r.i32()?;
        md.put_appl_name = r.fixed_string(MQ_PUT_APPL_NAME_LENGTH)?;
        md.put_date = r.fixed_string(MQ_PUT_DATE_LENGTH)?;
        md.put_time = r.fixed_string(MQ_PUT_TIME_LENGTH)?;
        md.appl_origin_data = r.fixed_string(MQ_APPL_ORIGIN_DATA_LENGTH)?;
        Ok(md)
    }
}

/// Names the object to open (MQOD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    pub object_type: i32,
    pub object_name: String,
    pub object_qmgr_name: Option<String>,
}

impl ObjectDescriptor {
    /// Descriptor for a local queue on the connected manager.
    pub fn queue(name: impl Into<String>) -> Self {
        Self {
            object_type: MQOT_Q,
            object_name: name.into(),
            object_qmgr_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_length_is_fixed() {
        let mut dst = BytesMut::new();
        MessageDescriptor::default()
            .encode(&mut dst, MQENC_INTEGER_NORMAL)
            .expect("encode");
        assert_eq!(dst.len(), MQMD_LENGTH_1);
    }

    #[test]
    fn decode_reads_back_populated_fields() {
        let mut md = MessageDescriptor::default()
            .with_format(Format::STRING)
            .with_ccsid(CCSID_UTF8);
        md.msg_id[0] = 0xAB;
        md.backout_count = 3;
        md.reply_to_q = Some("REPLY.Q".into());
        md.put_appl_name = Some("valuation-feed".into());
        md.put_date = Some("20240102".into());

        let mut dst = BytesMut::new();
        md.encode(&mut dst, MQENC_NATIVE).expect("encode");
        let back = MessageDescriptor::decode(&dst, MQENC_NATIVE).expect("decode");
        assert_eq!(back, md);
        assert!(back.msg_id_hex().starts_with("ab00"));
    }

    #[test]
    fn decode_short_buffer_fails() {
        let err = MessageDescriptor::decode(&[0u8; 40], MQENC_NATIVE).unwrap_err();
        assert!(matches!(err, WireError::Underflow { .. }));
    }
}
