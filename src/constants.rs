//! Numeric MQI constants used by the consumer.
//!
//! Only the subset the client actually sends or inspects is defined here.
//! Values match the queue manager's published interface so they can be
//! exchanged with a real bridge unchanged.

// Get-message options (MQGMO.Options)
pub const MQGMO_WAIT: i32 = 0x0000_0001;
pub const MQGMO_NO_WAIT: i32 = 0x0000_0000;
pub const MQGMO_SYNCPOINT: i32 = 0x0000_0002;
pub const MQGMO_NO_SYNCPOINT: i32 = 0x0000_0004;
pub const MQGMO_ACCEPT_TRUNCATED_MSG: i32 = 0x0000_0040;
pub const MQGMO_FAIL_IF_QUIESCING: i32 = 0x0000_2000;
pub const MQGMO_CONVERT: i32 = 0x0000_4000;

// Open options (MQOO)
pub const MQOO_INPUT_AS_Q_DEF: i32 = 0x0000_0001;
pub const MQOO_FAIL_IF_QUIESCING: i32 = 0x0000_2000;

// Object types (MQOD.ObjectType)
pub const MQOT_Q: i32 = 1;

// Connect options (MQCNO.Options)
pub const MQCNO_NONE: i32 = 0x0000_0000;
pub const MQCNO_CLIENT_BINDING: i32 = 0x0000_0100;
pub const MQCNO_LOCAL_BINDING: i32 = 0x0000_0400;

// SSL client authentication (MQCD.SSLClientAuth)
pub const MQSCA_REQUIRED: i32 = 0;
pub const MQSCA_OPTIONAL: i32 = 1;

// Numeric encodings (MQMD.Encoding)
pub const MQENC_INTEGER_MASK: i32 = 0x0000_000F;
pub const MQENC_INTEGER_UNDEFINED: i32 = 0x0000_0000;
pub const MQENC_INTEGER_NORMAL: i32 = 0x0000_0001;
pub const MQENC_INTEGER_REVERSED: i32 = 0x0000_0002;
pub const MQENC_NATIVE: i32 = 0x0000_0222;

// Coded character set identifiers
pub const MQCCSI_APPL: i32 = -3;
pub const MQCCSI_INHERIT: i32 = -2;
pub const MQCCSI_EMBEDDED: i32 = -1;
pub const MQCCSI_Q_MGR: i32 = 0;
pub const CCSID_EBCDIC_US: i32 = 37;
pub const CCSID_ASCII: i32 = 367;
pub const CCSID_ISO_8859_1: i32 = 819;
pub const CCSID_UTF8: i32 = 1208;

// Message descriptor defaults
pub const MQMD_STRUC_ID: &[u8; 4] = b"MD  ";
pub const MQMD_VERSION_1: i32 = 1;
pub const MQMT_DATAGRAM: i32 = 8;
pub const MQEI_UNLIMITED: i32 = -1;
pub const MQPRI_PRIORITY_AS_Q_DEF: i32 = -1;
pub const MQPER_PERSISTENCE_AS_Q_DEF: i32 = 2;

// Header structure identifiers and lengths
pub const MQRFH_STRUC_ID: &[u8; 4] = b"RFH ";
pub const MQRFH_VERSION_2: i32 = 2;
pub const MQRFH_STRUC_LENGTH_FIXED_2: usize = 36;
pub const MQDLH_STRUC_ID: &[u8; 4] = b"DLH ";
pub const MQDLH_VERSION_1: i32 = 1;
pub const MQDLH_STRUC_LENGTH: usize = 172;

// Fixed field widths
pub const MQ_Q_NAME_LENGTH: usize = 48;
pub const MQ_Q_MGR_NAME_LENGTH: usize = 48;
pub const MQ_FORMAT_LENGTH: usize = 8;
pub const MQ_MSG_ID_LENGTH: usize = 24;
pub const MQ_CORREL_ID_LENGTH: usize = 24;
pub const MQ_USER_ID_LENGTH: usize = 12;
pub const MQ_ACCOUNTING_TOKEN_LENGTH: usize = 32;
pub const MQ_APPL_IDENTITY_DATA_LENGTH: usize = 32;
pub const MQ_PUT_APPL_NAME_LENGTH: usize = 28;
pub const MQ_PUT_DATE_LENGTH: usize = 8;
pub const MQ_PUT_TIME_LENGTH: usize = 8;
pub const MQ_APPL_ORIGIN_DATA_LENGTH: usize = 4;
pub const MQ_CHANNEL_NAME_LENGTH: usize = 20;
pub const MQ_CONN_NAME_LENGTH: usize = 264;
pub const MQ_SSL_CIPHER_SPEC_LENGTH: usize = 32;
