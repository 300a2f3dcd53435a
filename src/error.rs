use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Completion code returned alongside every MQI reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Ok,
    Warning,
    Failed,
}

impl CompletionCode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => CompletionCode::Ok,
            1 => CompletionCode::Warning,
            _ => CompletionCode::Failed,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            CompletionCode::Ok => 0,
            CompletionCode::Warning => 1,
            CompletionCode::Failed => 2,
        }
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionCode::Ok => f.write_str("MQCC_OK"),
            CompletionCode::Warning => f.write_str("MQCC_WARNING"),
            CompletionCode::Failed => f.write_str("MQCC_FAILED"),
        }
    }
}

/// Queue manager reason code (MQRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reason(pub i32);

impl Reason {
    pub const NONE: Reason = Reason(0);
    pub const CONNECTION_BROKEN: Reason = Reason(2009);
    pub const ENVIRONMENT_ERROR: Reason = Reason(2012);
    pub const HCONN_ERROR: Reason = Reason(2018);
    pub const HOBJ_ERROR: Reason = Reason(2019);
    pub const NO_MSG_AVAILABLE: Reason = Reason(2033);
    pub const NOT_AUTHORIZED: Reason = Reason(2035);
    pub const Q_MGR_NAME_ERROR: Reason = Reason(2058);
    pub const Q_MGR_NOT_AVAILABLE: Reason = Reason(2059);
    pub const TRUNCATED_MSG_ACCEPTED: Reason = Reason(2079);
    pub const TRUNCATED_MSG_FAILED: Reason = Reason(2080);
    pub const UNKNOWN_OBJECT_NAME: Reason = Reason(2085);
    pub const FORMAT_ERROR: Reason = Reason(2110);
    pub const NOT_CONVERTED: Reason = Reason(2119);
    pub const Q_MGR_QUIESCING: Reason = Reason(2161);
    pub const Q_MGR_STOPPING: Reason = Reason(2162);
    pub const UNEXPECTED_ERROR: Reason = Reason(2195);
    pub const CONNECTION_QUIESCING: Reason = Reason(2202);
    pub const CONNECTION_STOPPING: Reason = Reason(2203);
    pub const SSL_INITIALIZATION_ERROR: Reason = Reason(2393);
    pub const HOST_NOT_AVAILABLE: Reason = Reason(2538);
    pub const CHANNEL_CONFIG_ERROR: Reason = Reason(2539);

    /// Symbolic name of the reason, or `"MQRC_UNKNOWN"`.
    pub fn name(&self) -> &'static str {
        match self.0 {
            0 => "MQRC_NONE",
            2009 => "MQRC_CONNECTION_BROKEN",
            2012 => "MQRC_ENVIRONMENT_ERROR",
            2018 => "MQRC_HCONN_ERROR",
            2019 => "MQRC_HOBJ_ERROR",
            2033 => "MQRC_NO_MSG_AVAILABLE",
            2035 => "MQRC_NOT_AUTHORIZED",
            2058 => "MQRC_Q_MGR_NAME_ERROR",
            2059 => "MQRC_Q_MGR_NOT_AVAILABLE",
            2079 => "MQRC_TRUNCATED_MSG_ACCEPTED",
            2080 => "MQRC_TRUNCATED_MSG_FAILED",
            2085 => "MQRC_UNKNOWN_OBJECT_NAME",
            2110 => "MQRC_FORMAT_ERROR",
            2119 => "MQRC_NOT_CONVERTED",
            2161 => "MQRC_Q_MGR_QUIESCING",
            2162 => "MQRC_Q_MGR_STOPPING",
            2195 => "MQRC_UNEXPECTED_ERROR",
            2202 => "MQRC_CONNECTION_QUIESCING",
            2203 => "MQRC_CONNECTION_STOPPING",
            2393 => "MQRC_SSL_INITIALIZATION_ERROR",
            2538 => "MQRC_HOST_NOT_AVAILABLE",
            2539 => "MQRC_CHANNEL_CONFIG_ERROR",
            _ => "MQRC_UNKNOWN",
        }
    }

    /// Reasons after which the connection handle can no longer be used.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            *self,
            Reason::CONNECTION_BROKEN
                | Reason::HCONN_ERROR
                | Reason::HOBJ_ERROR
                | Reason::Q_MGR_NOT_AVAILABLE
                | Reason::Q_MGR_QUIESCING
                | Reason::Q_MGR_STOPPING
                | Reason::CONNECTION_QUIESCING
                | Reason::CONNECTION_STOPPING
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// A failed (or warning) MQI call as reported by the queue manager.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("completion {completion}, reason {reason}")]
pub struct MqError {
    pub completion: CompletionCode,
    pub reason: Reason,
}

impl MqError {
    pub fn new(completion: CompletionCode, reason: Reason) -> Self {
        Self { completion, reason }
    }

    /// Shorthand for a `MQCC_FAILED` result.
    pub fn failed(reason: Reason) -> Self {
        Self::new(CompletionCode::Failed, reason)
    }
}

/// Errors raised by the fixed-width and variable-length field helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Value does not fit its fixed-width field and truncation was not requested
    #[error("input string of {length} bytes is too long for a {width} byte MQI field")]
    LengthViolation { width: usize, length: usize },
    /// Character that does not fit a single byte of a fixed-width field
    #[error("character {ch:?} cannot be stored in a single byte MQI field")]
    Unrepresentable { ch: char },
    /// Option input was neither an integer nor a list of integers
    #[error("invalid type for field {field}")]
    InvalidType { field: String },
    /// Not enough bytes left to read a field
    #[error("need {needed} bytes, only {available} available")]
    Underflow { needed: usize, available: usize },
}

/// Errors returned while establishing a connection to a queue manager.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// I/O-level error reaching the manager
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// TLS configuration or handshake failure
    #[error("tls error: {0}")]
    Tls(String),
    /// Connect parameters that cannot be used as given
    #[error("invalid connect options: {0}")]
    Config(String),
    /// Connect did not complete in time
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The manager refused the connection
    #[error("connect rejected: {0}")]
    Rejected(MqError),
}

impl ConnectError {
    /// Manager reason code equivalent to this failure.
    pub fn reason(&self) -> Reason {
        match self {
            ConnectError::Io(_) | ConnectError::Timeout(_) => Reason::HOST_NOT_AVAILABLE,
            ConnectError::Tls(_) => Reason::SSL_INITIALIZATION_ERROR,
            ConnectError::Config(_) => Reason::CHANNEL_CONFIG_ERROR,
            ConnectError::Rejected(e) => e.reason,
        }
    }

    /// Whether a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectError::Io(_) | ConnectError::Timeout(_) => true,
            ConnectError::Tls(_) | ConnectError::Config(_) => false,
            ConnectError::Rejected(e) => matches!(
                e.reason,
                Reason::Q_MGR_NOT_AVAILABLE | Reason::HOST_NOT_AVAILABLE | Reason::CONNECTION_BROKEN
            ),
        }
    }
}

/// Errors returned while opening a queue.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("open of '{object}' rejected: {error}")]
    Rejected { object: String, error: MqError },
    #[error("open of '{object}' timed out after {timeout:?}")]
    Timeout { object: String, timeout: Duration },
}

impl OpenError {
    pub fn reason(&self) -> Reason {
        match self {
            OpenError::Rejected { error, .. } => error.reason,
            OpenError::Timeout { .. } => Reason::CONNECTION_BROKEN,
        }
    }
}

/// Result of a single get call that did not produce a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GetError {
    /// Message is longer than the supplied buffer. When `accepted` is true the
    /// message was removed from the queue and only its prefix was returned.
    #[error("message of {data_length} bytes does not fit a {buffer_length} byte buffer")]
    Truncated {
        data_length: usize,
        buffer_length: usize,
        accepted: bool,
    },
    #[error(transparent)]
    Mq(#[from] MqError),
}

impl GetError {
    pub fn reason(&self) -> Reason {
        match self {
            GetError::Truncated { accepted: true, .. } => Reason::TRUNCATED_MSG_ACCEPTED,
            GetError::Truncated { accepted: false, .. } => Reason::TRUNCATED_MSG_FAILED,
            GetError::Mq(e) => e.reason,
        }
    }
}

/// Malformed envelope or message that has to be skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("{header} header needs {needed} bytes, message has {available}")]
    Truncated {
        header: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("{header} header has unexpected structure id {found:?}")]
    BadStrucId { header: &'static str, found: String },
    #[error("{header} header declares invalid length {length}")]
    BadStrucLength { header: &'static str, length: i64 },
    #[error("malformed name/value data: {0}")]
    MalformedProperties(String),
    #[error("more than {0} nested envelopes")]
    TooManyEnvelopes(usize),
    #[error("message of {length} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { length: usize, limit: usize },
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Classified failure of one retrieval attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// Queue is empty; expected and never logged as an error
    #[error("no message available")]
    NoMessageAvailable,
    /// The connection or queue handle is gone; the loop must stop
    #[error("connection lost: {0}")]
    Fatal(MqError),
    /// Any other manager failure; logged and the loop continues
    #[error("get failed: {0}")]
    Other(MqError),
    /// Message could not be retrieved or decoded and was skipped
    #[error("message skipped: {0}")]
    Format(#[from] FormatError),
}

impl RetrievalError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RetrievalError::Fatal(_))
    }
}

impl From<MqError> for RetrievalError {
    fn from(error: MqError) -> Self {
        if error.reason == Reason::NO_MSG_AVAILABLE {
            RetrievalError::NoMessageAvailable
        } else if error.reason.is_connection_fatal() {
            RetrievalError::Fatal(error)
        } else {
            RetrievalError::Other(error)
        }
    }
}
