//! Connect, open and get parameters.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::*;
use crate::error::WireError;
use crate::wire::{FlagValue, flags_to_integer};

/// Options for a single get call (MQGMO).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub options: i32,
    /// Milliseconds to wait when `MQGMO_WAIT` is set
    pub wait_interval: i32,
}

impl Default for GetOptions {
    /// Non-blocking, outside any unit of work, converted, failing when the
    /// manager is quiescing.
    fn default() -> Self {
        Self {
            options: MQGMO_NO_SYNCPOINT | MQGMO_NO_WAIT | MQGMO_CONVERT | MQGMO_FAIL_IF_QUIESCING,
            wait_interval: 0,
        }
    }
}

impl GetOptions {
    /// Build options from a loosely typed flag value.
    pub fn from_flags(value: &FlagValue) -> Result<Self, WireError> {
        Ok(Self {
            options: flags_to_integer("Gmo.Options", value)?,
            wait_interval: 0,
        })
    }

    pub fn has(&self, flag: i32) -> bool {
        self.options & flag == flag
    }

    /// Copy with `flag` added.
    pub fn with(mut self, flag: i32) -> Self {
        self.options |= flag;
        self
    }

    pub fn is_no_wait(&self) -> bool {
        self.options & MQGMO_WAIT == 0
    }
}

/// Resolve a get option by name (`"no-wait"` or `"MQGMO_NO_WAIT"`).
pub fn parse_gmo_flag(name: &str) -> Option<i32> {
    let normalized = name
        .trim()
        .trim_start_matches("MQGMO_")
        .to_ascii_lowercase()
        .replace('_', "-");
    match normalized.as_str() {
        "no-wait" => Some(MQGMO_NO_WAIT),
        "no-syncpoint" => Some(MQGMO_NO_SYNCPOINT),
        "convert" => Some(MQGMO_CONVERT),
        "fail-if-quiescing" => Some(MQGMO_FAIL_IF_QUIESCING),
        _ => None,
    }
}

/// Credentials presented on connect (MQCSP).
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityParms {
    pub user_id: String,
    pub password: String,
}

impl fmt::Debug for SecurityParms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityParms")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Whether the manager must receive a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientAuth {
    Required,
    #[default]
    Optional,
}

impl ClientAuth {
    pub fn as_i32(&self) -> i32 {
        match self {
            ClientAuth::Required => MQSCA_REQUIRED,
            ClientAuth::Optional => MQSCA_OPTIONAL,
        }
    }
}

/// Lowest TLS protocol version accepted for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Derive the minimum version from a channel cipher spec.
    ///
    /// `ANY_TLS13*` selects TLS 1.3; every other accepted spec (`ANY`,
    /// `ANY_TLS12*` or a named TLS 1.2 suite) selects TLS 1.2.
    pub fn from_cipher_spec(spec: &str) -> Option<Self> {
        let spec = spec.trim().to_ascii_uppercase();
        if spec.starts_with("ANY_TLS13")
            || spec.starts_with("TLS_AES_")
            || spec.starts_with("TLS_CHACHA20_")
        {
            Some(TlsVersion::Tls13)
        } else if spec == "ANY"
            || spec.starts_with("ANY_TLS12")
            || spec.starts_with("TLS_")
            || spec.starts_with("ECDHE_")
        {
            Some(TlsVersion::Tls12)
        } else {
            None
        }
    }
}

/// Client channel definition (MQCD subset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientChannel {
    pub channel_name: String,
    /// `host(port)` or `host:port`
    pub connection_name: String,
    pub ssl_cipher_spec: Option<String>,
    pub ssl_client_auth: ClientAuth,
}

impl ClientChannel {
    pub fn new(channel_name: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            connection_name: connection_name.into(),
            ssl_cipher_spec: None,
            ssl_client_auth: ClientAuth::default(),
        }
    }

    pub fn with_cipher_spec(mut self, spec: impl Into<String>) -> Self {
        self.ssl_cipher_spec = Some(spec.into());
        self
    }

    pub fn with_client_auth(mut self, auth: ClientAuth) -> Self {
        self.ssl_client_auth = auth;
        self
    }

    /// Split the connection name into host and port (default port 1414).
    pub fn endpoint(&self) -> Result<(String, u16), String> {
        parse_conn_name(&self.connection_name)
    }
}

/// Default listener port of a queue manager.
pub const DEFAULT_PORT: u16 = 1414;

/// Parse `host(port)`, `host:port` or a bare host.
pub fn parse_conn_name(conn_name: &str) -> Result<(String, u16), String> {
    let conn_name = conn_name.trim();
    let (host, port) = if let Some(open) = conn_name.find('(') {
        let close = conn_name
            .rfind(')')
            .filter(|&c| c > open)
            .ok_or_else(|| format!("unbalanced parentheses in '{}'", conn_name))?;
        (&conn_name[..open], Some(&conn_name[open + 1..close]))
    } else if let Some((h, p)) = conn_name.rsplit_once(':') {
        (h, Some(p))
    } else {
        (conn_name, None)
    };
    if host.trim().is_empty() {
        return Err(format!("missing host in '{}'", conn_name));
    }
    let port = match port {
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{}': {}", p, e))?,
        None => DEFAULT_PORT,
    };
    Ok((host.trim().to_string(), port))
}

/// TLS material for the channel (MQSCO subset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslConfig {
    /// PEM bundle of trusted certificate authorities
    pub key_repository: PathBuf,
    /// PEM client certificate chain, presented when the manager asks
    pub client_certificate: Option<PathBuf>,
    /// PEM private key matching `client_certificate`
    pub client_key: Option<PathBuf>,
}

impl SslConfig {
    pub fn new(key_repository: impl Into<PathBuf>) -> Self {
        Self {
            key_repository: key_repository.into(),
            client_certificate: None,
            client_key: None,
        }
    }

    pub fn with_client_identity(
        mut self,
        certificate: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.client_certificate = Some(certificate.into());
        self.client_key = Some(key.into());
        self
    }
}

/// How the application reaches the queue manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    Client,
    Local,
}

/// Parameters for connecting to a queue manager (MQCNO).
///
/// Build with `ConnectOptions::default()` and the `with_*` helpers.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub binding: Binding,
    pub security: Option<SecurityParms>,
    pub channel: Option<ClientChannel>,
    pub ssl: Option<SslConfig>,
    /// Upper bound for the connect call and for each open call
    pub timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn with_credentials(
        mut self,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.security = Some(SecurityParms {
            user_id: user_id.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_channel(mut self, channel: ClientChannel) -> Self {
        self.binding = Binding::Client;
        self.channel = Some(channel);
        self
    }

    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// MQCNO.Options value for the selected binding.
    pub fn cno_options(&self) -> i32 {
        match self.binding {
            Binding::Client => MQCNO_CLIENT_BINDING,
            Binding::Local => MQCNO_LOCAL_BINDING,
        }
    }
}
