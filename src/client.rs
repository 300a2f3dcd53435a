//! Network adapter: drives the bridge protocol over TCP, optionally TLS.
//!
//! Every call is one request frame followed by one reply frame. A transport
//! failure in the middle of a call drops the stream and is reported as
//! `MQRC_CONNECTION_BROKEN`, which the consumer treats as fatal.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{BridgeFrame, MqiCodec, Reply, ReplyBody, Request};
use crate::descriptor::{MessageDescriptor, ObjectDescriptor};
use crate::error::{CompletionCode, ConnectError, GetError, MqError, Reason};
use crate::mqi::{Hconn, Hobj, Mqi};
use crate::options::{Binding, ClientAuth, ConnectOptions, GetOptions, SslConfig, TlsVersion};

/// Byte stream the bridge runs over (plain TCP or TLS).
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type Transport = Framed<Box<dyn AsyncStream>, MqiCodec>;

fn broken() -> MqError {
    MqError::failed(Reason::CONNECTION_BROKEN)
}

fn reply_error(reply: &Reply) -> Option<MqError> {
    match reply.completion {
        CompletionCode::Ok => None,
        completion => Some(MqError::new(completion, reply.reason)),
    }
}

/// [`Mqi`] implementation that talks to a queue manager bridge.
#[derive(Default)]
pub struct ClientMqi {
    transport: Option<Transport>,
}

impl ClientMqi {
    pub fn new() -> Self {
        Self { transport: None }
    }

    /// Adapter over an already established stream. Used by tests and by
    /// callers that manage their own sockets.
    pub fn with_stream<S: AsyncStream + 'static>(stream: S) -> Self {
        let boxed: Box<dyn AsyncStream> = Box::new(stream);
        Self {
            transport: Some(Framed::new(boxed, MqiCodec::new())),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    async fn call(&mut self, request: Request) -> Result<Reply, MqError> {
        let transport = self.transport.as_mut().ok_or_else(broken)?;
        let op = request.opcode();
        if let Err(e) = transport.send(BridgeFrame::Request(request)).await {
            warn!(error = %e, "bridge send failed");
            self.transport = None;
            return Err(broken());
        }
        match transport.next().await {
            Some(Ok(BridgeFrame::Reply(reply))) if reply.opcode() & 0x7f == op => Ok(reply),
            Some(Ok(other)) => {
                warn!(?other, "unexpected frame from bridge");
                self.transport = None;
                Err(broken())
            }
            Some(Err(e)) => {
                warn!(error = %e, "bridge read failed");
                self.transport = None;
                Err(broken())
            }
            None => {
                warn!("bridge closed the connection");
                self.transport = None;
                Err(broken())
            }
        }
    }
}

fn load_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>, ConnectError> {
    let file = File::open(path)
        .map_err(|e| ConnectError::Tls(format!("cannot read {}: {}", path.display(), e)))?;
    let certs = CertificateDer::pem_reader_iter(BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::Tls(format!("bad certificate in {}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(ConnectError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Build the rustls client configuration for a channel.
pub fn tls_config(
    ssl: &SslConfig,
    min_version: TlsVersion,
    client_auth: ClientAuth,
) -> Result<ClientConfig, ConnectError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(&ssl.key_repository)? {
        roots
            .add(cert)
            .map_err(|e| ConnectError::Tls(format!("unusable CA certificate: {}", e)))?;
    }

    let versions: &[&'static rustls::SupportedProtocolVersion] = match min_version {
        TlsVersion::Tls12 => &[&rustls::version::TLS13, &rustls::version::TLS12],
        TlsVersion::Tls13 => &[&rustls::version::TLS13],
    };
    let builder =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_protocol_versions(versions)
            .map_err(|e| ConnectError::Tls(e.to_string()))?
            .with_root_certificates(roots);

    match (&ssl.client_certificate, &ssl.client_key) {
        (Some(cert), Some(key)) => {
            let chain = load_certs(cert)?;
            let key = PrivateKeyDer::from_pem_file(key).map_err(|e| {
                ConnectError::Tls(format!("bad private key {}: {}", key.display(), e))
            })?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| ConnectError::Tls(e.to_string()))
        }
        (None, None) if client_auth == ClientAuth::Required => Err(ConnectError::Config(
            "client authentication is required but no client certificate was configured".into(),
        )),
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(ConnectError::Config(
            "client certificate and key must be configured together".into(),
        )),
    }
}

async fn open_stream(options: &ConnectOptions) -> Result<Box<dyn AsyncStream>, ConnectError> {
    if options.binding == Binding::Local {
        return Err(ConnectError::Config(
            "local bindings are not available through the network adapter".into(),
        ));
    }
    let channel = options.channel.as_ref().ok_or_else(|| {
        ConnectError::Config("client binding needs a channel definition".into())
    })?;
    let (host, port) = channel.endpoint().map_err(ConnectError::Config)?;

    let tcp = TcpStream::connect((host.as_str(), port)).await?;
    tcp.set_nodelay(true)?;
    debug!(%host, port, "tcp connected");

    let Some(spec) = channel.ssl_cipher_spec.as_deref() else {
        return Ok(Box::new(tcp));
    };
    let ssl = options.ssl.as_ref().ok_or_else(|| {
        ConnectError::Config(format!("cipher spec {} set without a key repository", spec))
    })?;
    let version = TlsVersion::from_cipher_spec(spec)
        .ok_or_else(|| ConnectError::Config(format!("unsupported cipher spec {}", spec)))?;
    let config = tls_config(ssl, version, channel.ssl_client_auth)?;
    let server_name = ServerName::try_from(host.clone())
        .map_err(|e| ConnectError::Config(format!("invalid host name {}: {}", host, e)))?;
    let stream = TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(|e| ConnectError::Tls(e.to_string()))?;
    debug!(%host, cipher_spec = spec, "tls established");
    Ok(Box::new(stream))
}

impl Mqi for ClientMqi {
    async fn connect(
        &mut self,
        qmgr_name: &str,
        options: &ConnectOptions,
    ) -> Result<Hconn, ConnectError> {
        if self.transport.is_none() {
            let stream = open_stream(options).await?;
            self.transport = Some(Framed::new(stream, MqiCodec::new()));
        }
        let channel = options.channel.as_ref();
        let request = Request::Connect {
            qmgr_name: qmgr_name.to_string(),
            options: options.cno_options(),
            channel_name: channel.map(|c| c.channel_name.clone()),
            connection_name: channel.map(|c| c.connection_name.clone()),
            cipher_spec: channel.and_then(|c| c.ssl_cipher_spec.clone()),
            client_auth: channel
                .map(|c| c.ssl_client_auth)
                .unwrap_or_default()
                .as_i32(),
            user_id: options.security.as_ref().map(|s| s.user_id.clone()),
            password: options.security.as_ref().map(|s| s.password.clone()),
        };
        let reply = self.call(request).await.map_err(ConnectError::Rejected)?;
        if let Some(e) = reply_error(&reply) {
            self.transport = None;
            return Err(ConnectError::Rejected(e));
        }
        match reply.body {
            ReplyBody::Connect { hconn } => {
                info!(qmgr = qmgr_name, hconn, "bridge accepted connect");
                Ok(Hconn(hconn))
            }
            _ => Err(ConnectError::Rejected(broken())),
        }
    }

    async fn open(
        &mut self,
        hconn: Hconn,
        od: &ObjectDescriptor,
        options: i32,
    ) -> Result<Hobj, MqError> {
        let reply = self
            .call(Request::Open {
                hconn: hconn.0,
                object_type: od.object_type,
                object_name: od.object_name.clone(),
                options,
            })
            .await?;
        if let Some(e) = reply_error(&reply) {
            return Err(e);
        }
        match reply.body {
            ReplyBody::Open { hobj } => Ok(Hobj(hobj)),
            _ => Err(broken()),
        }
    }

    async fn get(
        &mut self,
        hconn: Hconn,
        hobj: Hobj,
        md: &mut MessageDescriptor,
        gmo: &GetOptions,
        buffer: &mut [u8],
    ) -> Result<usize, GetError> {
        let reply = self
            .call(Request::Get {
                hconn: hconn.0,
                hobj: hobj.0,
                options: gmo.options,
                wait_interval: gmo.wait_interval,
                buffer_length: buffer.len() as u32,
            })
            .await?;
        let ReplyBody::Get {
            descriptor,
            data_length,
            data,
        } = reply.body
        else {
            return Err(broken().into());
        };
        let data_length = data_length as usize;
        let returned = copy_returned(buffer, &data);
        match reply.reason {
            Reason::TRUNCATED_MSG_FAILED | Reason::TRUNCATED_MSG_ACCEPTED => {
                *md = *descriptor;
                Err(GetError::Truncated {
                    data_length,
                    buffer_length: buffer.len(),
                    accepted: reply.reason == Reason::TRUNCATED_MSG_ACCEPTED,
                })
            }
            _ if reply.completion == CompletionCode::Failed => {
                Err(MqError::new(reply.completion, reply.reason).into())
            }
            _ => {
                *md = *descriptor;
                Ok(returned)
            }
        }
    }

    async fn close(&mut self, hconn: Hconn, hobj: Hobj) -> Result<(), MqError> {
        let reply = self
            .call(Request::Close {
                hconn: hconn.0,
                hobj: hobj.0,
            })
            .await?;
        reply_error(&reply).map_or(Ok(()), Err)
    }

    async fn disconnect(&mut self, hconn: Hconn) -> Result<(), MqError> {
        let result = self.call(Request::Disconnect { hconn: hconn.0 }).await;
        self.transport = None;
        let reply = result?;
        reply_error(&reply).map_or(Ok(()), Err)
    }
}

fn copy_returned(buffer: &mut [u8], data: &Bytes) -> usize {
    let n = data.len().min(buffer.len());
    buffer[..n].copy_from_slice(&data[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ClientChannel;

    #[tokio::test]
    async fn local_binding_is_a_config_error() {
        let opts = ConnectOptions {
            binding: Binding::Local,
            ..ConnectOptions::default()
        };
        let err = ClientMqi::new().connect("QM1", &opts).await.unwrap_err();
        assert!(matches!(err, ConnectError::Config(_)));
    }

    #[tokio::test]
    async fn missing_channel_is_a_config_error() {
        let err = ClientMqi::new()
            .connect("QM1", &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn cipher_spec_without_key_repository_is_rejected_before_tls() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let channel = ClientChannel::new("APP.SVRCONN", format!("127.0.0.1({})", addr.port()))
            .with_cipher_spec("ANY_TLS12_OR_HIGHER");
        let opts = ConnectOptions::default().with_channel(channel);
        let err = ClientMqi::new().connect("QM1", &opts).await.unwrap_err();
        assert!(matches!(err, ConnectError::Config(_)));
    }

    #[test]
    fn unreadable_key_repository_is_a_tls_error() {
        let missing = SslConfig::new(std::env::temp_dir().join("iridium-mq-no-such-ca.pem"));
        let err = tls_config(&missing, TlsVersion::Tls12, ClientAuth::Optional).unwrap_err();
        assert!(matches!(err, ConnectError::Tls(_)));
        assert!(!err.is_retryable());
    }
}
