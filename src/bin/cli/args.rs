use clap::Parser;
use std::path::PathBuf;

/// Poll a queue and print every message that arrives
#[derive(Parser, Debug)]
#[command(name = "mqget")]
#[command(version)]
#[command(about = "Consume messages from an MQ queue and print them", long_about = None)]
pub struct Cli {
    /// Queue manager to connect to
    #[arg(short = 'm', long, default_value = "QM1")]
    pub qmgr: String,

    /// Queue to read from
    #[arg(short, long, default_value = "DEV.QUEUE.1")]
    pub queue: String,

    /// Connection name in host(port) form
    #[arg(short, long = "conn-name", default_value = "localhost(1414)")]
    pub conn_name: String,

    /// Server-connection channel
    #[arg(long, default_value = "DEV.APP.SVRCONN")]
    pub channel: String,

    /// User id presented on connect
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password for --user
    #[arg(short, long, requires = "user")]
    pub password: Option<String>,

    /// TLS cipher spec, e.g. ANY_TLS12_OR_HIGHER
    #[arg(long, requires = "key_repository")]
    pub cipher_spec: Option<String>,

    /// PEM bundle of trusted certificate authorities
    #[arg(long)]
    pub key_repository: Option<PathBuf>,

    /// PEM client certificate chain
    #[arg(long, requires = "client_key")]
    pub client_cert: Option<PathBuf>,

    /// PEM private key for --client-cert
    #[arg(long, requires = "client_cert")]
    pub client_key: Option<PathBuf>,

    /// Fail unless a client certificate is presented
    #[arg(long)]
    pub require_client_auth: bool,

    /// Minimum delay between polls in milliseconds (0 polls back to back)
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,

    /// Back off while the queue is empty, up to this many milliseconds
    #[arg(long)]
    pub idle_backoff_ms: Option<u64>,

    /// Largest message to retrieve; bigger ones are discarded
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub max_message_length: usize,

    /// Get options to use instead of the defaults (repeatable), e.g. --gmo convert
    #[arg(long = "gmo")]
    pub get_options: Vec<String>,

    /// Connect attempts before giving up
    #[arg(long, default_value_t = 5)]
    pub connect_attempts: u32,

    /// Connect and open timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Print consumer statistics on exit
    #[arg(long)]
    pub summary: bool,
}
