use std::io::{self, Write};
use std::ops::ControlFlow;
use std::time::Duration;

use chrono::Local;
use iridium_mq::options::parse_gmo_flag;
use iridium_mq::wire::FlagValue;
use iridium_mq::{
    ClientAuth, ClientChannel, ClientMqi, ConnectError, ConnectOptions, Consumer, ConsumerStats,
    DecodedMessage, GetOptions, OpenError, PollPolicy, Reason, RetryPolicy, SslConfig, StopHandle,
    connect_with_retry, render_message,
};

use super::args::Cli;
use super::exit_codes;

/// Run the consumer until ctrl-c or a lost connection.
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let options = build_connect_options(cli);
    let policy = build_poll_policy(cli)?;
    let retry = RetryPolicy {
        max_attempts: cli.connect_attempts.max(1),
        ..RetryPolicy::default()
    };

    println!("Connecting to {} at {}...", cli.qmgr, cli.conn_name);
    let mut session = connect_with_retry(ClientMqi::new(), &cli.qmgr, &options, &retry)
        .await
        .map_err(|e| format_connect_error(&e, &cli.conn_name))?;
    println!("MQCONN to {} successful", cli.qmgr);

    let queue = match session.open_queue(&cli.queue).await {
        Ok(queue) => queue,
        Err(e) => {
            let failure = format_open_error(&e);
            session.disconnect().await;
            return Err(failure);
        }
    };
    println!("MQOPEN of {} successful", cli.queue);

    let stop = StopHandle::new();
    let on_ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.stop();
        }
    });

    let result = {
        let mut stdout = io::stdout().lock();
        let mut print = |message: &DecodedMessage| {
            let printed = writeln!(stdout, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
                .and_then(|()| render_message(&mut stdout, message))
                .and_then(|()| stdout.flush());
            match printed {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => {
                    eprintln!("stdout closed: {}", e);
                    ControlFlow::Break(())
                }
            }
        };
        Consumer::new(queue, policy, &stop).run(&mut print).await
    };
    session.disconnect().await;

    match result {
        Ok(stats) => {
            if cli.summary {
                print_summary(&stats);
            }
            Ok(())
        }
        Err(e) => Err((format!("Stopped: {}", e), exit_codes::CONNECTION_LOST)),
    }
}

fn build_connect_options(cli: &Cli) -> ConnectOptions {
    let mut channel = ClientChannel::new(&cli.channel, &cli.conn_name);
    if let Some(spec) = &cli.cipher_spec {
        channel = channel.with_cipher_spec(spec);
    }
    if cli.require_client_auth {
        channel = channel.with_client_auth(ClientAuth::Required);
    }

    let mut options = ConnectOptions::default()
        .with_channel(channel)
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(user) = &cli.user {
        options = options.with_credentials(user, cli.password.clone().unwrap_or_default());
    }
    if let Some(repository) = &cli.key_repository {
        let mut ssl = SslConfig::new(repository);
        if let (Some(cert), Some(key)) = (&cli.client_cert, &cli.client_key) {
            ssl = ssl.with_client_identity(cert, key);
        }
        options = options.with_ssl(ssl);
    }
    options
}

fn build_poll_policy(cli: &Cli) -> Result<PollPolicy, (String, u8)> {
    let mut policy = PollPolicy::default()
        .with_min_interval(Duration::from_millis(cli.interval_ms))
        .with_max_message_length(cli.max_message_length);
    if let Some(max) = cli.idle_backoff_ms {
        policy = policy.with_idle_backoff(
            Duration::from_millis(max.min(10)),
            Duration::from_millis(max),
        );
    }
    if !cli.get_options.is_empty() {
        let mut flags = Vec::with_capacity(cli.get_options.len());
        for name in &cli.get_options {
            match parse_gmo_flag(name) {
                Some(flag) => flags.push(FlagValue::Int(flag)),
                None => {
                    return Err((
                        format!("Unknown get option '{}'", name),
                        exit_codes::CONFIG_ERROR,
                    ));
                }
            }
        }
        policy.get_options = GetOptions::from_flags(&FlagValue::List(flags))
            .map_err(|e| (e.to_string(), exit_codes::CONFIG_ERROR))?;
    }
    Ok(policy)
}

/// Map a connect failure to a user-facing message and exit code.
fn format_connect_error(err: &ConnectError, conn_name: &str) -> (String, u8) {
    match err {
        ConnectError::Io(io_err) => {
            let msg = match io_err.kind() {
                io::ErrorKind::ConnectionRefused => {
                    format!("Connection refused: {} (is the listener running?)", conn_name)
                }
                io::ErrorKind::TimedOut => format!("Connection timed out: {}", conn_name),
                _ => format!("Network error: {}", io_err),
            };
            (msg, exit_codes::NETWORK_ERROR)
        }
        ConnectError::Timeout(after) => (
            format!("Connect to {} timed out after {:?}", conn_name, after),
            exit_codes::NETWORK_ERROR,
        ),
        ConnectError::Tls(msg) => (format!("TLS failure: {}", msg), exit_codes::AUTH_ERROR),
        ConnectError::Config(msg) => (
            format!("Invalid configuration: {}", msg),
            exit_codes::CONFIG_ERROR,
        ),
        ConnectError::Rejected(e) if e.reason == Reason::NOT_AUTHORIZED => (
            format!("Not authorized: {}", e),
            exit_codes::AUTH_ERROR,
        ),
        ConnectError::Rejected(e) => (
            format!("Queue manager refused the connection: {}", e),
            exit_codes::NETWORK_ERROR,
        ),
    }
}

fn format_open_error(err: &OpenError) -> (String, u8) {
    let code = if err.reason() == Reason::NOT_AUTHORIZED {
        exit_codes::AUTH_ERROR
    } else {
        exit_codes::QUEUE_ERROR
    };
    (err.to_string(), code)
}

fn print_summary(stats: &ConsumerStats) {
    println!();
    println!("=== Consumer summary ===");
    println!("  polls:    {}", stats.polls);
    println!("  empty:    {}", stats.empty);
    println!("  messages: {}", stats.messages);
    println!("  skipped:  {}", stats.skipped);
    println!("  errors:   {}", stats.errors);
}
