//! The retrieval loop.
//!
//! A [`Consumer`] owns one open [`Queue`] and issues non-blocking gets against
//! it, one at a time. Each attempt is classified into an [`Outcome`]: empty
//! queues are silent, connection-level failures end the loop, and anything
//! else (a failed get, a malformed or oversized message) is logged and the
//! loop carries on with the next attempt.
//!
//! Between attempts the loop yields to the scheduler, or sleeps for the
//! configured interval while watching the [`StopHandle`].

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::constants::MQGMO_ACCEPT_TRUNCATED_MSG;
use crate::descriptor::MessageDescriptor;
use crate::error::{FormatError, GetError, MqError, Reason, RetrievalError};
use crate::header::{DecodedMessage, dispatch};
use crate::mqi::Mqi;
use crate::options::GetOptions;
use crate::session::Queue;

/// Size of the first buffer handed to a get.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;
/// Largest message the consumer will grow its buffer for.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4 * 1024 * 1024;
/// Buffer resizes allowed within one retrieval attempt.
const MAX_BUFFER_GROWTHS: u32 = 2;

/// A message as it came off the queue, envelopes still attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedMessage {
    pub descriptor: MessageDescriptor,
    pub data: Vec<u8>,
}

impl RetrievedMessage {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Strip envelopes and resolve the body.
    pub fn decode(&self) -> Result<DecodedMessage, FormatError> {
        dispatch(&self.descriptor, &self.data)
    }
}

/// Result of one retrieval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing on the queue right now
    Empty,
    Message(RetrievedMessage),
    /// Never [`RetrievalError::NoMessageAvailable`]; that is `Empty`
    Failed(RetrievalError),
}

/// Exponential delay applied while the queue stays empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleBackoff {
    pub initial: Duration,
    pub max: Duration,
}

/// How often and with what buffer the consumer polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Minimum delay between attempts; zero only yields
    pub min_interval: Duration,
    /// Extra delay after consecutive empty polls, reset by any other outcome
    pub idle_backoff: Option<IdleBackoff>,
    pub initial_buffer: usize,
    pub max_message_length: usize,
    pub get_options: GetOptions,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::ZERO,
            idle_backoff: None,
            initial_buffer: DEFAULT_BUFFER_SIZE,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            get_options: GetOptions::default(),
        }
    }
}

impl PollPolicy {
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_idle_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.idle_backoff = Some(IdleBackoff { initial, max });
        self
    }

    pub fn with_max_message_length(mut self, limit: usize) -> Self {
        self.max_message_length = limit;
        self
    }
}

/// Cloneable handle used to ask a running consumer to stop.
///
/// Backed by a `watch` channel, so a stop requested before the consumer
/// starts (or while it is busy) is still seen at the next check.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopSignal {
        StopSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a [`StopHandle`].
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested. Never resolves if every
    /// handle is dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            future::pending::<()>().await;
        }
    }
}

/// Counters kept by a consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub polls: u64,
    pub empty: u64,
    /// Messages removed from the queue, including ones later skipped
    pub messages: u64,
    /// Messages that could not be retrieved whole or decoded
    pub skipped: u64,
    /// Recoverable get failures
    pub errors: u64,
}

/// Receives decoded messages from [`Consumer::run`].
pub trait MessageHandler {
    /// Handle one message. `ControlFlow::Break` stops the loop.
    fn on_message(&mut self, message: &DecodedMessage) -> ControlFlow<()>;

    /// Called for each message that had to be skipped.
    fn on_skipped(&mut self, _error: &FormatError) {}
}

impl<F> MessageHandler for F
where
    F: FnMut(&DecodedMessage) -> ControlFlow<()>,
{
    fn on_message(&mut self, message: &DecodedMessage) -> ControlFlow<()> {
        self(message)
    }
}

/// Polls one queue until stopped or the connection fails.
pub struct Consumer<'s, M: Mqi> {
    queue: Queue<'s, M>,
    policy: PollPolicy,
    signal: StopSignal,
    buffer: Vec<u8>,
    idle_delay: Option<Duration>,
    stats: ConsumerStats,
}

impl<'s, M: Mqi> Consumer<'s, M> {
    pub fn new(queue: Queue<'s, M>, policy: PollPolicy, stop: &StopHandle) -> Self {
        let buffer = vec![0u8; policy.initial_buffer];
        Self {
            queue,
            policy,
            signal: stop.subscribe(),
            buffer,
            idle_delay: None,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Current retrieval buffer size.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Issue one get and classify the result.
    pub async fn poll_once(&mut self) -> Outcome {
        self.stats.polls += 1;
        let outcome = self.retrieve().await;
        match &outcome {
            Outcome::Empty => self.stats.empty += 1,
            Outcome::Message(_) => self.stats.messages += 1,
            Outcome::Failed(RetrievalError::Format(_)) => self.stats.skipped += 1,
            Outcome::Failed(_) => self.stats.errors += 1,
        }
        outcome
    }

    async fn retrieve(&mut self) -> Outcome {
        let mut growths = 0;
        loop {
            let mut md = MessageDescriptor::default();
            let result = self
                .queue
                .get(&mut md, &self.policy.get_options, &mut self.buffer)
                .await;
            match result {
                Ok(len) => {
                    return Outcome::Message(RetrievedMessage {
                        descriptor: md,
                        data: self.buffer[..len].to_vec(),
                    });
                }
                Err(GetError::Truncated {
                    data_length,
                    accepted: false,
                    ..
                }) if data_length <= self.policy.max_message_length => {
                    // A reply that would not grow the buffer cannot succeed on retry
                    if data_length <= self.buffer.len() || growths == MAX_BUFFER_GROWTHS {
                        debug!(
                            data_length,
                            buffer = self.buffer.len(),
                            growths,
                            "truncated reply does not fit a retry"
                        );
                        return Outcome::Failed(RetrievalError::Other(MqError::failed(
                            Reason::TRUNCATED_MSG_FAILED,
                        )));
                    }
                    debug!(
                        from = self.buffer.len(),
                        to = data_length,
                        "growing retrieval buffer"
                    );
                    self.buffer.resize(data_length, 0);
                    growths += 1;
                }
                Err(GetError::Truncated {
                    data_length,
                    accepted,
                    ..
                }) => {
                    if !accepted {
                        if let Some(err) = self.discard_oversized().await {
                            return Outcome::Failed(err);
                        }
                    }
                    return Outcome::Failed(RetrievalError::Format(FormatError::MessageTooLarge {
                        length: data_length,
                        limit: self.policy.max_message_length,
                    }));
                }
                Err(GetError::Mq(e)) => {
                    return match RetrievalError::from(e) {
                        RetrievalError::NoMessageAvailable => Outcome::Empty,
                        other => Outcome::Failed(other),
                    };
                }
            }
        }
    }

    /// Remove an oversized message by reading only its prefix.
    async fn discard_oversized(&mut self) -> Option<RetrievalError> {
        let gmo = self.policy.get_options.with(MQGMO_ACCEPT_TRUNCATED_MSG);
        let mut md = MessageDescriptor::default();
        match self.queue.get(&mut md, &gmo, &mut self.buffer).await {
            Ok(_) | Err(GetError::Truncated { .. }) => {
                warn!(msg_id = %md.msg_id_hex(), "discarded oversized message");
                None
            }
            Err(GetError::Mq(e)) => match RetrievalError::from(e) {
                // Someone else took it first
                RetrievalError::NoMessageAvailable => None,
                other => Some(other),
            },
        }
    }

    fn next_delay(&mut self, empty: bool) -> Duration {
        let base = self.policy.min_interval;
        match (empty, self.policy.idle_backoff) {
            (true, Some(backoff)) => {
                let next = match self.idle_delay {
                    None => backoff.initial,
                    Some(d) => (d * 2).min(backoff.max),
                };
                self.idle_delay = Some(next);
                next.max(base)
            }
            _ => {
                self.idle_delay = None;
                base
            }
        }
    }

    /// Poll until stopped, the handler breaks, or the connection fails.
    ///
    /// The queue is closed on every exit path. Returns the final counters, or
    /// the fatal error that ended the loop.
    pub async fn run<H: MessageHandler>(
        mut self,
        handler: &mut H,
    ) -> Result<ConsumerStats, RetrievalError> {
        info!(queue = %self.queue.name(), "consumer started");
        let result = loop {
            if self.signal.is_stopped() {
                info!("stop requested");
                break Ok(());
            }
            let outcome = self.poll_once().await;
            let empty = matches!(outcome, Outcome::Empty);
            match outcome {
                Outcome::Empty => trace!("no message available"),
                Outcome::Message(msg) => {
                    debug!(
                        len = msg.len(),
                        format = %msg.descriptor.format,
                        msg_id = %msg.descriptor.msg_id_hex(),
                        "message retrieved"
                    );
                    match msg.decode() {
                        Ok(decoded) => {
                            if handler.on_message(&decoded).is_break() {
                                info!("handler requested stop");
                                break Ok(());
                            }
                        }
                        Err(e) => {
                            self.stats.skipped += 1;
                            warn!(
                                error = %e,
                                msg_id = %msg.descriptor.msg_id_hex(),
                                "skipping malformed message"
                            );
                            handler.on_skipped(&e);
                        }
                    }
                }
                Outcome::Failed(RetrievalError::Fatal(e)) => {
                    error!(reason = %e.reason, "connection lost, stopping consumer");
                    break Err(RetrievalError::Fatal(e));
                }
                Outcome::Failed(RetrievalError::Format(e)) => {
                    warn!(error = %e, "message skipped");
                    handler.on_skipped(&e);
                }
                Outcome::Failed(e) => warn!(error = %e, "get failed"),
            }

            let delay = self.next_delay(empty);
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = self.signal.stopped() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        };

        let stats = self.stats;
        self.queue.close().await;
        info!(
            polls = stats.polls,
            messages = stats.messages,
            skipped = stats.skipped,
            errors = stats.errors,
            "consumer stopped"
        );
        result.map(|()| stats)
    }
}
