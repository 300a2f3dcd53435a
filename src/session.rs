use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{MQOO_FAIL_IF_QUIESCING, MQOO_INPUT_AS_Q_DEF};
use crate::descriptor::{MessageDescriptor, ObjectDescriptor};
use crate::error::{ConnectError, GetError, OpenError};
use crate::mqi::{Hconn, Hobj, Mqi};
use crate::options::{ConnectOptions, GetOptions};

/// Bounded exponential backoff for connect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// A live connection to one queue manager.
///
/// Owns the adapter and the connection handle. Queues opened from a session
/// borrow it, so a [`Queue`] can never outlive its connection.
pub struct Session<M: Mqi> {
    mqi: M,
    hconn: Hconn,
    qmgr_name: String,
    timeout: Option<Duration>,
}

impl<M: Mqi> Session<M> {
    /// Connect once, without retrying.
    pub async fn connect(
        mqi: M,
        qmgr_name: &str,
        options: &ConnectOptions,
    ) -> Result<Self, ConnectError> {
        connect_with_retry(mqi, qmgr_name, options, &RetryPolicy::none()).await
    }

    pub fn hconn(&self) -> Hconn {
        self.hconn
    }

    pub fn qmgr_name(&self) -> &str {
        &self.qmgr_name
    }

    /// Open `queue_name` for input with the queue's default share mode.
    pub async fn open_queue(&mut self, queue_name: &str) -> Result<Queue<'_, M>, OpenError> {
        let od = ObjectDescriptor::queue(queue_name);
        self.open(&od, MQOO_INPUT_AS_Q_DEF | MQOO_FAIL_IF_QUIESCING)
            .await
    }

    /// Open an arbitrary object with explicit MQOO options.
    pub async fn open(
        &mut self,
        od: &ObjectDescriptor,
        options: i32,
    ) -> Result<Queue<'_, M>, OpenError> {
        let call = self.mqi.open(self.hconn, od, options);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(r) => r,
                Err(_) => {
                    return Err(OpenError::Timeout {
                        object: od.object_name.clone(),
                        timeout: limit,
                    });
                }
            },
            None => call.await,
        };
        let hobj = result.map_err(|error| OpenError::Rejected {
            object: od.object_name.clone(),
            error,
        })?;
        info!(queue = %od.object_name, %hobj, "MQOPEN successful");
        Ok(Queue {
            session: self,
            hobj,
            name: od.object_name.clone(),
        })
    }

    /// End the session. Failures are logged, never returned.
    pub async fn disconnect(mut self) {
        match self.mqi.disconnect(self.hconn).await {
            Ok(()) => info!(qmgr = %self.qmgr_name, "MQDISC successful"),
            Err(e) => warn!(qmgr = %self.qmgr_name, error = %e, "MQDISC failed"),
        }
    }
}

/// Connect to `qmgr_name`, retrying transient failures with exponential
/// backoff as described by `retry`.
///
/// Credential, TLS and configuration failures are returned immediately.
pub async fn connect_with_retry<M: Mqi>(
    mut mqi: M,
    qmgr_name: &str,
    options: &ConnectOptions,
    retry: &RetryPolicy,
) -> Result<Session<M>, ConnectError> {
    let mut attempt: u32 = 1;
    let mut backoff = retry.initial_backoff;
    loop {
        debug!(qmgr = qmgr_name, attempt, "connecting");
        let call = mqi.connect(qmgr_name, options);
        let result = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ConnectError::Timeout(limit))),
            None => call.await,
        };
        match result {
            Ok(hconn) => {
                info!(qmgr = qmgr_name, %hconn, "MQCONN successful");
                return Ok(Session {
                    mqi,
                    hconn,
                    qmgr_name: qmgr_name.to_string(),
                    timeout: options.timeout,
                });
            }
            Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                warn!(
                    qmgr = qmgr_name,
                    attempt,
                    reason = %e.reason(),
                    error = %e,
                    retry_in = ?backoff,
                    "connect failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(retry.max_backoff);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// An open queue. Borrows its [`Session`].
pub struct Queue<'s, M: Mqi> {
    session: &'s mut Session<M>,
    hobj: Hobj,
    name: String,
}

impl<M: Mqi> Queue<'_, M> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hobj(&self) -> Hobj {
        self.hobj
    }

    /// One get call against this queue.
    pub async fn get(
        &mut self,
        md: &mut MessageDescriptor,
        gmo: &GetOptions,
        buffer: &mut [u8],
    ) -> Result<usize, GetError> {
        let hconn = self.session.hconn;
        self.session
            .mqi
            .get(hconn, self.hobj, md, gmo, buffer)
            .await
    }

    /// Close the queue. Failures are logged, never returned.
    pub async fn close(self) {
        let hconn = self.session.hconn;
        match self.session.mqi.close(hconn, self.hobj).await {
            Ok(()) => info!(queue = %self.name, "MQCLOSE successful"),
            Err(e) => warn!(queue = %self.name, error = %e, "MQCLOSE failed"),
        }
    }
}
