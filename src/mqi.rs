//! The queue manager interface the rest of the crate is written against.
//!
//! [`Mqi`] mirrors the five calls a consumer needs. The network adapter
//! ([`crate::client::ClientMqi`]) and the in-memory adapter
//! ([`crate::memory::MemoryQueueManager`]) both implement it, and
//! [`crate::session::Session`] owns whichever one it is given.

use std::fmt;

use crate::descriptor::{MessageDescriptor, ObjectDescriptor};
use crate::error::{ConnectError, GetError, MqError};
use crate::options::{ConnectOptions, GetOptions};

/// Opaque connection handle (Hconn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hconn(pub u32);

/// Opaque object handle (Hobj), valid only on the connection that opened it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hobj(pub u32);

impl fmt::Display for Hconn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hconn-{}", self.0)
    }
}

impl fmt::Display for Hobj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hobj-{}", self.0)
    }
}

/// Queue manager calls used by the consumer.
///
/// Implementations are not required to support concurrent calls; callers
/// hold `&mut self` for the duration of each call.
#[allow(async_fn_in_trait)]
pub trait Mqi {
    /// Establish a session with `qmgr_name`.
    async fn connect(
        &mut self,
        qmgr_name: &str,
        options: &ConnectOptions,
    ) -> Result<Hconn, ConnectError>;

    /// Open the object named by `od` with MQOO `options`.
    async fn open(
        &mut self,
        hconn: Hconn,
        od: &ObjectDescriptor,
        options: i32,
    ) -> Result<Hobj, MqError>;

    /// Retrieve the next message into `buffer`, filling `md`.
    ///
    /// Returns the message length on success. A message longer than `buffer`
    /// yields [`GetError::Truncated`]; it stays on the queue unless
    /// `MQGMO_ACCEPT_TRUNCATED_MSG` was requested.
    async fn get(
        &mut self,
        hconn: Hconn,
        hobj: Hobj,
        md: &mut MessageDescriptor,
        gmo: &GetOptions,
        buffer: &mut [u8],
    ) -> Result<usize, GetError>;

    async fn close(&mut self, hconn: Hconn, hobj: Hobj) -> Result<(), MqError>;

    async fn disconnect(&mut self, hconn: Hconn) -> Result<(), MqError>;
}
