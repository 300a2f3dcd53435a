//! In-memory queue manager.
//!
//! Backs tests and local experiments with plain `VecDeque` queues. Handles
//! are the same opaque values a real manager hands out, and the manager's
//! failure modes (empty queue, unknown object, invalid handle, truncation)
//! are reproduced with the same reason codes. Outcomes can also be scripted
//! ahead of the queue contents to simulate connection trouble.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::constants::{CCSID_UTF8, MQGMO_ACCEPT_TRUNCATED_MSG};
use crate::descriptor::{MessageDescriptor, ObjectDescriptor};
use crate::error::{ConnectError, GetError, MqError, Reason};
use crate::format::Format;
use crate::mqi::{Hconn, Hobj, Mqi};
use crate::options::{ConnectOptions, GetOptions};

/// A message waiting on an in-memory queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub descriptor: MessageDescriptor,
    pub data: Vec<u8>,
}

/// Outcome injected ahead of the queue contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Report `MQRC_NO_MSG_AVAILABLE` even if messages are queued
    Empty,
    /// Fail the get with this reason
    Fail(Reason),
}

#[derive(Default)]
struct State {
    name: String,
    credentials: Option<(String, String)>,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    script: VecDeque<Scripted>,
    connections: HashSet<u32>,
    open: HashMap<u32, (u32, String)>,
    next_handle: u32,
    get_calls: usize,
}

/// Shared in-memory queue manager; clones see the same queues.
#[derive(Clone, Default)]
pub struct MemoryQueueManager {
    state: Arc<Mutex<State>>,
}

impl MemoryQueueManager {
    pub fn new(qmgr_name: impl Into<String>) -> Self {
        let state = State {
            name: qmgr_name.into(),
            next_handle: 1,
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Reject connects that do not present these credentials.
    pub async fn require_credentials(&self, user_id: &str, password: &str) {
        let mut s = self.state.lock().await;
        s.credentials = Some((user_id.to_string(), password.to_string()));
    }

    /// Create an empty queue (no-op if it exists).
    pub async fn define_queue(&self, name: &str) {
        let mut s = self.state.lock().await;
        s.queues.entry(name.to_string()).or_default();
    }

    /// Append a message to `queue`, creating the queue if needed.
    pub async fn enqueue(
        &self,
        queue: &str,
        descriptor: MessageDescriptor,
        data: impl Into<Vec<u8>>,
    ) {
        let mut s = self.state.lock().await;
        s.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(StoredMessage {
                descriptor,
                data: data.into(),
            });
    }

    /// Append a UTF-8 `MQSTR` message.
    pub async fn enqueue_text(&self, queue: &str, text: &str) {
        let md = MessageDescriptor::default()
            .with_format(Format::STRING)
            .with_ccsid(CCSID_UTF8);
        self.enqueue(queue, md, text.as_bytes()).await;
    }

    /// Queue an outcome to be returned by an upcoming get.
    pub async fn script(&self, outcome: Scripted) {
        let mut s = self.state.lock().await;
        s.script.push_back(outcome);
    }

    pub async fn depth(&self, queue: &str) -> usize {
        let s = self.state.lock().await;
        s.queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    /// Number of object handles currently open.
    pub async fn open_handles(&self) -> usize {
        self.state.lock().await.open.len()
    }

    /// Number of live connections.
    pub async fn connections(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Number of get calls received so far.
    pub async fn get_calls(&self) -> usize {
        self.state.lock().await.get_calls
    }
}

impl Mqi for MemoryQueueManager {
    async fn connect(
        &mut self,
        qmgr_name: &str,
        options: &ConnectOptions,
    ) -> Result<Hconn, ConnectError> {
        let mut s = self.state.lock().await;
        if !qmgr_name.is_empty() && qmgr_name != s.name {
            return Err(ConnectError::Rejected(MqError::failed(Reason::Q_MGR_NAME_ERROR)));
        }
        if let Some((user, password)) = &s.credentials {
            let presented = options
                .security
                .as_ref()
                .map(|p| (&p.user_id, &p.password));
            if presented != Some((user, password)) {
                return Err(ConnectError::Rejected(MqError::failed(Reason::NOT_AUTHORIZED)));
            }
        }
        let handle = s.next_handle;
        s.next_handle += 1;
        s.connections.insert(handle);
        Ok(Hconn(handle))
    }

    async fn open(
        &mut self,
        hconn: Hconn,
        od: &ObjectDescriptor,
        _options: i32,
    ) -> Result<Hobj, MqError> {
        let mut s = self.state.lock().await;
        if !s.connections.contains(&hconn.0) {
            return Err(MqError::failed(Reason::HCONN_ERROR));
        }
        if !s.queues.contains_key(&od.object_name) {
            return Err(MqError::failed(Reason::UNKNOWN_OBJECT_NAME));
        }
        let handle = s.next_handle;
        s.next_handle += 1;
        s.open.insert(handle, (hconn.0, od.object_name.clone()));
        Ok(Hobj(handle))
    }

    async fn get(
        &mut self,
        hconn: Hconn,
        hobj: Hobj,
        md: &mut MessageDescriptor,
        gmo: &GetOptions,
        buffer: &mut [u8],
    ) -> Result<usize, GetError> {
        let mut s = self.state.lock().await;
        s.get_calls += 1;
        if !s.connections.contains(&hconn.0) {
            return Err(MqError::failed(Reason::HCONN_ERROR).into());
        }
        let queue_name = match s.open.get(&hobj.0) {
            Some((owner, name)) if *owner == hconn.0 => name.clone(),
            _ => return Err(MqError::failed(Reason::HOBJ_ERROR).into()),
        };
        match s.script.pop_front() {
            Some(Scripted::Empty) => return Err(MqError::failed(Reason::NO_MSG_AVAILABLE).into()),
            Some(Scripted::Fail(reason)) => return Err(MqError::failed(reason).into()),
            None => {}
        }
        let queue = s.queues.entry(queue_name).or_default();
        let data_length = match queue.front() {
            Some(msg) => msg.data.len(),
            None => return Err(MqError::failed(Reason::NO_MSG_AVAILABLE).into()),
        };
        if data_length > buffer.len() && !gmo.has(MQGMO_ACCEPT_TRUNCATED_MSG) {
            if let Some(msg) = queue.front() {
                *md = msg.descriptor.clone();
            }
            return Err(GetError::Truncated {
                data_length,
                buffer_length: buffer.len(),
                accepted: false,
            });
        }
        let Some(msg) = queue.pop_front() else {
            return Err(MqError::failed(Reason::NO_MSG_AVAILABLE).into());
        };
        let n = data_length.min(buffer.len());
        buffer[..n].copy_from_slice(&msg.data[..n]);
        *md = msg.descriptor;
        if n < data_length {
            return Err(GetError::Truncated {
                data_length,
                buffer_length: buffer.len(),
                accepted: true,
            });
        }
        Ok(n)
    }

    async fn close(&mut self, hconn: Hconn, hobj: Hobj) -> Result<(), MqError> {
        let mut s = self.state.lock().await;
        match s.open.get(&hobj.0) {
            Some((owner, _)) if *owner == hconn.0 => {
                s.open.remove(&hobj.0);
                Ok(())
            }
            _ => Err(MqError::failed(Reason::HOBJ_ERROR)),
        }
    }

    async fn disconnect(&mut self, hconn: Hconn) -> Result<(), MqError> {
        let mut s = self.state.lock().await;
        if !s.connections.remove(&hconn.0) {
            return Err(MqError::failed(Reason::HCONN_ERROR));
        }
        s.open.retain(|_, (owner, _)| *owner != hconn.0);
        Ok(())
    }
}
