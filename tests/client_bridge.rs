//! Network adapter against a fake bridge on an in-memory duplex stream.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use iridium_mq::codec::{Reply, ReplyBody, Request};
use iridium_mq::constants::{CCSID_UTF8, MQGMO_ACCEPT_TRUNCATED_MSG};
use iridium_mq::{
    BridgeFrame, ClientChannel, ClientMqi, CompletionCode, ConnectError, ConnectOptions, Consumer,
    DecodedMessage, Format, MessageDescriptor, MqiCodec, OpenError, PollPolicy, Reason,
    RetrievalError, Session, StopHandle,
};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

const QUEUE: &str = "DEV.QUEUE.1";

fn get_reply(completion: CompletionCode, reason: Reason, data: &[u8], data_length: usize) -> Reply {
    let md = MessageDescriptor::default()
        .with_format(Format::STRING)
        .with_ccsid(CCSID_UTF8);
    Reply {
        completion,
        reason,
        body: ReplyBody::Get {
            descriptor: Box::new(md),
            data_length: data_length as u32,
            data: Bytes::copy_from_slice(data),
        },
    }
}

/// Answers requests the way a queue manager would, serving `messages` from
/// one queue. Returns every request received. With `drop_on_get` set, the
/// stream is closed instead of answering the first get.
async fn fake_bridge(
    stream: DuplexStream,
    mut messages: VecDeque<Vec<u8>>,
    drop_on_get: bool,
) -> Vec<Request> {
    let mut framed = Framed::new(stream, MqiCodec::new());
    let mut seen = Vec::new();
    while let Some(Ok(BridgeFrame::Request(req))) = framed.next().await {
        if drop_on_get && matches!(req, Request::Get { .. }) {
            seen.push(req);
            return seen;
        }
        let reply = match &req {
            Request::Connect { qmgr_name, .. } if qmgr_name == "QM1" => {
                Reply::ok(ReplyBody::Connect { hconn: 1 })
            }
            Request::Connect { .. } => {
                Reply::failed(Reason::Q_MGR_NAME_ERROR, ReplyBody::Connect { hconn: 0 })
            }
            Request::Open { object_name, .. } if object_name == QUEUE => {
                Reply::ok(ReplyBody::Open { hobj: 2 })
            }
            Request::Open { .. } => {
                Reply::failed(Reason::UNKNOWN_OBJECT_NAME, ReplyBody::Open { hobj: 0 })
            }
            Request::Get {
                options,
                buffer_length,
                ..
            } => {
                let limit = *buffer_length as usize;
                match messages.front() {
                    None => get_reply(CompletionCode::Failed, Reason::NO_MSG_AVAILABLE, &[], 0),
                    Some(m) if m.len() > limit && options & MQGMO_ACCEPT_TRUNCATED_MSG == 0 => {
                        get_reply(
                            CompletionCode::Warning,
                            Reason::TRUNCATED_MSG_FAILED,
                            &m[..limit],
                            m.len(),
                        )
                    }
                    Some(_) => {
                        let m = messages.pop_front().unwrap_or_default();
                        if m.len() > limit {
                            get_reply(
                                CompletionCode::Warning,
                                Reason::TRUNCATED_MSG_ACCEPTED,
                                &m[..limit],
                                m.len(),
                            )
                        } else {
                            get_reply(CompletionCode::Ok, Reason::NONE, &m, m.len())
                        }
                    }
                }
            }
            Request::Close { .. } => Reply::ok(ReplyBody::Close),
            Request::Disconnect { .. } => Reply::ok(ReplyBody::Disconnect),
        };
        let last = matches!(req, Request::Disconnect { .. });
        seen.push(req);
        framed.send(BridgeFrame::Reply(reply)).await.unwrap();
        if last {
            break;
        }
    }
    seen
}

fn spawn_bridge(
    messages: Vec<Vec<u8>>,
    drop_on_get: bool,
) -> (ClientMqi, tokio::task::JoinHandle<Vec<Request>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let bridge = tokio::spawn(fake_bridge(server, messages.into(), drop_on_get));
    (ClientMqi::with_stream(client), bridge)
}

// =============================================================================
// Consuming over the bridge
// =============================================================================

#[tokio::test]
async fn consume_over_bridge_then_disconnect() {
    let big = vec![b'b'; 3000];
    let (mqi, bridge) = spawn_bridge(vec![b"hello".to_vec(), big.clone()], false);

    let mut session = Session::connect(mqi, "QM1", &ConnectOptions::default())
        .await
        .unwrap();
    let queue = session.open_queue(QUEUE).await.unwrap();
    let stop = StopHandle::new();
    let mut bodies = Vec::new();
    let stats = Consumer::new(queue, PollPolicy::default(), &stop)
        .run(&mut |m: &DecodedMessage| {
            bodies.push(m.body.data.clone());
            if bodies.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();
    session.disconnect().await;

    assert_eq!(bodies, vec![b"hello".to_vec(), big]);
    assert_eq!(stats.messages, 2);

    let requests = bridge.await.unwrap();
    assert!(matches!(requests.first(), Some(Request::Connect { .. })));
    assert!(matches!(requests.last(), Some(Request::Disconnect { hconn: 1 })));
    assert!(matches!(
        requests[requests.len() - 2],
        Request::Close { hconn: 1, hobj: 2 }
    ));
    // Second message needed a retry with a bigger buffer
    assert!(requests.iter().any(|r| matches!(
        r,
        Request::Get {
            buffer_length: 3000,
            ..
        }
    )));
}

#[tokio::test]
async fn oversized_message_is_removed_over_bridge() {
    let (mqi, bridge) = spawn_bridge(vec![vec![0u8; 4096], b"next".to_vec()], false);

    let mut session = Session::connect(mqi, "QM1", &ConnectOptions::default())
        .await
        .unwrap();
    let queue = session.open_queue(QUEUE).await.unwrap();
    let stop = StopHandle::new();
    let policy = PollPolicy::default().with_max_message_length(2048);
    let mut bodies = Vec::new();
    let stats = Consumer::new(queue, policy, &stop)
        .run(&mut |m: &DecodedMessage| {
            bodies.push(m.body.data.clone());
            ControlFlow::Break(())
        })
        .await
        .unwrap();
    session.disconnect().await;

    assert_eq!(bodies, vec![b"next".to_vec()]);
    assert_eq!(stats.skipped, 1);
    let requests = bridge.await.unwrap();
    let accepted = requests
        .iter()
        .filter(|r| {
            matches!(r, Request::Get { options, .. } if options & MQGMO_ACCEPT_TRUNCATED_MSG != 0)
        })
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn bridge_closing_mid_get_is_fatal() {
    let (mqi, bridge) = spawn_bridge(vec![b"lost".to_vec()], true);

    let mut session = Session::connect(mqi, "QM1", &ConnectOptions::default())
        .await
        .unwrap();
    let queue = session.open_queue(QUEUE).await.unwrap();
    let stop = StopHandle::new();
    let err = Consumer::new(queue, PollPolicy::default(), &stop)
        .run(&mut |_: &DecodedMessage| ControlFlow::Continue(()))
        .await
        .unwrap_err();
    session.disconnect().await;

    assert!(matches!(err, RetrievalError::Fatal(e) if e.reason == Reason::CONNECTION_BROKEN));
    let requests = bridge.await.unwrap();
    assert!(matches!(requests.last(), Some(Request::Get { .. })));
}

// =============================================================================
// Connect and open failures
// =============================================================================

#[tokio::test]
async fn wrong_queue_manager_is_rejected() {
    let (mqi, _bridge) = spawn_bridge(vec![], false);
    let err = Session::connect(mqi, "QM9", &ConnectOptions::default())
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, ConnectError::Rejected(e) if e.reason == Reason::Q_MGR_NAME_ERROR));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn unknown_queue_is_an_open_error() {
    let (mqi, _bridge) = spawn_bridge(vec![], false);
    let mut session = Session::connect(mqi, "QM1", &ConnectOptions::default())
        .await
        .unwrap();
    let err = session.open_queue("NO.SUCH.QUEUE").await.err().expect("open should fail");
    assert_eq!(err.reason(), Reason::UNKNOWN_OBJECT_NAME);
    assert!(matches!(err, OpenError::Rejected { ref object, .. } if object == "NO.SUCH.QUEUE"));
    session.disconnect().await;
}

#[tokio::test]
async fn refused_tcp_connect_is_retryable_io() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let channel = ClientChannel::new("DEV.APP.SVRCONN", format!("127.0.0.1({})", port));
    let options = ConnectOptions::default()
        .with_channel(channel)
        .with_timeout(Duration::from_secs(5));
    let err = Session::connect(ClientMqi::new(), "QM1", &options)
        .await
        .err()
        .expect("nothing is listening");
    assert!(matches!(err, ConnectError::Io(_)));
    assert!(err.is_retryable());
    assert_eq!(err.reason(), Reason::HOST_NOT_AVAILABLE);
}
